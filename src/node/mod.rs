// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! NetEvents node.
//!
//! The entry point a host embeds. Ties together:
//! - the shared [`ConnectionPool`]
//! - the inbound [`Subscriber`] task
//! - the outbound [`Publisher`] task
//! - the [`ReadinessSignal`] and [`StatusReport`]
//!
//! # Lifecycle
//!
//! 1. `new()` builds the pool. No I/O.
//! 2. `start()` probes the broker once, then spawns both tasks and returns
//!    the readiness signal without waiting for the subscription.
//! 3. `publish_event()` applies an event locally and queues it for peers.
//! 4. `shutdown()` signals both tasks, joins them, then closes the pool.
//! 5. `reload()` shuts down, rebuilds the pool from a new config and starts
//!    again. It is the way out of `Stopped` and `Failed`.
//!
//! A supervisor task watches the subscriber. If the broker rejects the
//! subscription outright the node moves to `Failed` and keeps the error for
//! [`status()`](NetEvents::status).

mod types;

pub use types::{NodeState, StatusReport};

use crate::broker::redis::RedisConnector;
use crate::broker::Connector;
use crate::codec::EventCodec;
use crate::config::NetEventsConfig;
use crate::debug::DebugFlag;
use crate::debug_log;
use crate::error::{NetEventsError, Result};
use crate::identity::Identity;
use crate::metrics;
use crate::pool::ConnectionPool;
use crate::publisher::Publisher;
use crate::readiness::{ReadinessSignal, WaitOutcome};
use crate::sink::DispatchSink;
use crate::subscriber::{Subscriber, SubscriberState, SubscriberStats};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinError, JoinHandle};
use tracing::{debug, error, info, info_span, warn, Instrument};

/// How long shutdown waits for each task to exit.
const TASK_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// A replicating node: one per server process.
///
/// `E` is the host's event type. Events published here are applied locally
/// through the sink and delivered to every other node on the channel; events
/// from other nodes arrive at the same sink.
pub struct NetEvents<E, K: Connector = RedisConnector> {
    config: NetEventsConfig,
    identity: Identity,
    pool: Arc<ConnectionPool<K>>,
    codec: Arc<dyn EventCodec<E>>,
    sink: Arc<dyn DispatchSink<E>>,
    debug: DebugFlag,

    /// Satisfied on the first subscribe acknowledgement
    readiness: ReadinessSignal,

    state_tx: Arc<watch::Sender<NodeState>>,
    state_rx: watch::Receiver<NodeState>,
    last_error: Arc<Mutex<Option<String>>>,

    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,

    publisher: Option<Publisher>,
    publisher_task: Option<JoinHandle<()>>,
    subscriber_state: Option<watch::Receiver<SubscriberState>>,
    subscriber_stats: Option<Arc<SubscriberStats>>,
    /// Supervisor wrapping the subscriber task
    subscriber_task: Option<JoinHandle<()>>,
    subscriber_abort: Option<AbortHandle>,
}

impl<E> NetEvents<E, RedisConnector>
where
    E: Clone + Send + 'static,
{
    /// Node backed by the Redis broker in `config.redis`.
    pub fn redis(
        config: NetEventsConfig,
        identity: Identity,
        codec: Arc<dyn EventCodec<E>>,
        sink: Arc<dyn DispatchSink<E>>,
    ) -> Result<Self> {
        let connector = RedisConnector::new(&config.redis, &config.pool)?;
        Ok(Self::new(config, identity, connector, codec, sink))
    }

    /// Reconnect with a new configuration.
    ///
    /// The new Redis settings are validated before anything is torn down, so
    /// a bad config leaves the running node untouched.
    pub async fn reload(&mut self, config: NetEventsConfig) -> Result<ReadinessSignal> {
        let connector = RedisConnector::new(&config.redis, &config.pool)?;
        self.reload_with(config, connector).await
    }
}

impl<E, K> NetEvents<E, K>
where
    E: Clone + Send + 'static,
    K: Connector,
{
    /// Create a node. Starts in `Created`; call [`start()`](Self::start).
    pub fn new(
        config: NetEventsConfig,
        identity: Identity,
        connector: K,
        codec: Arc<dyn EventCodec<E>>,
        sink: Arc<dyn DispatchSink<E>>,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(NodeState::Created);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let pool = Arc::new(ConnectionPool::new(connector, &config.pool));
        let debug = DebugFlag::new(config.debug);

        Self {
            config,
            identity,
            pool,
            codec,
            sink,
            debug,
            readiness: ReadinessSignal::new(),
            state_tx: Arc::new(state_tx),
            state_rx,
            last_error: Arc::new(Mutex::new(None)),
            shutdown_tx,
            shutdown_rx,
            publisher: None,
            publisher_task: None,
            subscriber_state: None,
            subscriber_stats: None,
            subscriber_task: None,
            subscriber_abort: None,
        }
    }

    pub fn state(&self) -> NodeState {
        *self.state_rx.borrow()
    }

    pub fn state_receiver(&self) -> watch::Receiver<NodeState> {
        self.state_rx.clone()
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state(), NodeState::Running)
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn config(&self) -> &NetEventsConfig {
        &self.config
    }

    /// The "has ever subscribed" latch. Valid before `start()`.
    pub fn readiness(&self) -> ReadinessSignal {
        self.readiness.clone()
    }

    /// Current listen loop state, `None` before start.
    pub fn subscriber_state(&self) -> Option<SubscriberState> {
        self.subscriber_state.as_ref().map(|rx| *rx.borrow())
    }

    /// Why the node last went to `Failed`. Cleared by `reload()`.
    pub fn last_error(&self) -> Option<String> {
        lock(&self.last_error).clone()
    }

    /// Watch the listen loop. This is the "currently subscribed" view.
    pub fn subscriber_state_receiver(&self) -> Option<watch::Receiver<SubscriberState>> {
        self.subscriber_state.clone()
    }

    /// Start replicating.
    ///
    /// Probes the broker with one connection so a misconfigured host fails
    /// here instead of in the background. Then spawns the subscriber and
    /// publisher and returns without waiting for the subscription.
    pub async fn start(&mut self) -> Result<ReadinessSignal> {
        if self.state() != NodeState::Created {
            return Err(NetEventsError::InvalidState {
                expected: "Created".to_string(),
                actual: self.state().to_string(),
            });
        }

        info!(
            server_id = %self.identity.server_id,
            origin = %self.identity.origin,
            broker = %self.pool.connector().describe(),
            "Starting NetEvents"
        );
        self.set_state(NodeState::Connecting);

        match self.pool.acquire().await {
            Ok(conn) => {
                debug_log!(self.debug, conn_id = conn.id(), "Connection established");
                self.pool.release(conn, true);
            }
            Err(e) => {
                error!(
                    error = %e,
                    broker = %self.pool.connector().describe(),
                    "Could not connect to broker"
                );
                metrics::record_error("node", e.kind());
                *lock(&self.last_error) = Some(e.to_string());
                self.set_state(NodeState::Failed);
                return Err(e);
            }
        }

        let (publisher, publisher_task) =
            Publisher::spawn(Arc::clone(&self.pool), self.debug.clone(), self.shutdown_rx.clone());
        self.publisher = Some(publisher);
        self.publisher_task = Some(publisher_task);

        let subscriber = Subscriber::new(
            Arc::clone(&self.pool),
            Arc::clone(&self.codec),
            Arc::clone(&self.sink),
            self.identity.origin,
            self.config.subscriber.reconnect_backoff_duration(),
            self.debug.clone(),
        )
        .with_readiness(self.readiness.clone())
        .spawn(self.shutdown_rx.clone());

        self.subscriber_state = Some(subscriber.state);
        self.subscriber_stats = Some(subscriber.stats);
        self.subscriber_abort = Some(subscriber.task.abort_handle());
        self.subscriber_task = Some(supervise(
            subscriber.task,
            Arc::clone(&self.state_tx),
            Arc::clone(&self.last_error),
        ));

        // The supervisor may already have failed the node
        let running = self.state_tx.send_if_modified(|state| {
            if *state == NodeState::Connecting {
                *state = NodeState::Running;
                true
            } else {
                false
            }
        });
        if running {
            metrics::set_node_state(&NodeState::Running.to_string());
            info!(origin = %self.identity.origin, "NetEvents running");
        }

        Ok(self.readiness.clone())
    }

    /// Shut down, then start again against `connector` with `config`.
    ///
    /// Identity, codec, sink and the readiness signal carry over. Queued
    /// outbound events are abandoned. Works from any state, including
    /// `Failed` and `Stopped`.
    pub async fn reload_with(&mut self, config: NetEventsConfig, connector: K) -> Result<ReadinessSignal> {
        info!(broker = %connector.describe(), "Reloading NetEvents");
        self.shutdown().await;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        self.shutdown_tx = shutdown_tx;
        self.shutdown_rx = shutdown_rx;
        self.pool = Arc::new(ConnectionPool::new(connector, &config.pool));
        self.debug.set(config.debug);
        self.config = config;

        self.publisher = None;
        self.subscriber_state = None;
        self.subscriber_stats = None;
        *lock(&self.last_error) = None;

        self.set_state(NodeState::Created);
        self.start().await
    }

    /// Wait for the first subscription, up to `startup.readiness_timeout`.
    pub async fn wait_ready(&self) -> WaitOutcome {
        let limit = self.config.startup.readiness_timeout_duration();
        let outcome = self.readiness.wait_timeout(limit).await;
        if outcome == WaitOutcome::TimedOut {
            warn!(
                timeout_ms = limit.as_millis() as u64,
                "Not subscribed yet, events from other servers are not being received"
            );
        }
        outcome
    }

    /// Apply `event` on this server and replicate it to the others.
    ///
    /// Returns the same event. If it cannot be serialized it is still applied
    /// locally and [`NetEventsError::Encode`] is returned.
    pub fn publish_event(&self, event: E) -> Result<E> {
        let publisher = match (&self.publisher, self.state()) {
            (Some(publisher), NodeState::Running) => publisher,
            (_, state) => {
                return Err(NetEventsError::InvalidState {
                    expected: "Running".to_string(),
                    actual: state.to_string(),
                })
            }
        };

        let encoded = self.codec.encode(&event);
        debug_log!(self.debug, origin = %self.identity.origin, "Calling event");
        self.sink.dispatch(event.clone());

        let payload = match encoded {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Event applied locally but could not be serialized for peers");
                metrics::record_error("publisher", "encode");
                return Err(e.into());
            }
        };

        publisher.enqueue(self.identity.origin, &payload)?;
        Ok(event)
    }

    pub fn set_debug_mode(&self, enabled: bool) {
        self.debug.set(enabled);
        info!(enabled, "Debug mode changed");
    }

    pub fn debug_mode(&self) -> bool {
        self.debug.enabled()
    }

    /// Status snapshot. No I/O.
    pub fn status(&self) -> StatusReport {
        StatusReport {
            server_id: self.identity.server_id,
            origin: self.identity.origin,
            broker: self.pool.connector().describe(),
            state: self.state(),
            subscriber_state: self.subscriber_state(),
            ready: self.readiness.is_satisfied(),
            debug: self.debug.enabled(),
            subscriber: self
                .subscriber_stats
                .as_ref()
                .map(|stats| stats.snapshot())
                .unwrap_or_default(),
            publisher: self
                .publisher
                .as_ref()
                .map(|publisher| publisher.stats().snapshot())
                .unwrap_or_default(),
            pool: self.pool.stats(),
            last_error: self.last_error(),
        }
    }

    /// Stop replicating. Idempotent.
    ///
    /// 1. Signal both tasks to stop (interrupts any wait or backoff)
    /// 2. Join them, abandoning queued outbound events
    /// 3. Close the connection pool
    pub async fn shutdown(&mut self) {
        if matches!(self.state(), NodeState::Stopped | NodeState::ShuttingDown) {
            return;
        }

        info!("Shutting down NetEvents");
        self.set_state(NodeState::ShuttingDown);
        let _ = self.shutdown_tx.send(true);

        let subscriber_abort = self.subscriber_abort.take();
        if let Some(task) = self.subscriber_task.take() {
            match join_or_abort(task, TASK_JOIN_TIMEOUT).await {
                Some(Ok(())) => debug!("Subscriber supervisor completed"),
                Some(Err(e)) => warn!(error = %e, "Subscriber supervisor panicked"),
                None => {
                    warn!("Subscriber task did not stop in time, aborted");
                    if let Some(handle) = subscriber_abort {
                        handle.abort();
                    }
                }
            }
        }

        if let Some(task) = self.publisher_task.take() {
            match join_or_abort(task, TASK_JOIN_TIMEOUT).await {
                Some(Ok(())) => debug!("Publisher task completed"),
                Some(Err(e)) => warn!(error = %e, "Publisher task panicked"),
                None => warn!("Publisher task did not stop in time, aborted"),
            }
        }

        self.pool.shutdown();

        self.set_state(NodeState::Stopped);
        info!("NetEvents stopped");
    }

    fn set_state(&self, state: NodeState) {
        let _ = self.state_tx.send(state);
        metrics::set_node_state(&state.to_string());
    }
}

/// Wait on the subscriber and fail the node if it stops on an error.
///
/// Only a node that is still starting or running is moved to `Failed`; an
/// error racing with shutdown is recorded but leaves the state alone.
fn supervise(
    task: JoinHandle<Result<()>>,
    state_tx: Arc<watch::Sender<NodeState>>,
    last_error: Arc<Mutex<Option<String>>>,
) -> JoinHandle<()> {
    let supervisor = async move {
        match task.await {
            Ok(Ok(())) => debug!("Subscriber task completed"),
            Ok(Err(e)) => {
                *lock(&last_error) = Some(e.to_string());
                let failed = state_tx.send_if_modified(|state| {
                    if matches!(state, NodeState::Connecting | NodeState::Running) {
                        *state = NodeState::Failed;
                        true
                    } else {
                        false
                    }
                });
                if failed {
                    metrics::set_node_state(&NodeState::Failed.to_string());
                    error!(error = %e, "Subscription rejected by broker, node failed");
                }
            }
            Err(e) if e.is_cancelled() => debug!("Subscriber task aborted"),
            Err(e) => warn!(error = %e, "Subscriber task panicked"),
        }
    };
    tokio::spawn(supervisor.instrument(info_span!("supervisor")))
}

/// Join `task`, aborting it if it outlives `limit`. `None` on timeout.
async fn join_or_abort<T>(
    task: JoinHandle<T>,
    limit: Duration,
) -> Option<std::result::Result<T, JoinError>> {
    let abort = task.abort_handle();
    match tokio::time::timeout(limit, task).await {
        Ok(joined) => Some(joined),
        Err(_) => {
            abort.abort();
            None
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
