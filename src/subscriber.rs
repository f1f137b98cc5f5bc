// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Subscriber: the inbound listen loop.
//!
//! A dedicated task holds one subscription to the shared channel, classifies
//! every frame and hands peer events to the [`DispatchSink`].
//!
//! # State Machine
//!
//! ```text
//!              acquire ok            subscribe ack
//! Connecting ─────────────→ Subscribing ─────────────→ Active
//!     ↑  │                      │                        │
//!     │  │ acquire failed       │ connection error       │ connection error /
//!     │  ↓                      ↓                        │ stream ended
//!     └─ Backoff ←──────────────┴────────────────────────┘
//!
//! Any state ──(shutdown / protocol error)──→ Stopped
//! ```
//!
//! # Failure Reporting
//!
//! Only the first connection failure of a streak is logged at `warn`; the
//! rest are `debug`. A subscribe acknowledgement ends the streak. The broker
//! going down for an hour produces one warning, not 1800.
//!
//! # Readiness
//!
//! The first acknowledgement satisfies the [`ReadinessSignal`]. It stays
//! satisfied across later reconnects; the live view is the state watch.

use crate::broker::{BrokerConnection, Connector};
use crate::codec::EventCodec;
use crate::config::CHANNEL;
use crate::debug::DebugFlag;
use crate::debug_log;
use crate::envelope::{self, Inbound, OriginId};
use crate::error::{NetEventsError, Result};
use crate::metrics;
use crate::pool::ConnectionPool;
use crate::readiness::ReadinessSignal;
use crate::resilience::{shutdown_signalled, sleep_or_shutdown};
use crate::sink::DispatchSink;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Listen loop state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SubscriberState {
    /// Checking a connection out of the pool.
    Connecting,
    /// Waiting for the broker to acknowledge the subscription.
    Subscribing,
    /// Receiving frames.
    Active,
    /// Waiting before the next reconnect attempt.
    Backoff,
    /// Loop has exited. Terminal.
    Stopped,
}

impl std::fmt::Display for SubscriberState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubscriberState::Connecting => write!(f, "Connecting"),
            SubscriberState::Subscribing => write!(f, "Subscribing"),
            SubscriberState::Active => write!(f, "Active"),
            SubscriberState::Backoff => write!(f, "Backoff"),
            SubscriberState::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Live subscriber counters.
#[derive(Debug, Default)]
pub struct SubscriberStats {
    failures: AtomicU64,
    failure_reports: AtomicU64,
    subscribes: AtomicU64,
    forwarded: AtomicU64,
    dropped_self: AtomicU64,
    dropped_malformed: AtomicU64,
    dropped_unknown: AtomicU64,
}

/// Point-in-time copy of [`SubscriberStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SubscriberCounters {
    pub failures: u64,
    pub failure_reports: u64,
    pub subscribes: u64,
    pub reconnects: u64,
    pub forwarded: u64,
    pub dropped_self: u64,
    pub dropped_malformed: u64,
    pub dropped_unknown: u64,
}

impl SubscriberStats {
    /// Connection failures seen, reported or not.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Failures that were reported (one per failing streak).
    pub fn failure_reports(&self) -> u64 {
        self.failure_reports.load(Ordering::Relaxed)
    }

    /// Acknowledged subscriptions, including the first.
    pub fn subscribes(&self) -> u64 {
        self.subscribes.load(Ordering::Relaxed)
    }

    /// Subscriptions re-established after the first.
    pub fn reconnects(&self) -> u64 {
        self.subscribes().saturating_sub(1)
    }

    /// Events handed to the sink.
    pub fn forwarded(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> SubscriberCounters {
        SubscriberCounters {
            failures: self.failures(),
            failure_reports: self.failure_reports(),
            subscribes: self.subscribes(),
            reconnects: self.reconnects(),
            forwarded: self.forwarded(),
            dropped_self: self.dropped_self.load(Ordering::Relaxed),
            dropped_malformed: self.dropped_malformed.load(Ordering::Relaxed),
            dropped_unknown: self.dropped_unknown.load(Ordering::Relaxed),
        }
    }
}

/// Handle to a running subscriber task.
pub struct SubscriberHandle {
    /// Current loop state.
    pub state: watch::Receiver<SubscriberState>,
    /// Satisfied on the first subscribe acknowledgement.
    pub readiness: ReadinessSignal,
    pub stats: Arc<SubscriberStats>,
    /// Resolves when the loop stops. `Err` only for protocol errors.
    pub task: JoinHandle<Result<()>>,
}

/// Outcome of one connect/subscribe/listen cycle.
enum Cycle {
    Retry,
    Shutdown,
    Fatal(NetEventsError),
}

/// Inbound listen loop. Build with [`Subscriber::new`], run with [`Subscriber::spawn`].
pub struct Subscriber<E, K: Connector> {
    pool: Arc<ConnectionPool<K>>,
    codec: Arc<dyn EventCodec<E>>,
    sink: Arc<dyn DispatchSink<E>>,
    local: OriginId,
    backoff: Duration,
    debug: DebugFlag,
    readiness: ReadinessSignal,
    stats: Arc<SubscriberStats>,
    state_tx: watch::Sender<SubscriberState>,
    failing: bool,
}

impl<E, K> Subscriber<E, K>
where
    E: Send + 'static,
    K: Connector,
{
    pub fn new(
        pool: Arc<ConnectionPool<K>>,
        codec: Arc<dyn EventCodec<E>>,
        sink: Arc<dyn DispatchSink<E>>,
        local: OriginId,
        backoff: Duration,
        debug: DebugFlag,
    ) -> Self {
        let (state_tx, _) = watch::channel(SubscriberState::Connecting);
        Self {
            pool,
            codec,
            sink,
            local,
            backoff,
            debug,
            readiness: ReadinessSignal::new(),
            stats: Arc::new(SubscriberStats::default()),
            state_tx,
            failing: false,
        }
    }

    /// Satisfy `readiness` on subscribe instead of a fresh signal.
    pub fn with_readiness(mut self, readiness: ReadinessSignal) -> Self {
        self.readiness = readiness;
        self
    }

    /// Start the loop on its own task. Returns immediately.
    pub fn spawn(self, shutdown_rx: watch::Receiver<bool>) -> SubscriberHandle {
        let state = self.state_tx.subscribe();
        let readiness = self.readiness.clone();
        let stats = Arc::clone(&self.stats);

        let span = info_span!("subscriber", origin = %self.local, channel = CHANNEL);
        let task = tokio::spawn(self.run(shutdown_rx).instrument(span));

        SubscriberHandle {
            state,
            readiness,
            stats,
            task,
        }
    }

    async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) -> Result<()> {
        info!(broker = %self.pool.connector().describe(), "Subscriber starting");

        let result = loop {
            if *shutdown_rx.borrow() {
                break Ok(());
            }

            match self.cycle(&mut shutdown_rx).await {
                Cycle::Shutdown => break Ok(()),
                Cycle::Fatal(e) => break Err(e),
                Cycle::Retry => {
                    self.set_state(SubscriberState::Backoff);
                    if !sleep_or_shutdown(self.backoff, &mut shutdown_rx).await {
                        break Ok(());
                    }
                }
            }
        };

        self.set_state(SubscriberState::Stopped);
        match &result {
            Ok(()) => info!("Subscriber stopped"),
            Err(e) => {
                error!(error = %e, "Subscriber stopped on unrecoverable broker error");
                metrics::record_error("subscriber", e.kind());
            }
        }
        result
    }

    /// One pass through Connecting → Subscribing → Active.
    async fn cycle(&mut self, shutdown_rx: &mut watch::Receiver<bool>) -> Cycle {
        self.set_state(SubscriberState::Connecting);

        let acquired = tokio::select! {
            biased;
            _ = shutdown_signalled(shutdown_rx) => return Cycle::Shutdown,
            acquired = self.pool.acquire() => acquired,
        };
        let mut conn = match acquired {
            Ok(conn) => conn,
            Err(e) => return self.on_error(e),
        };
        debug_log!(self.debug, conn_id = conn.id(), "Connection established");

        self.set_state(SubscriberState::Subscribing);
        debug_log!(self.debug, channel = CHANNEL, "Subscribe issued");

        let subscribed = tokio::select! {
            biased;
            _ = shutdown_signalled(shutdown_rx) => None,
            subscribed = conn.subscribe(CHANNEL) => Some(subscribed),
        };
        match subscribed {
            None => {
                self.pool.release(conn, false);
                return Cycle::Shutdown;
            }
            Some(Err(e)) => {
                self.pool.release(conn, false);
                metrics::record_subscribe(false);
                return self.on_error(e);
            }
            Some(Ok(())) => {}
        }

        self.on_subscribed();

        loop {
            let next = tokio::select! {
                biased;
                _ = shutdown_signalled(shutdown_rx) => None,
                next = conn.next_message() => Some(next),
            };

            match next {
                None => {
                    // Subscribed connections are never reusable
                    self.pool.release(conn, false);
                    return Cycle::Shutdown;
                }
                Some(Ok(Some(frame))) => self.handle_frame(&frame),
                Some(Ok(None)) => {
                    self.pool.release(conn, false);
                    info!("Subscription terminated by broker, resubscribing");
                    debug_log!(self.debug, channel = CHANNEL, "Subscription terminated");
                    return Cycle::Retry;
                }
                Some(Err(e)) => {
                    self.pool.release(conn, false);
                    return self.on_error(e);
                }
            }
        }
    }

    fn on_subscribed(&mut self) {
        let first = self.readiness.satisfy();
        let streak_ended = std::mem::replace(&mut self.failing, false);
        self.stats.subscribes.fetch_add(1, Ordering::Relaxed);
        metrics::record_subscribe(true);
        self.set_state(SubscriberState::Active);

        if first {
            info!("Subscribed to event channel");
        } else if streak_ended {
            info!(
                reconnects = self.stats.reconnects(),
                "Reconnected to broker, subscription restored"
            );
        } else {
            debug!("Resubscribed to event channel");
        }
    }

    /// Classify the error. Connectivity failures retry, everything else is fatal.
    fn on_error(&mut self, e: NetEventsError) -> Cycle {
        if !e.is_retryable() {
            return Cycle::Fatal(e);
        }

        self.stats.failures.fetch_add(1, Ordering::Relaxed);
        let report = !self.failing;
        if report {
            self.failing = true;
            self.stats.failure_reports.fetch_add(1, Ordering::Relaxed);
            warn!(
                error = %e,
                retry_in_ms = self.backoff.as_millis() as u64,
                "Lost connection to broker, retrying until it comes back"
            );
        } else {
            debug!(error = %e, "Broker still unreachable");
        }
        metrics::record_subscriber_failure(report);
        Cycle::Retry
    }

    fn handle_frame(&self, frame: &[u8]) {
        let inbound = envelope::classify(frame, self.local, self.codec.as_ref());
        metrics::record_inbound_frame(inbound.label());

        match inbound {
            Inbound::Accepted { origin, event } => {
                debug_log!(self.debug, origin = %origin, bytes = frame.len(), "Dispatching replicated event");
                let started = Instant::now();
                self.sink.dispatch(event);
                metrics::record_dispatch_latency(started.elapsed());
                self.stats.forwarded.fetch_add(1, Ordering::Relaxed);
            }
            Inbound::SelfOriginated => {
                self.stats.dropped_self.fetch_add(1, Ordering::Relaxed);
            }
            Inbound::Malformed(reason) => {
                self.stats.dropped_malformed.fetch_add(1, Ordering::Relaxed);
                debug_log!(self.debug, reason = %reason, "Discarded malformed frame");
            }
            Inbound::UnknownType(reason) => {
                self.stats.dropped_unknown.fetch_add(1, Ordering::Relaxed);
                debug_log!(self.debug, reason = %reason, "Discarded event of unknown type");
            }
        }
    }

    fn set_state(&self, state: SubscriberState) {
        let changed = self.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
        if changed {
            metrics::set_subscriber_state(&state.to_string());
        }
    }
}
