//! Publisher: the outbound send queue.
//!
//! Callers encode and enqueue without touching the network. A single worker
//! task drains the queue in FIFO order, publishing each frame on a pooled
//! connection.
//!
//! # Drop Policy
//!
//! Delivery is best-effort. A frame that cannot be published is dropped,
//! never retried, so one dead broker does not build up a backlog that
//! replays stale events later.
//!
//! | Failure | Connection | Frame |
//! |---------|------------|-------|
//! | Pool exhausted / broker unreachable | n/a | dropped |
//! | Connection lost mid-publish | discarded | dropped |
//! | Broker rejected the command | returned healthy | dropped |
//!
//! On shutdown the worker stops at the next wait point and anything still
//! queued is abandoned.

use crate::broker::{BrokerConnection, Connector};
use crate::config::CHANNEL;
use crate::debug::DebugFlag;
use crate::debug_log;
use crate::envelope::{self, OriginId};
use crate::error::{NetEventsError, Result};
use crate::metrics;
use crate::pool::ConnectionPool;
use crate::resilience::shutdown_signalled;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn, Instrument};

/// Live publisher counters.
#[derive(Debug, Default)]
pub struct PublisherStats {
    enqueued: AtomicU64,
    published: AtomicU64,
    dropped: AtomicU64,
    depth: AtomicU64,
}

/// Point-in-time copy of [`PublisherStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PublisherCounters {
    pub enqueued: u64,
    pub published: u64,
    pub dropped: u64,
    pub queue_depth: u64,
}

impl PublisherStats {
    pub fn enqueued(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }

    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Frames waiting for the worker.
    pub fn queue_depth(&self) -> u64 {
        self.depth.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> PublisherCounters {
        PublisherCounters {
            enqueued: self.enqueued(),
            published: self.published(),
            dropped: self.dropped(),
            queue_depth: self.queue_depth(),
        }
    }
}

/// Producer side of the send queue. Cheap to clone.
#[derive(Clone)]
pub struct Publisher {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    stats: Arc<PublisherStats>,
}

impl Publisher {
    /// Spawn the worker and return the queue handle plus the worker's task.
    pub fn spawn<K: Connector>(
        pool: Arc<ConnectionPool<K>>,
        debug: DebugFlag,
        shutdown_rx: watch::Receiver<bool>,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let stats = Arc::new(PublisherStats::default());

        let worker = Worker {
            pool,
            rx,
            stats: Arc::clone(&stats),
            debug,
        };
        let task = tokio::spawn(worker.run(shutdown_rx).instrument(info_span!("publisher")));

        (Self { tx, stats }, task)
    }

    /// Frame `payload` with `origin` and queue it for publishing.
    ///
    /// Never waits on the broker. Fails only once the worker has stopped.
    pub fn enqueue(&self, origin: OriginId, payload: &[u8]) -> Result<()> {
        let frame = envelope::encode(origin, payload);
        // Count before sending so the worker never decrements below zero
        let depth = self.stats.depth.fetch_add(1, Ordering::Relaxed) + 1;

        if self.tx.send(frame).is_err() {
            self.stats.depth.fetch_sub(1, Ordering::Relaxed);
            return Err(NetEventsError::Shutdown);
        }

        self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
        metrics::record_publish("enqueued");
        metrics::set_queue_depth(depth);
        Ok(())
    }

    pub fn stats(&self) -> &Arc<PublisherStats> {
        &self.stats
    }

    /// True once the worker has stopped and the queue is closed.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

struct Worker<K: Connector> {
    pool: Arc<ConnectionPool<K>>,
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
    stats: Arc<PublisherStats>,
    debug: DebugFlag,
}

impl<K: Connector> Worker<K> {
    async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) {
        info!("Publisher started");

        loop {
            let frame = tokio::select! {
                biased;
                _ = shutdown_signalled(&mut shutdown_rx) => break,
                frame = self.rx.recv() => match frame {
                    Some(frame) => frame,
                    None => break,
                },
            };

            let depth = self.stats.depth.fetch_sub(1, Ordering::Relaxed).saturating_sub(1);
            metrics::set_queue_depth(depth);

            tokio::select! {
                biased;
                _ = shutdown_signalled(&mut shutdown_rx) => {
                    self.drop_frame();
                    break;
                }
                _ = self.publish(&frame) => {}
            }
        }

        self.rx.close();
        let abandoned = self.stats.queue_depth();
        if abandoned > 0 {
            info!(abandoned, "Publisher stopped, queued events abandoned");
        } else {
            info!("Publisher stopped");
        }
    }

    async fn publish(&self, frame: &[u8]) {
        let mut conn = match self.pool.acquire().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!(error = %e, bytes = frame.len(), "No broker connection, dropped outbound event");
                self.drop_frame();
                return;
            }
        };

        let started = Instant::now();
        match conn.publish(CHANNEL, frame).await {
            Ok(()) => {
                metrics::record_publish_latency(started.elapsed());
                self.pool.release(conn, true);
                self.stats.published.fetch_add(1, Ordering::Relaxed);
                metrics::record_publish("published");
                debug_log!(self.debug, bytes = frame.len(), "Published event");
            }
            Err(e) if e.is_retryable() => {
                self.pool.release(conn, false);
                warn!(error = %e, "Connection lost while publishing, dropped outbound event");
                self.drop_frame();
            }
            Err(e) => {
                // The connection still works, only this command failed
                self.pool.release(conn, true);
                warn!(error = %e, "Broker rejected publish, dropped outbound event");
                metrics::record_error("publisher", e.kind());
                self.drop_frame();
            }
        }
    }

    fn drop_frame(&self) {
        self.stats.dropped.fetch_add(1, Ordering::Relaxed);
        metrics::record_publish("dropped");
        debug!(dropped = self.stats.dropped(), "Outbound event dropped");
    }
}
