//! One-shot subscription readiness latch.
//!
//! The latch flips from `Pending` to `Satisfied` the first time the broker
//! acknowledges the subscription and never flips back. It answers "has this
//! node ever subscribed", not "is it subscribed right now"; for the live view
//! watch [`SubscriberState`](crate::subscriber::SubscriberState) instead.
//!
//! ```rust,no_run
//! # async fn example(signal: netevents::ReadinessSignal) {
//! use std::time::Duration;
//! use netevents::readiness::WaitOutcome;
//!
//! match signal.wait_timeout(Duration::from_secs(10)).await {
//!     WaitOutcome::Satisfied => { /* replicating */ }
//!     WaitOutcome::TimedOut => { /* proceed degraded */ }
//! }
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Latch state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Pending,
    Satisfied,
}

/// Outcome of a bounded wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Satisfied,
    TimedOut,
}

/// Awaitable one-shot latch. Cloning shares the same latch.
#[derive(Debug, Clone)]
pub struct ReadinessSignal {
    tx: Arc<watch::Sender<Readiness>>,
}

impl Default for ReadinessSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadinessSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Readiness::Pending);
        Self { tx: Arc::new(tx) }
    }

    /// Mark the latch satisfied.
    ///
    /// Returns `true` only on the transition; later calls are no-ops.
    pub fn satisfy(&self) -> bool {
        self.tx.send_if_modified(|state| {
            if *state == Readiness::Satisfied {
                return false;
            }
            *state = Readiness::Satisfied;
            true
        })
    }

    pub fn state(&self) -> Readiness {
        *self.tx.borrow()
    }

    pub fn is_satisfied(&self) -> bool {
        self.state() == Readiness::Satisfied
    }

    /// Wait until satisfied.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // Sender lives in self, so the channel cannot close while we wait
        let _ = rx.wait_for(|state| *state == Readiness::Satisfied).await;
    }

    /// Wait until satisfied or until `timeout` elapses.
    pub async fn wait_timeout(&self, timeout: Duration) -> WaitOutcome {
        match tokio::time::timeout(timeout, self.wait()).await {
            Ok(()) => WaitOutcome::Satisfied,
            Err(_) => WaitOutcome::TimedOut,
        }
    }
}
