//! Resilience utilities: bulkheads and cancellable waits.
//!
//! - [`Bulkhead`]: semaphore bounding concurrent connection checkouts
//! - [`sleep_or_shutdown`]: backoff sleep that a shutdown signal interrupts
//! - [`shutdown_signalled`]: select! arm for stop requests
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), netevents::resilience::BulkheadFull> {
//! use netevents::resilience::Bulkhead;
//!
//! // Bulkhead: max 8 concurrent connections
//! let bulkhead = Bulkhead::new(8);
//! let _permit = bulkhead.acquire().await?;
//! // permit dropped = slot released
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};

// =============================================================================
// Bulkhead (Concurrency Limiter)
// =============================================================================

/// Error when bulkhead is full or closed.
#[derive(Debug, Clone, thiserror::Error)]
#[error("bulkhead full: max {max_concurrent} concurrent operations")]
pub struct BulkheadFull {
    /// Maximum concurrent operations allowed.
    pub max_concurrent: usize,
}

/// Limits concurrent operations with a semaphore.
///
/// The connection pool uses one to cap checked-out connections. Closing the
/// bulkhead wakes every waiter with an error.
#[derive(Debug)]
pub struct Bulkhead {
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
}

impl Bulkhead {
    /// Create a bulkhead allowing `max_concurrent` holders. Zero is bumped to one.
    pub fn new(max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
        }
    }

    /// Acquire a permit, waiting until one is available.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, BulkheadFull> {
        Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| BulkheadFull {
                max_concurrent: self.max_concurrent,
            })
    }

    /// Acquire a permit, giving up after `timeout`.
    pub async fn acquire_timeout(
        &self,
        timeout: Duration,
    ) -> Result<OwnedSemaphorePermit, BulkheadFull> {
        match tokio::time::timeout(timeout, self.acquire()).await {
            Ok(result) => result,
            Err(_) => Err(BulkheadFull {
                max_concurrent: self.max_concurrent,
            }),
        }
    }

    /// Currently available permits.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Permits currently held.
    pub fn in_use(&self) -> usize {
        self.max_concurrent.saturating_sub(self.available())
    }

    /// Refuse all future acquires and fail current waiters.
    pub fn close(&self) {
        self.semaphore.close();
    }

    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }
}

// =============================================================================
// Cancellable waits
// =============================================================================

/// Resolve once shutdown is signalled or the sender is gone.
pub async fn shutdown_signalled(shutdown_rx: &mut watch::Receiver<bool>) {
    let _ = shutdown_rx.wait_for(|stop| *stop).await;
}

/// Sleep for `delay` unless shutdown is signalled first.
///
/// Returns `true` if the full delay elapsed, `false` on shutdown.
pub async fn sleep_or_shutdown(delay: Duration, shutdown_rx: &mut watch::Receiver<bool>) -> bool {
    if *shutdown_rx.borrow() {
        return false;
    }
    tokio::select! {
        _ = tokio::time::sleep(delay) => true,
        _ = shutdown_signalled(shutdown_rx) => false,
    }
}
