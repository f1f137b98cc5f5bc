//! Broker connection pool.
//!
//! Checkout-style pool shared by the subscriber and publisher tasks.
//!
//! # Lifecycle
//!
//! ```text
//!            acquire()                        release(conn, true)
//! idle ──────────────────→ checked out ──────────────────────────→ idle
//!   ↑  (or dial a new one)      │
//!   │                           │ release(conn, false) / dropped
//!   │                           ↓
//!   └──────────────────── discarded (socket closed)
//! ```
//!
//! Checkouts are capped by a [`Bulkhead`]: the permit travels with the
//! [`PooledConnection`] and is returned on release. A new connection is
//! dialed only when no idle one exists, so live sockets never exceed
//! `max_connections`.
//!
//! No lock is held across I/O. The idle list is a plain mutex touched only
//! to push or pop.

use crate::broker::Connector;
use crate::config::PoolConfig;
use crate::error::{NetEventsError, Result};
use crate::metrics;
use crate::resilience::Bulkhead;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::OwnedSemaphorePermit;
use tracing::{debug, info};

/// A connection checked out of the pool.
///
/// Hand it back with [`ConnectionPool::release`]. Dropping it without
/// releasing discards the connection.
pub struct PooledConnection<C> {
    conn: C,
    id: u64,
    _permit: OwnedSemaphorePermit,
}

impl<C> PooledConnection<C> {
    /// Pool-assigned connection id, for logs.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl<C> Deref for PooledConnection<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.conn
    }
}

impl<C> DerefMut for PooledConnection<C> {
    fn deref_mut(&mut self) -> &mut C {
        &mut self.conn
    }
}

/// Snapshot of pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct PoolStats {
    pub created: u64,
    pub discarded: u64,
    pub idle: usize,
    pub outstanding: usize,
}

/// Bounded pool of broker connections.
pub struct ConnectionPool<K: Connector> {
    connector: K,
    idle: Mutex<Vec<(u64, K::Connection)>>,
    bulkhead: Bulkhead,
    acquire_timeout: Duration,
    next_id: AtomicU64,
    created: AtomicU64,
    discarded: AtomicU64,
}

impl<K: Connector> ConnectionPool<K> {
    pub fn new(connector: K, config: &PoolConfig) -> Self {
        Self {
            connector,
            idle: Mutex::new(Vec::new()),
            bulkhead: Bulkhead::new(config.max_connections),
            acquire_timeout: config.acquire_timeout_duration(),
            next_id: AtomicU64::new(1),
            created: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
        }
    }

    pub fn connector(&self) -> &K {
        &self.connector
    }

    /// Check out a connection, reusing an idle one if available.
    ///
    /// Fails with `ConnectionUnavailable` when the pool is shut down, no slot
    /// frees up within the acquire timeout, or dialing fails.
    pub async fn acquire(&self) -> Result<PooledConnection<K::Connection>> {
        if self.is_closed() {
            return Err(NetEventsError::unavailable("ACQUIRE", "connection pool is shut down"));
        }

        let permit = self
            .bulkhead
            .acquire_timeout(self.acquire_timeout)
            .await
            .map_err(|e| {
                if self.is_closed() {
                    NetEventsError::unavailable("ACQUIRE", "connection pool is shut down")
                } else {
                    NetEventsError::unavailable("ACQUIRE", e.to_string())
                }
            })?;

        if let Some((id, conn)) = self.pop_idle() {
            return Ok(PooledConnection {
                conn,
                id,
                _permit: permit,
            });
        }

        let conn = match self.connector.connect().await {
            Ok(conn) => conn,
            Err(e) => {
                metrics::record_pool_connect(false);
                return Err(e);
            }
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.created.fetch_add(1, Ordering::Relaxed);
        metrics::record_pool_connect(true);
        debug!(conn_id = id, broker = %self.connector.describe(), "Pool opened connection");

        Ok(PooledConnection {
            conn,
            id,
            _permit: permit,
        })
    }

    /// Return a connection. Unhealthy connections are closed, never reused.
    pub fn release(&self, pooled: PooledConnection<K::Connection>, healthy: bool) {
        let PooledConnection { conn, id, _permit } = pooled;

        if healthy && !self.is_closed() {
            lock(&self.idle).push((id, conn));
        } else {
            self.discarded.fetch_add(1, Ordering::Relaxed);
            metrics::record_pool_discard(if healthy { "pool_closed" } else { "broken" });
            debug!(conn_id = id, healthy, "Pool discarded connection");
            drop(conn);
        }

        metrics::set_pool_idle(self.idle_count());
        // _permit dropped here, freeing the slot
    }

    /// Close all idle connections and refuse further checkouts.
    ///
    /// Idempotent. Connections still checked out are closed when released.
    pub fn shutdown(&self) {
        if self.bulkhead.is_closed() {
            return;
        }
        self.bulkhead.close();
        let idle = std::mem::take(&mut *lock(&self.idle));
        let closed = idle.len();
        drop(idle);
        metrics::set_pool_idle(0);
        info!(closed_idle = closed, "Connection pool shut down");
    }

    pub fn is_closed(&self) -> bool {
        self.bulkhead.is_closed()
    }

    pub fn idle_count(&self) -> usize {
        lock(&self.idle).len()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            created: self.created.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            idle: self.idle_count(),
            outstanding: if self.is_closed() { 0 } else { self.bulkhead.in_use() },
        }
    }

    fn pop_idle(&self) -> Option<(u64, K::Connection)> {
        lock(&self.idle).pop()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
