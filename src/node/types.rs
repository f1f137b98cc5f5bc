//! Node state and status types.
//!
//! # State Transitions
//!
//! ```text
//!                  start()
//! Created ───────────────────→ Connecting
//!    ↑ │                         │      │
//!    │ │ shutdown()  (probe ok)  │      │ (broker unreachable)
//!    │ │                         ↓      ↓
//!    │ │                     Running ──→ Failed
//!    │ │                         │  (protocol error)
//!    │ │              shutdown() │
//!    │ │                         ↓
//!    │ └──────────────→ ShuttingDown ──→ Stopped
//!    │                                      │
//!    └────────── reload() ──────────────────┘ (also from Failed)
//! ```
//!
//! - **Created**: after `NetEvents::new()` or during `reload()`. No connections.
//! - **Connecting**: `start()` is probing the broker.
//! - **Running**: subscriber and publisher tasks are live. The subscriber
//!   may still be reconnecting; see [`SubscriberState`].
//! - **ShuttingDown**: tasks signalled, being joined.
//! - **Stopped**: pool closed. Only `reload()` leaves it.
//! - **Failed**: the startup probe could not reach the broker, or the broker
//!   rejected the subscription. The cause is in [`StatusReport::last_error`].

use crate::envelope::OriginId;
use crate::pool::PoolStats;
use crate::publisher::PublisherCounters;
use crate::subscriber::{SubscriberCounters, SubscriberState};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

/// Lifecycle state of a [`NetEvents`](super::NetEvents) node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NodeState {
    /// Created but not started.
    Created,
    /// Probing the broker.
    Connecting,
    /// Replicating.
    Running,
    /// Stopping tasks.
    ShuttingDown,
    /// Shut down cleanly.
    Stopped,
    /// Startup probe or subscription failed for good. Recover with `reload()`.
    Failed,
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeState::Created => write!(f, "Created"),
            NodeState::Connecting => write!(f, "Connecting"),
            NodeState::Running => write!(f, "Running"),
            NodeState::ShuttingDown => write!(f, "ShuttingDown"),
            NodeState::Stopped => write!(f, "Stopped"),
            NodeState::Failed => write!(f, "Failed"),
        }
    }
}

/// Status snapshot for operators.
///
/// Collected from atomics and watch channels only; building one does no I/O.
///
/// ```rust,ignore
/// let status = node.status();
/// println!("{}", status);                           // human summary
/// let json = serde_json::to_string(&status)?;       // machine-readable
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub server_id: Uuid,
    pub origin: OriginId,
    pub broker: String,
    pub state: NodeState,
    /// `None` before start.
    pub subscriber_state: Option<SubscriberState>,
    /// Has the subscription ever been acknowledged.
    pub ready: bool,
    pub debug: bool,
    pub subscriber: SubscriberCounters,
    pub publisher: PublisherCounters,
    pub pool: PoolStats,
    /// Why the node went to `Failed`, if it did.
    pub last_error: Option<String>,
}

impl StatusReport {
    /// Running with a live subscription.
    pub fn is_healthy(&self) -> bool {
        self.state == NodeState::Running && self.subscriber_state == Some(SubscriberState::Active)
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let subscription = match self.subscriber_state {
            Some(state) => state.to_string(),
            None => "not started".to_string(),
        };

        writeln!(f, "NetEvents status")?;
        writeln!(f, "  Server ID:     {}", self.server_id)?;
        writeln!(f, "  Origin:        {}", self.origin)?;
        writeln!(f, "  Broker:        {}", self.broker)?;
        writeln!(f, "  State:         {}", self.state)?;
        writeln!(f, "  Subscription:  {} (ready: {})", subscription, self.ready)?;
        writeln!(f, "  Debug mode:    {}", if self.debug { "on" } else { "off" })?;
        writeln!(
            f,
            "  Outbound:      {} queued, {} published, {} dropped",
            self.publisher.queue_depth, self.publisher.published, self.publisher.dropped
        )?;
        writeln!(
            f,
            "  Inbound:       {} forwarded, {} own, {} malformed, {} unknown",
            self.subscriber.forwarded,
            self.subscriber.dropped_self,
            self.subscriber.dropped_malformed,
            self.subscriber.dropped_unknown
        )?;
        writeln!(
            f,
            "  Reconnects:    {} ({} outages reported)",
            self.subscriber.reconnects, self.subscriber.failure_reports
        )?;
        write!(
            f,
            "  Connections:   {} idle, {} in use, {} opened",
            self.pool.idle, self.pool.outstanding, self.pool.created
        )?;
        if let Some(ref error) = self.last_error {
            write!(f, "\n  Last error:    {}", error)?;
        }
        Ok(())
    }
}
