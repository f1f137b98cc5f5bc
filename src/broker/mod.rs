// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Broker integration traits.
//!
//! Defines what the replication layer needs from a pub/sub broker: a way to
//! dial connections, and on each connection the ability to publish a frame or
//! hold a subscription open. The pool, subscriber and publisher only see these
//! traits, which lets tests swap in [`memory::MemoryBroker`].
//!
//! Implementations:
//! - [`redis::RedisConnector`]: the production broker
//! - [`memory::MemoryBroker`]: in-process fan-out with fault injection
//!
//! # Error Contract
//!
//! Every operation resolves to [`crate::Result`]. Connectivity problems must
//! surface as [`NetEventsError::ConnectionUnavailable`](crate::NetEventsError::ConnectionUnavailable)
//! so callers discard the connection and back off; anything else is a
//! [`NetEventsError::Protocol`](crate::NetEventsError::Protocol) error.

pub mod memory;
pub mod redis;

use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by broker operations.
pub type BrokerFuture<'a, T> = Pin<Box<dyn Future<Output = crate::Result<T>> + Send + 'a>>;

/// One broker session.
///
/// A connection is used for either a single publish or a whole subscription.
/// After `subscribe` succeeds the connection is in subscriber mode and only
/// `next_message` is valid.
pub trait BrokerConnection: Send + 'static {
    /// Publish a frame to a channel.
    fn publish<'a>(&'a mut self, channel: &'a str, frame: &'a [u8]) -> BrokerFuture<'a, ()>;

    /// Subscribe to a channel. Resolves once the broker acknowledges.
    fn subscribe<'a>(&'a mut self, channel: &'a str) -> BrokerFuture<'a, ()>;

    /// Wait for the next frame on the subscribed channel.
    ///
    /// `Ok(None)` means the broker ended the subscription cleanly.
    fn next_message(&mut self) -> BrokerFuture<'_, Option<Vec<u8>>>;
}

/// Dials new broker connections for the pool.
pub trait Connector: Send + Sync + 'static {
    type Connection: BrokerConnection;

    /// Open a new connection. Must fail with `ConnectionUnavailable` when
    /// the broker is unreachable.
    fn connect(&self) -> BrokerFuture<'_, Self::Connection>;

    /// Human-readable broker address for logs.
    fn describe(&self) -> String;
}
