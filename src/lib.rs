//! # NetEvents
//!
//! Event replication across a fleet of server processes over Redis pub/sub.
//!
//! ## Architecture
//!
//! Every process runs one [`NetEvents`] node. Events published locally are
//! applied through the host's [`DispatchSink`] and broadcast; events from
//! other processes arrive at the same sink. A process never re-applies its
//! own events when the broker echoes them back.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                               NetEvents                              │
//! │                                                                      │
//! │  publish_event ──► Publisher ──► queue ──► worker ──┐                │
//! │        │           (encode)               (PUBLISH) │                │
//! │        ▼                                            ▼                │
//! │  DispatchSink ◄── Subscriber ◄──────────── ConnectionPool ◄──► Redis │
//! │                   (decode, drop own                                  │
//! │                    origin, backoff)                                  │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Wire Format
//!
//! Channel `"NetEvents"`, frames are a 2-byte big-endian [`OriginId`]
//! followed by the codec's payload. See [`envelope`].
//!
//! ## Usage
//!
//! ```rust,no_run
//! use netevents::{ChannelSink, Identity, JsonCodec, NetEvents, NetEventsConfig};
//! use serde::{Deserialize, Serialize};
//! use std::sync::Arc;
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! enum ServerEvent {
//!     Broadcast { message: String },
//! }
//!
//! #[tokio::main]
//! async fn main() -> netevents::Result<()> {
//!     let (sink, mut events) = ChannelSink::<ServerEvent>::new();
//!     let mut node = NetEvents::redis(
//!         NetEventsConfig::default(),
//!         Identity::from_port(25565),
//!         Arc::new(JsonCodec::<ServerEvent>::new()),
//!         Arc::new(sink),
//!     )?;
//!
//!     node.start().await?;
//!     node.wait_ready().await;
//!
//!     node.publish_event(ServerEvent::Broadcast { message: "hello".into() })?;
//!     while let Some(event) = events.recv().await {
//!         println!("{:?}", event);
//!     }
//!
//!     node.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod broker;
pub mod codec;
pub mod config;
pub mod debug;
pub mod envelope;
pub mod error;
pub mod identity;
pub mod metrics;
pub mod node;
pub mod pool;
pub mod publisher;
pub mod readiness;
pub mod resilience;
pub mod sink;
pub mod subscriber;

#[doc(hidden)]
pub use tracing;

// Re-exports for convenience
pub use broker::memory::MemoryBroker;
pub use broker::redis::RedisConnector;
pub use broker::{BrokerConnection, Connector};
pub use codec::{CodecError, EventCodec, JsonCodec};
pub use config::{NetEventsConfig, PoolConfig, RedisConfig, CHANNEL};
pub use debug::DebugFlag;
pub use envelope::{Envelope, Inbound, OriginId};
pub use error::{NetEventsError, Result};
pub use identity::Identity;
pub use node::{NetEvents, NodeState, StatusReport};
pub use pool::{ConnectionPool, PooledConnection};
pub use publisher::Publisher;
pub use readiness::{ReadinessSignal, WaitOutcome};
pub use sink::{ChannelSink, DispatchSink};
pub use subscriber::{SubscriberHandle, SubscriberState};
