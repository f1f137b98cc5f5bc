// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Redis pub/sub broker.
//!
//! Each [`RedisConnection`] wraps a multiplexed command connection used for
//! `PUBLISH`. Subscribing opens a dedicated pub/sub socket from the same
//! client, since Redis puts a subscribed connection into a mode where regular
//! commands are rejected. The command socket is closed at that point, so one
//! checkout is one socket either way. A connection that has subscribed is
//! never returned to the pool as healthy.
//!
//! Every dial and the subscribe acknowledgement are bounded by
//! `pool.connect_timeout`. Only command sockets get `CLIENT SETNAME`:
//! redis-rs `PubSub` offers no way to issue it.
//!
//! # Disconnect Detection
//!
//! `redis-rs` ends the message stream when the socket drops without yielding
//! an error, so a closed stream is reported as `ConnectionUnavailable` and the
//! listen loop goes through its backoff path.

use crate::config::{PoolConfig, RedisConfig};
use crate::error::{NetEventsError, Result};
use super::{BrokerConnection, BrokerFuture, Connector};
use futures::StreamExt;
use ::redis::aio::{MultiplexedConnection, PubSub};
use ::redis::{Client, ConnectionAddr, ConnectionInfo, RedisConnectionInfo, RedisResult};
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Dials Redis connections for the pool.
pub struct RedisConnector {
    client: Client,
    address: String,
    connection_name: Option<String>,
    connect_timeout: Duration,
}

impl RedisConnector {
    /// Build a connector from configuration. Does no I/O.
    pub fn new(redis: &RedisConfig, pool: &PoolConfig) -> Result<Self> {
        if redis.host.is_empty() {
            return Err(NetEventsError::Config("redis.host must not be empty".to_string()));
        }

        let info = ConnectionInfo {
            addr: ConnectionAddr::Tcp(redis.host.clone(), redis.port),
            redis: RedisConnectionInfo {
                password: redis.effective_password().map(str::to_string),
                ..Default::default()
            },
        };

        let client = Client::open(info)
            .map_err(|e| NetEventsError::Config(format!("Invalid Redis connection info: {}", e)))?;

        Ok(Self {
            client,
            address: format!("{}:{}", redis.host, redis.port),
            connection_name: redis.connection_name(),
            connect_timeout: pool.connect_timeout_duration(),
        })
    }
}

impl Connector for RedisConnector {
    type Connection = RedisConnection;

    fn connect(&self) -> BrokerFuture<'_, RedisConnection> {
        Box::pin(async move {
            let mut conn = dial(
                "CONNECT",
                self.connect_timeout,
                &self.address,
                self.client.get_multiplexed_async_connection(),
            )
            .await?;

            if let Some(ref name) = self.connection_name {
                let named: std::result::Result<(), _> = ::redis::cmd("CLIENT")
                    .arg("SETNAME")
                    .arg(name)
                    .query_async(&mut conn)
                    .await;
                if let Err(e) = named {
                    // Naming is cosmetic; a dead socket will show up on first use
                    warn!(name = %name, error = %e, "CLIENT SETNAME failed");
                }
            }

            debug!(address = %self.address, "Redis connection opened");

            Ok(RedisConnection {
                client: self.client.clone(),
                address: self.address.clone(),
                connect_timeout: self.connect_timeout,
                conn: Some(conn),
                pubsub: None,
                channel: None,
            })
        })
    }

    fn describe(&self) -> String {
        format!("redis://{}", self.address)
    }
}

/// Run a redis dial or handshake, giving up after `limit`.
///
/// A timeout is a connectivity failure, so the caller backs off and retries.
async fn dial<T>(
    operation: &'static str,
    limit: Duration,
    address: &str,
    attempt: impl Future<Output = RedisResult<T>>,
) -> Result<T> {
    match timeout(limit, attempt).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(NetEventsError::redis(operation, e)),
        Err(_) => Err(NetEventsError::unavailable(
            operation,
            format!("timed out after {}ms talking to {}", limit.as_millis(), address),
        )),
    }
}

/// A checked-out Redis session.
pub struct RedisConnection {
    client: Client,
    address: String,
    connect_timeout: Duration,
    /// `None` once the session has switched to subscriber mode
    conn: Option<MultiplexedConnection>,
    pubsub: Option<PubSub>,
    channel: Option<String>,
}

impl BrokerConnection for RedisConnection {
    fn publish<'a>(&'a mut self, channel: &'a str, frame: &'a [u8]) -> BrokerFuture<'a, ()> {
        Box::pin(async move {
            let conn = self.conn.as_mut().ok_or_else(|| {
                NetEventsError::protocol("PUBLISH", "connection is in subscriber mode")
            })?;
            let _receivers: i64 = ::redis::cmd("PUBLISH")
                .arg(channel)
                .arg(frame)
                .query_async(conn)
                .await
                .map_err(|e| NetEventsError::redis("PUBLISH", e))?;
            Ok(())
        })
    }

    fn subscribe<'a>(&'a mut self, channel: &'a str) -> BrokerFuture<'a, ()> {
        Box::pin(async move {
            let mut pubsub = dial(
                "SUBSCRIBE",
                self.connect_timeout,
                &self.address,
                self.client.get_async_pubsub(),
            )
            .await?;

            // Returns once the broker has acknowledged the subscription
            dial(
                "SUBSCRIBE",
                self.connect_timeout,
                &self.address,
                pubsub.subscribe(channel),
            )
            .await?;

            self.conn = None;
            self.pubsub = Some(pubsub);
            self.channel = Some(channel.to_string());
            Ok(())
        })
    }

    fn next_message(&mut self) -> BrokerFuture<'_, Option<Vec<u8>>> {
        Box::pin(async move {
            let channel = self.channel.clone().unwrap_or_default();
            let pubsub = self.pubsub.as_mut().ok_or_else(|| {
                NetEventsError::protocol("NEXT_MESSAGE", "connection is not subscribed")
            })?;

            let mut messages = pubsub.on_message();
            loop {
                match messages.next().await {
                    Some(msg) => {
                        if msg.get_channel_name() != channel {
                            continue;
                        }
                        return Ok(Some(msg.get_payload_bytes().to_vec()));
                    }
                    None => {
                        return Err(NetEventsError::unavailable(
                            "SUBSCRIBE",
                            "subscription stream closed by connection loss",
                        ))
                    }
                }
            }
        })
    }
}
