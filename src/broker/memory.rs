//! In-process broker with fault injection.
//!
//! Fans published frames out to every subscriber of the channel, including
//! the publisher's own subscription, exactly like Redis. Used by the test
//! suite and for running several nodes inside one process.
//!
//! # Fault Injection
//!
//! - [`MemoryBroker::set_online(false)`](MemoryBroker::set_online): refuses new
//!   connections, fails publishes on existing ones and drops every live
//!   subscription with a connection error. Connections opened before the
//!   outage stay broken after it ends.
//! - [`MemoryBroker::close_channel`]: ends subscriptions cleanly.
//! - [`MemoryBroker::fail_next_subscribe`]: the next subscribe gets a
//!   protocol error.

use super::{BrokerConnection, BrokerFuture, Connector};
use crate::error::NetEventsError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

enum Delivery {
    Frame(Vec<u8>),
    Closed,
    Disconnected,
}

struct Inner {
    online: AtomicBool,
    /// Bumped on every outage; connections from older generations are dead.
    generation: AtomicU64,
    subscribers: Mutex<HashMap<String, Vec<mpsc::UnboundedSender<Delivery>>>>,
    published: Mutex<Vec<(String, Vec<u8>)>>,
    subscribe_error: Mutex<Option<String>>,
    connects: AtomicU64,
    refused: AtomicU64,
    subscribe_acks: AtomicU64,
}

/// Shared in-memory pub/sub broker. Cloning shares the same broker.
#[derive(Clone)]
pub struct MemoryBroker {
    inner: Arc<Inner>,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                online: AtomicBool::new(true),
                generation: AtomicU64::new(0),
                subscribers: Mutex::new(HashMap::new()),
                published: Mutex::new(Vec::new()),
                subscribe_error: Mutex::new(None),
                connects: AtomicU64::new(0),
                refused: AtomicU64::new(0),
                subscribe_acks: AtomicU64::new(0),
            }),
        }
    }

    /// Take the broker down or bring it back.
    pub fn set_online(&self, online: bool) {
        let was_online = self.inner.online.swap(online, Ordering::SeqCst);
        if was_online && !online {
            self.inner.generation.fetch_add(1, Ordering::SeqCst);
            let mut subs = lock(&self.inner.subscribers);
            for (_, senders) in subs.drain() {
                for tx in senders {
                    let _ = tx.send(Delivery::Disconnected);
                }
            }
        }
    }

    pub fn is_online(&self) -> bool {
        self.inner.online.load(Ordering::SeqCst)
    }

    /// End every subscription on `channel` as if the broker closed it.
    pub fn close_channel(&self, channel: &str) {
        if let Some(senders) = lock(&self.inner.subscribers).remove(channel) {
            for tx in senders {
                let _ = tx.send(Delivery::Closed);
            }
        }
    }

    /// Make the next subscribe attempt fail with a protocol error.
    pub fn fail_next_subscribe(&self, message: impl Into<String>) {
        *lock(&self.inner.subscribe_error) = Some(message.into());
    }

    /// Deliver a raw frame to subscribers without going through a connection.
    pub fn inject(&self, channel: &str, frame: Vec<u8>) {
        self.fan_out(channel, frame);
    }

    /// Frames successfully published to `channel`, in order.
    pub fn published(&self, channel: &str) -> Vec<Vec<u8>> {
        lock(&self.inner.published)
            .iter()
            .filter(|(ch, _)| ch == channel)
            .map(|(_, frame)| frame.clone())
            .collect()
    }

    /// Live subscriptions on `channel`.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        lock(&self.inner.subscribers)
            .get(channel)
            .map(|senders| senders.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }

    /// Successful connects so far.
    pub fn connects(&self) -> u64 {
        self.inner.connects.load(Ordering::SeqCst)
    }

    /// Connect attempts refused during outages.
    pub fn refused(&self) -> u64 {
        self.inner.refused.load(Ordering::SeqCst)
    }

    /// Subscriptions acknowledged so far.
    pub fn subscribe_acks(&self) -> u64 {
        self.inner.subscribe_acks.load(Ordering::SeqCst)
    }

    fn fan_out(&self, channel: &str, frame: Vec<u8>) {
        let mut subs = lock(&self.inner.subscribers);
        if let Some(senders) = subs.get_mut(channel) {
            senders.retain(|tx| tx.send(Delivery::Frame(frame.clone())).is_ok());
        }
    }

    fn current_generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }
}

impl Connector for MemoryBroker {
    type Connection = MemoryConnection;

    fn connect(&self) -> BrokerFuture<'_, MemoryConnection> {
        Box::pin(async move {
            if !self.is_online() {
                self.inner.refused.fetch_add(1, Ordering::SeqCst);
                return Err(NetEventsError::unavailable("CONNECT", "memory broker is offline"));
            }
            self.inner.connects.fetch_add(1, Ordering::SeqCst);
            Ok(MemoryConnection {
                broker: self.clone(),
                generation: self.current_generation(),
                inbox: None,
            })
        })
    }

    fn describe(&self) -> String {
        "memory://".to_string()
    }
}

/// A session on a [`MemoryBroker`].
pub struct MemoryConnection {
    broker: MemoryBroker,
    generation: u64,
    inbox: Option<mpsc::UnboundedReceiver<Delivery>>,
}

impl MemoryConnection {
    fn check_alive(&self, operation: &str) -> crate::Result<()> {
        if !self.broker.is_online() || self.generation != self.broker.current_generation() {
            return Err(NetEventsError::unavailable(operation, "connection reset by memory broker"));
        }
        Ok(())
    }
}

impl BrokerConnection for MemoryConnection {
    fn publish<'a>(&'a mut self, channel: &'a str, frame: &'a [u8]) -> BrokerFuture<'a, ()> {
        Box::pin(async move {
            self.check_alive("PUBLISH")?;
            lock(&self.broker.inner.published).push((channel.to_string(), frame.to_vec()));
            self.broker.fan_out(channel, frame.to_vec());
            Ok(())
        })
    }

    fn subscribe<'a>(&'a mut self, channel: &'a str) -> BrokerFuture<'a, ()> {
        Box::pin(async move {
            self.check_alive("SUBSCRIBE")?;
            if let Some(message) = lock(&self.broker.inner.subscribe_error).take() {
                return Err(NetEventsError::protocol("SUBSCRIBE", message));
            }

            let (tx, rx) = mpsc::unbounded_channel();
            lock(&self.broker.inner.subscribers)
                .entry(channel.to_string())
                .or_default()
                .push(tx);
            self.inbox = Some(rx);
            self.broker.inner.subscribe_acks.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn next_message(&mut self) -> BrokerFuture<'_, Option<Vec<u8>>> {
        Box::pin(async move {
            let inbox = self.inbox.as_mut().ok_or_else(|| {
                NetEventsError::protocol("NEXT_MESSAGE", "connection is not subscribed")
            })?;
            match inbox.recv().await {
                Some(Delivery::Frame(frame)) => Ok(Some(frame)),
                Some(Delivery::Closed) => Ok(None),
                Some(Delivery::Disconnected) | None => Err(NetEventsError::unavailable(
                    "SUBSCRIBE",
                    "memory broker dropped the subscription",
                )),
            }
        })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_fans_out_to_all_subscribers() {
        let broker = MemoryBroker::new();
        let mut a = broker.connect().await.unwrap();
        let mut b = broker.connect().await.unwrap();
        a.subscribe("ch").await.unwrap();
        b.subscribe("ch").await.unwrap();

        let mut publisher = broker.connect().await.unwrap();
        publisher.publish("ch", b"hello").await.unwrap();

        assert_eq!(a.next_message().await.unwrap(), Some(b"hello".to_vec()));
        assert_eq!(b.next_message().await.unwrap(), Some(b"hello".to_vec()));
        assert_eq!(broker.published("ch"), vec![b"hello".to_vec()]);
        assert_eq!(broker.subscribe_acks(), 2);
    }

    #[tokio::test]
    async fn test_offline_refuses_connections() {
        let broker = MemoryBroker::new();
        broker.set_online(false);

        let err = broker.connect().await.err().unwrap();
        assert!(err.is_retryable());
        assert_eq!(broker.refused(), 1);
    }

    #[tokio::test]
    async fn test_outage_breaks_existing_connections() {
        let broker = MemoryBroker::new();
        let mut sub = broker.connect().await.unwrap();
        sub.subscribe("ch").await.unwrap();
        let mut publisher = broker.connect().await.unwrap();

        broker.set_online(false);
        assert!(sub.next_message().await.unwrap_err().is_retryable());

        broker.set_online(true);
        // Stale connection stays dead after recovery
        assert!(publisher.publish("ch", b"x").await.is_err());
        assert!(broker.published("ch").is_empty());
    }

    #[tokio::test]
    async fn test_close_channel_ends_cleanly() {
        let broker = MemoryBroker::new();
        let mut sub = broker.connect().await.unwrap();
        sub.subscribe("ch").await.unwrap();

        broker.close_channel("ch");
        assert_eq!(sub.next_message().await.unwrap(), None);
        assert_eq!(broker.subscriber_count("ch"), 0);
    }

    #[tokio::test]
    async fn test_fail_next_subscribe_is_one_shot() {
        let broker = MemoryBroker::new();
        broker.fail_next_subscribe("NOPERM");

        let mut conn = broker.connect().await.unwrap();
        let err = conn.subscribe("ch").await.unwrap_err();
        assert!(matches!(err, NetEventsError::Protocol { .. }));

        let mut conn = broker.connect().await.unwrap();
        assert!(conn.subscribe("ch").await.is_ok());
    }

    #[tokio::test]
    async fn test_next_message_requires_subscription() {
        let broker = MemoryBroker::new();
        let mut conn = broker.connect().await.unwrap();
        assert!(conn.next_message().await.is_err());
    }
}
