//! Recording sink, sample events and node builders.

use netevents::{
    DispatchSink, Identity, JsonCodec, MemoryBroker, NetEvents, NetEventsConfig, SubscriberState,
};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Sample host event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GameEvent {
    PlayerJoined { name: String },
    Chat { player: String, text: String },
    Counter(u32),
}

pub fn chat(text: &str) -> GameEvent {
    GameEvent::Chat {
        player: "steve".to_string(),
        text: text.to_string(),
    }
}

/// Dispatch sink that remembers everything it was given.
pub struct RecordingSink<E> {
    events: Mutex<Vec<E>>,
}

impl<E: Clone + Send + 'static> RecordingSink<E> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
        })
    }

    pub fn events(&self) -> Vec<E> {
        self.events.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }
}

impl<E: Clone + Send + 'static> DispatchSink<E> for RecordingSink<E> {
    fn dispatch(&self, event: E) {
        self.events.lock().unwrap().push(event);
    }
}

pub type MemoryNode = NetEvents<GameEvent, MemoryBroker>;

/// Unstarted node on `broker` with origin `port`.
pub fn memory_node(broker: &MemoryBroker, port: u16) -> (MemoryNode, Arc<RecordingSink<GameEvent>>) {
    let sink = RecordingSink::new();
    let node = NetEvents::new(
        NetEventsConfig::for_testing(),
        Identity::from_port(port),
        broker.clone(),
        Arc::new(JsonCodec::<GameEvent>::new()),
        sink.clone() as Arc<dyn DispatchSink<GameEvent>>,
    );
    (node, sink)
}

/// Started and subscribed node.
pub async fn ready_node(broker: &MemoryBroker, port: u16) -> (MemoryNode, Arc<RecordingSink<GameEvent>>) {
    let (mut node, sink) = memory_node(broker, port);
    node.start().await.expect("node failed to start");
    assert_eq!(node.wait_ready().await, netevents::WaitOutcome::Satisfied);
    (node, sink)
}

/// Poll `check` until it holds or `limit` passes.
pub async fn eventually(limit: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Wait until the node's subscriber has subscribed `count` times in total.
pub async fn wait_for_subscribes(node: &MemoryNode, count: u64) {
    let reached = eventually(Duration::from_secs(3), || {
        node.status().subscriber.subscribes >= count
            && node.subscriber_state() == Some(SubscriberState::Active)
    })
    .await;
    assert!(reached, "subscriber did not reach {} subscribes", count);
}
