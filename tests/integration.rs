// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Integration Tests for NetEvents
//!
//! The `memory_*` tests run several nodes against the in-process broker and
//! need nothing external. The `redis_*` tests use testcontainers.
//!
//! # Running Tests
//! ```bash
//! # In-process tests
//! cargo test --test integration
//!
//! # Redis tests (requires Docker / OrbStack)
//! cargo test --test integration -- --ignored
//! ```
//!
//! # Test Organization
//! - `memory_*` - multi-node replication over MemoryBroker
//! - `redis_*` - the same paths against a real Redis

mod common;

use common::{
    chat, eventually, memory_node, ready_node, redis_config, redis_container,
    redis_container_with_password, redis_url, GameEvent, RecordingSink,
};
use futures::StreamExt;
use netevents::envelope::{self, OriginId};
use netevents::{
    DispatchSink, Identity, JsonCodec, MemoryBroker, NetEvents, NetEventsError, NodeState,
    SubscriberState, WaitOutcome, CHANNEL,
};
use std::sync::Arc;
use std::time::Duration;
use testcontainers::clients::Cli;

const SETTLE: Duration = Duration::from_millis(100);

// =============================================================================
// In-process replication
// =============================================================================

#[tokio::test]
async fn memory_two_nodes_replicate_event() {
    let broker = MemoryBroker::new();
    let (mut a, sink_a) = ready_node(&broker, 25565).await;
    let (mut b, sink_b) = ready_node(&broker, 25566).await;

    let event = chat("hello from 25565");
    let returned = a.publish_event(event.clone()).unwrap();
    assert_eq!(returned, event);

    assert!(eventually(Duration::from_secs(2), || sink_b.len() == 1).await);
    assert_eq!(sink_b.events(), vec![event.clone()]);

    // A applied it once locally and dropped its own echo
    assert!(eventually(Duration::from_secs(2), || a.status().subscriber.dropped_self == 1).await);
    assert_eq!(sink_a.events(), vec![event]);

    // Wire frame carries A's origin big-endian
    let frames = broker.published(CHANNEL);
    assert_eq!(frames.len(), 1);
    assert_eq!(&frames[0][..2], &[0x63, 0xDD]);

    a.shutdown().await;
    b.shutdown().await;
}

#[tokio::test]
async fn memory_events_flow_both_ways_without_loopback() {
    let broker = MemoryBroker::new();
    let (mut a, sink_a) = ready_node(&broker, 25565).await;
    let (mut b, sink_b) = ready_node(&broker, 25566).await;

    a.publish_event(GameEvent::Counter(1)).unwrap();
    b.publish_event(GameEvent::Counter(2)).unwrap();

    assert!(eventually(Duration::from_secs(2), || sink_a.len() == 2 && sink_b.len() == 2).await);
    tokio::time::sleep(SETTLE).await;

    // Each node saw its own event once (local) and the peer's once
    assert_eq!(sink_a.len(), 2);
    assert_eq!(sink_b.len(), 2);
    assert!(sink_a.events().contains(&GameEvent::Counter(2)));
    assert!(sink_b.events().contains(&GameEvent::Counter(1)));

    a.shutdown().await;
    b.shutdown().await;
}

#[tokio::test]
async fn memory_three_nodes_fan_out() {
    let broker = MemoryBroker::new();
    let (mut a, _) = ready_node(&broker, 25565).await;
    let (mut b, sink_b) = ready_node(&broker, 25566).await;
    let (mut c, sink_c) = ready_node(&broker, 25567).await;

    for i in 0..10 {
        a.publish_event(GameEvent::Counter(i)).unwrap();
    }

    assert!(eventually(Duration::from_secs(2), || sink_b.len() == 10 && sink_c.len() == 10).await);
    // Single publisher, single subscriber per node: order preserved
    let expected: Vec<GameEvent> = (0..10).map(GameEvent::Counter).collect();
    assert_eq!(sink_b.events(), expected);
    assert_eq!(sink_c.events(), expected);

    a.shutdown().await;
    b.shutdown().await;
    c.shutdown().await;
}

#[tokio::test]
async fn memory_unknown_event_type_is_tolerated() {
    let broker = MemoryBroker::new();
    let (mut node, sink) = ready_node(&broker, 25565).await;

    // A newer peer publishing an event this build does not know
    broker.inject(
        CHANNEL,
        envelope::encode(OriginId(25570), br#"{"WorldSaved":{"ticks":5}}"#),
    );
    broker.inject(
        CHANNEL,
        envelope::encode(OriginId(25570), &serde_json::to_vec(&GameEvent::Counter(9)).unwrap()),
    );

    assert!(eventually(Duration::from_secs(2), || sink.len() == 1).await);
    assert_eq!(sink.events(), vec![GameEvent::Counter(9)]);
    assert_eq!(node.status().subscriber.dropped_unknown, 1);
    assert_eq!(node.subscriber_state(), Some(SubscriberState::Active));

    node.shutdown().await;
}

#[tokio::test]
async fn memory_readiness_is_available_before_start() {
    let broker = MemoryBroker::new();
    let (mut node, _) = memory_node(&broker, 25565);

    let readiness = node.readiness();
    assert!(!readiness.is_satisfied());
    assert_eq!(
        readiness.wait_timeout(Duration::from_millis(20)).await,
        WaitOutcome::TimedOut
    );

    let waiter = tokio::spawn(async move { readiness.wait().await });
    node.start().await.unwrap();
    tokio::time::timeout(Duration::from_secs(2), waiter)
        .await
        .expect("readiness never satisfied")
        .unwrap();

    node.shutdown().await;
}

#[tokio::test]
async fn memory_status_reflects_activity() {
    let broker = MemoryBroker::new();
    let (mut a, _) = ready_node(&broker, 25565).await;
    let (mut b, _) = ready_node(&broker, 25566).await;

    a.publish_event(chat("one")).unwrap();
    a.publish_event(chat("two")).unwrap();
    assert!(eventually(Duration::from_secs(2), || b.status().subscriber.forwarded == 2).await);

    let status = a.status();
    assert_eq!(status.state, NodeState::Running);
    assert!(status.is_healthy());
    assert!(status.ready);
    assert_eq!(status.publisher.enqueued, 2);
    assert!(eventually(Duration::from_secs(2), || a.status().publisher.published == 2).await);

    let text = a.status().to_string();
    assert!(text.contains("Origin:        25565"));
    assert!(text.contains("Active"));

    a.shutdown().await;
    b.shutdown().await;
    assert_eq!(a.status().state, NodeState::Stopped);
}

#[tokio::test]
async fn memory_closure_sink() {
    let broker = MemoryBroker::new();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<GameEvent>();
    let sink = move |event: GameEvent| {
        let _ = tx.send(event);
    };

    let mut receiver = NetEvents::new(
        netevents::NetEventsConfig::for_testing(),
        Identity::from_port(25566),
        broker.clone(),
        Arc::new(JsonCodec::<GameEvent>::new()),
        Arc::new(sink) as Arc<dyn DispatchSink<GameEvent>>,
    );
    receiver.start().await.unwrap();
    receiver.wait_ready().await;

    let (mut sender, _) = ready_node(&broker, 25565).await;
    sender
        .publish_event(GameEvent::PlayerJoined { name: "alex".into() })
        .unwrap();

    let got = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap();
    assert_eq!(got, Some(GameEvent::PlayerJoined { name: "alex".into() }));

    sender.shutdown().await;
    receiver.shutdown().await;
}

// =============================================================================
// Redis
// =============================================================================

fn redis_node(
    config: netevents::NetEventsConfig,
    port: u16,
) -> (NetEvents<GameEvent>, Arc<RecordingSink<GameEvent>>) {
    let sink = RecordingSink::new();
    let node = NetEvents::redis(
        config,
        Identity::from_port(port),
        Arc::new(JsonCodec::<GameEvent>::new()),
        sink.clone() as Arc<dyn DispatchSink<GameEvent>>,
    )
    .expect("valid redis config");
    (node, sink)
}

#[tokio::test]
#[ignore] // Requires Docker
async fn redis_two_nodes_replicate_event() {
    let docker = Cli::default();
    let container = redis_container(&docker);

    let (mut a, sink_a) = redis_node(redis_config(&container, "lobby"), 25565);
    let (mut b, sink_b) = redis_node(redis_config(&container, "survival"), 25566);
    a.start().await.unwrap();
    b.start().await.unwrap();
    assert_eq!(a.wait_ready().await, WaitOutcome::Satisfied);
    assert_eq!(b.wait_ready().await, WaitOutcome::Satisfied);

    let event = chat("cross-server");
    a.publish_event(event.clone()).unwrap();

    assert!(eventually(Duration::from_secs(5), || sink_b.len() == 1).await);
    assert_eq!(sink_b.events(), vec![event.clone()]);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(sink_a.events(), vec![event]);
    assert_eq!(a.status().subscriber.dropped_self, 1);

    a.shutdown().await;
    b.shutdown().await;
}

#[tokio::test]
#[ignore] // Requires Docker
async fn redis_frame_layout_on_the_wire() {
    let docker = Cli::default();
    let container = redis_container(&docker);

    let client = redis::Client::open(redis_url(&container).as_str()).unwrap();
    let mut pubsub = client.get_async_pubsub().await.unwrap();
    pubsub.subscribe(CHANNEL).await.unwrap();

    let (mut node, _) = redis_node(redis_config(&container, "lobby"), 25565);
    node.start().await.unwrap();
    node.publish_event(GameEvent::Counter(7)).unwrap();

    let msg = tokio::time::timeout(Duration::from_secs(5), pubsub.on_message().next())
        .await
        .expect("no message on channel")
        .expect("stream ended");
    let frame = msg.get_payload_bytes().to_vec();

    assert_eq!(&frame[..2], &[0x63, 0xDD]);
    let decoded: GameEvent = serde_json::from_slice(&frame[2..]).unwrap();
    assert_eq!(decoded, GameEvent::Counter(7));

    node.shutdown().await;
}

#[tokio::test]
#[ignore] // Requires Docker
async fn redis_password_authentication() {
    let docker = Cli::default();
    let container = redis_container_with_password(&docker, "hunter2");

    let mut config = redis_config(&container, "lobby");
    config.redis.password = Some("hunter2".to_string());
    let (mut good, _) = redis_node(config.clone(), 25565);
    good.start().await.unwrap();
    assert_eq!(good.wait_ready().await, WaitOutcome::Satisfied);
    good.shutdown().await;

    config.redis.password = Some("wrong".to_string());
    let (mut bad, _) = redis_node(config, 25566);
    assert!(bad.start().await.is_err());
    assert_eq!(bad.state(), NodeState::Failed);
}

#[tokio::test]
#[ignore] // Requires Docker
async fn redis_reload_after_failed_start() {
    let docker = Cli::default();
    let container = redis_container(&docker);

    let mut config = redis_config(&container, "lobby");
    config.redis.port = 1;
    let (mut node, _) = redis_node(config, 25565);
    assert!(node.start().await.is_err());
    assert_eq!(node.state(), NodeState::Failed);

    // Bad settings are rejected without touching the node
    let mut invalid = redis_config(&container, "lobby");
    invalid.redis.host = String::new();
    assert!(matches!(node.reload(invalid).await, Err(NetEventsError::Config(_))));
    assert_eq!(node.state(), NodeState::Failed);

    node.reload(redis_config(&container, "lobby")).await.unwrap();
    assert_eq!(node.wait_ready().await, WaitOutcome::Satisfied);
    assert!(node.status().broker.ends_with(&container.get_host_port_ipv4(6379).to_string()));

    node.shutdown().await;
}

#[tokio::test]
async fn redis_unreachable_broker_fails_start() {
    // Port 1 is typically closed; no container needed
    let mut config = netevents::NetEventsConfig::for_testing();
    config.redis.host = "127.0.0.1".to_string();
    config.redis.port = 1;

    let (mut node, _) = redis_node(config, 25565);
    match node.start().await {
        Err(NetEventsError::ConnectionUnavailable { .. }) => {}
        other => panic!("expected ConnectionUnavailable, got {:?}", other.map(|_| ())),
    }
    assert_eq!(node.state(), NodeState::Failed);
    node.shutdown().await;
}
