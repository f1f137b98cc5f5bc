//! Property-based tests using proptest.
//!
//! These tests verify invariants that should hold for all inputs,
//! helping catch edge cases that unit tests might miss.

use netevents::codec::{EventCodec, JsonCodec};
use netevents::envelope::{classify, decode, encode, Inbound, OriginId, ORIGIN_LEN};
use proptest::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Event {
    Text(String),
    Number(i64),
    Pair { a: u16, b: bool },
}

fn any_event() -> impl Strategy<Value = Event> {
    prop_oneof![
        ".*".prop_map(Event::Text),
        any::<i64>().prop_map(Event::Number),
        (any::<u16>(), any::<bool>()).prop_map(|(a, b)| Event::Pair { a, b }),
    ]
}

// =============================================================================
// Envelope Properties
// =============================================================================

proptest! {
    /// decode(encode(o, p)) yields o and p unchanged
    #[test]
    fn envelope_round_trip(origin in any::<u16>(), payload in proptest::collection::vec(any::<u8>(), 0..512)) {
        let frame = encode(OriginId(origin), &payload);
        prop_assert_eq!(frame.len(), ORIGIN_LEN + payload.len());

        let envelope = decode(&frame).unwrap();
        prop_assert_eq!(envelope.origin, OriginId(origin));
        prop_assert_eq!(envelope.payload, payload.as_slice());
    }

    /// Origin is always the big-endian prefix
    #[test]
    fn origin_is_big_endian_prefix(origin in any::<u16>(), payload in proptest::collection::vec(any::<u8>(), 0..16)) {
        let frame = encode(OriginId(origin), &payload);
        prop_assert_eq!(frame[0], (origin >> 8) as u8);
        prop_assert_eq!(frame[1], (origin & 0xFF) as u8);
    }

    /// Frames shorter than the header never decode
    #[test]
    fn short_frames_rejected(frame in proptest::collection::vec(any::<u8>(), 0..ORIGIN_LEN)) {
        prop_assert!(decode(&frame).is_err());
    }

    /// Decoding arbitrary bytes never panics
    #[test]
    fn decode_never_panics(frame in proptest::collection::vec(any::<u8>(), 0..256)) {
        let _ = decode(&frame);
    }
}

// =============================================================================
// Loopback Suppression
// =============================================================================

proptest! {
    /// Any frame stamped with the local origin is dropped, whatever its payload
    #[test]
    fn own_origin_always_suppressed(local in any::<u16>(), payload in proptest::collection::vec(any::<u8>(), 0..256)) {
        let codec = JsonCodec::<Event>::new();
        let frame = encode(OriginId(local), &payload);
        prop_assert_eq!(classify::<Event>(&frame, OriginId(local), &codec), Inbound::SelfOriginated);
    }

    /// A peer's well-formed event is accepted intact
    #[test]
    fn peer_events_accepted(local in any::<u16>(), peer in any::<u16>(), event in any_event()) {
        prop_assume!(local != peer);
        let codec = JsonCodec::<Event>::new();
        let frame = encode(OriginId(peer), &codec.encode(&event).unwrap());

        prop_assert_eq!(
            classify::<Event>(&frame, OriginId(local), &codec),
            Inbound::Accepted { origin: OriginId(peer), event }
        );
    }

    /// Peer frames with arbitrary payloads classify without panicking and never as self
    #[test]
    fn peer_garbage_never_self(local in any::<u16>(), peer in any::<u16>(), payload in proptest::collection::vec(any::<u8>(), 0..128)) {
        prop_assume!(local != peer);
        let codec = JsonCodec::<Event>::new();
        let frame = encode(OriginId(peer), &payload);
        prop_assert_ne!(classify::<Event>(&frame, OriginId(local), &codec), Inbound::SelfOriginated);
    }
}
