//! Fuzz target for inbound frame handling.
//!
//! Frames come straight off a shared channel any process can publish to, so
//! decoding and classification must never panic on arbitrary input.

#![no_main]

use libfuzzer_sys::fuzz_target;
use netevents::codec::JsonCodec;
use netevents::envelope::{classify, decode, encode, Inbound, OriginId, ORIGIN_LEN};

fuzz_target!(|data: (u16, &[u8])| {
    let (local, frame) = data;

    // Should never panic
    match decode(frame) {
        Ok(envelope) => {
            assert!(frame.len() >= ORIGIN_LEN);
            // Re-encoding reproduces the frame exactly
            assert_eq!(encode(envelope.origin, envelope.payload), frame);
        }
        Err(_) => assert!(frame.len() < ORIGIN_LEN),
    }

    let codec = JsonCodec::<serde_json::Value>::new();
    let inbound = classify::<serde_json::Value>(frame, OriginId(local), &codec);
    if frame.len() >= ORIGIN_LEN && u16::from_be_bytes([frame[0], frame[1]]) == local {
        assert!(matches!(inbound, Inbound::SelfOriginated));
    }
});
