//! Wire envelope: origin identifier plus opaque event payload.
//!
//! # Frame Layout
//!
//! ```text
//! ┌────────────┬──────────────────────────────────────┐
//! │ origin u16 │ payload (runs to end of frame)       │
//! │ big-endian │ serialized event, owned by the codec │
//! └────────────┴──────────────────────────────────────┘
//!   bytes 0..2   bytes 2..
//! ```
//!
//! There is no length prefix on the payload. A frame shorter than two bytes
//! is malformed.
//!
//! Inbound frames are classified into an [`Inbound`] tag rather than
//! returned as errors, so the listen loop can count and skip the bad ones
//! without ever tearing down the subscription.

use crate::codec::{CodecError, EventCodec};
use crate::error::{NetEventsError, Result};
use serde::{Deserialize, Serialize};

/// Size of the origin header.
pub const ORIGIN_LEN: usize = 2;

/// Identifies the publishing process on the shared network.
///
/// Derived from the process's listening port in practice; any stable,
/// network-unique small integer works.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OriginId(pub u16);

impl OriginId {
    pub fn get(self) -> u16 {
        self.0
    }
}

impl From<u16> for OriginId {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for OriginId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A decoded frame borrowing its payload from the wire buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Envelope<'a> {
    pub origin: OriginId,
    pub payload: &'a [u8],
}

/// Encode an envelope into a frame.
pub fn encode(origin: OriginId, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(ORIGIN_LEN + payload.len());
    frame.extend_from_slice(&origin.0.to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// Decode a frame into its envelope.
///
/// Fails with [`NetEventsError::MalformedFrame`] when the origin header is
/// incomplete. An empty payload is valid at this layer; whether it means
/// anything is the event codec's call.
pub fn decode(frame: &[u8]) -> Result<Envelope<'_>> {
    if frame.len() < ORIGIN_LEN {
        return Err(NetEventsError::MalformedFrame(format!(
            "frame is {} bytes, need at least {}",
            frame.len(),
            ORIGIN_LEN
        )));
    }
    let origin = u16::from_be_bytes([frame[0], frame[1]]);
    Ok(Envelope {
        origin: OriginId(origin),
        payload: &frame[ORIGIN_LEN..],
    })
}

/// Result of classifying an inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound<E> {
    /// A peer's event, ready for dispatch.
    Accepted { origin: OriginId, event: E },
    /// Our own publish echoed back by the broker.
    SelfOriginated,
    /// Truncated frame or unreadable payload.
    Malformed(String),
    /// Well-formed payload naming an event type unknown locally.
    UnknownType(String),
}

impl<E> Inbound<E> {
    /// Metric/log label for this outcome.
    pub fn label(&self) -> &'static str {
        match self {
            Inbound::Accepted { .. } => "accepted",
            Inbound::SelfOriginated => "self",
            Inbound::Malformed(_) => "malformed",
            Inbound::UnknownType(_) => "unknown",
        }
    }
}

/// Decode and filter one inbound frame.
///
/// The origin check runs before the payload is deserialized, so our own
/// echoes cost nothing beyond the header read.
pub fn classify<E: 'static>(frame: &[u8], local: OriginId, codec: &dyn EventCodec<E>) -> Inbound<E> {
    let envelope = match decode(frame) {
        Ok(envelope) => envelope,
        Err(e) => return Inbound::Malformed(e.to_string()),
    };

    if envelope.origin == local {
        return Inbound::SelfOriginated;
    }

    match codec.decode(envelope.payload) {
        Ok(event) => Inbound::Accepted {
            origin: envelope.origin,
            event,
        },
        Err(CodecError::UnknownType(msg)) => Inbound::UnknownType(msg),
        Err(CodecError::Malformed(msg)) | Err(CodecError::Encode(msg)) => Inbound::Malformed(msg),
    }
}
