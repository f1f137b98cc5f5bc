//! Event codec boundary.
//!
//! The replication layer treats event payloads as opaque bytes. Turning an
//! application event into bytes and back belongs to the host, which plugs
//! in an [`EventCodec`]. The one thing the layer needs from a codec is the
//! distinction between "garbage" and "a well-formed event I don't know",
//! because peers running a newer version may publish event types this
//! process has never heard of.
//!
//! [`JsonCodec`] is the reference implementation over `serde_json`.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Failure reported by an [`EventCodec`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// Bytes are not a valid encoding at all.
    #[error("malformed payload: {0}")]
    Malformed(String),

    /// Valid encoding of an event type this process does not know.
    #[error("unknown event type: {0}")]
    UnknownType(String),

    /// The event could not be serialized.
    #[error("encode failed: {0}")]
    Encode(String),
}

impl From<CodecError> for crate::NetEventsError {
    fn from(e: CodecError) -> Self {
        match e {
            CodecError::Malformed(msg) => Self::MalformedFrame(msg),
            CodecError::UnknownType(msg) => Self::UnknownPayload(msg),
            CodecError::Encode(msg) => Self::Encode(msg),
        }
    }
}

/// Serializes application events to payload bytes and back.
pub trait EventCodec<E>: Send + Sync + 'static {
    fn encode(&self, event: &E) -> Result<Vec<u8>, CodecError>;

    fn decode(&self, payload: &[u8]) -> Result<E, CodecError>;
}

/// JSON event codec.
///
/// Serde's data-category errors (unknown variant, wrong shape) map to
/// [`CodecError::UnknownType`]; syntax and EOF errors map to
/// [`CodecError::Malformed`].
pub struct JsonCodec<E> {
    _event: PhantomData<fn() -> E>,
}

impl<E> JsonCodec<E> {
    pub fn new() -> Self {
        Self { _event: PhantomData }
    }
}

impl<E> Default for JsonCodec<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> EventCodec<E> for JsonCodec<E>
where
    E: Serialize + DeserializeOwned + 'static,
{
    fn encode(&self, event: &E) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(event).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode(&self, payload: &[u8]) -> Result<E, CodecError> {
        serde_json::from_slice(payload).map_err(|e| match e.classify() {
            serde_json::error::Category::Data => CodecError::UnknownType(e.to_string()),
            _ => CodecError::Malformed(e.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::collections::HashMap;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    enum Event {
        Join { player: String },
        Leave { player: String },
    }

    #[test]
    fn test_json_roundtrip() {
        let codec = JsonCodec::<Event>::new();
        let bytes = codec.encode(&Event::Join { player: "zml".into() }).unwrap();
        assert_eq!(codec.decode(&bytes).unwrap(), Event::Join { player: "zml".into() });
    }

    #[test]
    fn test_unknown_variant_is_unknown_type() {
        let codec = JsonCodec::<Event>::new();
        let err = codec.decode(br#"{"Respawn":{"player":"a"}}"#).unwrap_err();
        assert!(matches!(err, CodecError::UnknownType(_)));
    }

    #[test]
    fn test_truncated_is_malformed() {
        let codec = JsonCodec::<Event>::new();
        let err = codec.decode(br#"{"Leave":{"play"#).unwrap_err();
        assert!(matches!(err, CodecError::Malformed(_)));

        let err = codec.decode(b"").unwrap_err();
        assert!(matches!(err, CodecError::Malformed(_)));
    }

    #[test]
    fn test_encode_failure_reported() {
        // Non-string map keys cannot be serialized to JSON
        let codec = JsonCodec::<HashMap<(u8, u8), u8>>::new();
        let mut map = HashMap::new();
        map.insert((1, 2), 3);
        let err = codec.encode(&map).unwrap_err();
        assert!(matches!(err, CodecError::Encode(_)));
    }

    #[test]
    fn test_codec_error_maps_to_crate_error() {
        use crate::NetEventsError;

        let err: NetEventsError = CodecError::UnknownType("Respawn".into()).into();
        assert!(matches!(err, NetEventsError::UnknownPayload(_)));
        let err: NetEventsError = CodecError::Malformed("eof".into()).into();
        assert!(matches!(err, NetEventsError::MalformedFrame(_)));
        let err: NetEventsError = CodecError::Encode("key must be a string".into()).into();
        assert!(matches!(err, NetEventsError::Encode(_)));
    }
}
