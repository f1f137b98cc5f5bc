// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error types for the network event layer.
//!
//! Errors are split by whether the replication layer can absorb them on its own
//! or whether they have to surface to whoever started the node.
//!
//! # Error Categories
//!
//! | Error Type | Retryable | Description |
//! |------------|-----------|-------------|
//! | `ConnectionUnavailable` | Yes | Broker unreachable, pool exhausted, connection dropped |
//! | `Protocol` | No | Broker rejected a command (auth, wrong type, version mismatch) |
//! | `MalformedFrame` | No | Frame too short or payload unreadable |
//! | `UnknownPayload` | No | Payload is an event type this process does not know |
//! | `Encode` | No | Local event serialization failed |
//! | `Config` | No | Configuration invalid |
//! | `InvalidState` | No | Node lifecycle violation |
//! | `Shutdown` | No | Node is shutting down |
//!
//! # Propagation
//!
//! Retryable errors never reach application code: the subscriber absorbs them
//! with its backoff loop and the publisher drops the affected frame. Only
//! startup failures, protocol errors and encode failures propagate.

use thiserror::Error;

/// Result type alias for network event operations.
pub type Result<T> = std::result::Result<T, NetEventsError>;

/// Errors that can occur while replicating events.
#[derive(Error, Debug)]
pub enum NetEventsError {
    /// The broker could not be reached or the connection was lost.
    ///
    /// Covers pool exhaustion, refused connections, timeouts and dropped
    /// sockets. The subscriber retries these forever; the publisher drops
    /// the frame it was sending.
    #[error("Connection unavailable ({operation}): {message}")]
    ConnectionUnavailable {
        operation: String,
        message: String,
        #[source]
        source: Option<redis::RedisError>,
    },

    /// Broker-level failure unrelated to connectivity.
    ///
    /// Indicates misconfiguration or a version mismatch. Fatal to the
    /// subscriber's current run.
    #[error("Broker protocol error ({operation}): {message}")]
    Protocol {
        operation: String,
        message: String,
        #[source]
        source: Option<redis::RedisError>,
    },

    /// Frame could not be decoded.
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// Frame decoded but carries an event type unknown to this process.
    ///
    /// Peers running other versions may publish these; they are tolerated.
    #[error("Unknown payload: {0}")]
    UnknownPayload(String),

    /// Local serialization of an outbound event failed.
    #[error("Encode failure: {0}")]
    Encode(String),

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Node lifecycle violation (e.g. starting twice).
    #[error("Invalid state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    /// Shutdown in progress.
    #[error("Shutdown in progress")]
    Shutdown,
}

impl NetEventsError {
    /// Classify a redis error: connectivity problems become
    /// `ConnectionUnavailable`, everything else is a `Protocol` error.
    pub fn redis(operation: impl Into<String>, source: redis::RedisError) -> Self {
        let operation = operation.into();
        let message = source.to_string();
        if is_connection_error(&source) {
            Self::ConnectionUnavailable {
                operation,
                message,
                source: Some(source),
            }
        } else {
            Self::Protocol {
                operation,
                message,
                source: Some(source),
            }
        }
    }

    /// Create a connection error without a redis source.
    pub fn unavailable(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConnectionUnavailable {
            operation: operation.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Create a protocol error without a redis source.
    pub fn protocol(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Protocol {
            operation: operation.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ConnectionUnavailable { .. } => true,
            Self::Protocol { .. } => false,
            Self::MalformedFrame(_) => false,
            Self::UnknownPayload(_) => false,
            Self::Encode(_) => false,
            Self::Config(_) => false,
            Self::InvalidState { .. } => false,
            Self::Shutdown => false,
        }
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConnectionUnavailable { .. } => "connection_unavailable",
            Self::Protocol { .. } => "protocol",
            Self::MalformedFrame(_) => "malformed_frame",
            Self::UnknownPayload(_) => "unknown_payload",
            Self::Encode(_) => "encode",
            Self::Config(_) => "config",
            Self::InvalidState { .. } => "invalid_state",
            Self::Shutdown => "shutdown",
        }
    }
}

impl From<redis::RedisError> for NetEventsError {
    fn from(e: redis::RedisError) -> Self {
        Self::redis("unknown", e)
    }
}

fn is_connection_error(e: &redis::RedisError) -> bool {
    e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout()
}
