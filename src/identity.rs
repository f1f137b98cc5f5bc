//! Process identity.

use crate::envelope::OriginId;
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

/// Who this process is on the wire and in logs.
///
/// `origin` is stamped on every outbound frame and must be unique across the
/// fleet; the listening port is used since servers on one host cannot share it.
/// `server_id` is a random per-process id for status output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub origin: OriginId,
    pub server_id: Uuid,
}

impl Identity {
    pub fn new(origin: OriginId, server_id: Uuid) -> Self {
        Self { origin, server_id }
    }

    /// Identity for a server listening on `port`, with a fresh server id.
    pub fn from_port(port: u16) -> Self {
        Self {
            origin: OriginId(port),
            server_id: Uuid::new_v4(),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (origin {})", self.server_id, self.origin)
    }
}
