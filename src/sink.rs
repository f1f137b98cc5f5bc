//! Dispatch sink: hands accepted events to the host application.
//!
//! The subscriber task is the only caller. Implementations must return
//! quickly and move real work onto the host's own loop.

use tokio::sync::mpsc;
use tracing::warn;

/// Receives events replicated from peers.
pub trait DispatchSink<E>: Send + Sync + 'static {
    fn dispatch(&self, event: E);
}

/// Forwards events to the host over an unbounded channel.
pub struct ChannelSink<E> {
    tx: mpsc::UnboundedSender<E>,
}

impl<E: Send + 'static> ChannelSink<E> {
    /// Create a sink and the receiver the host drains.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<E>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn from_sender(tx: mpsc::UnboundedSender<E>) -> Self {
        Self { tx }
    }
}

impl<E: Send + 'static> DispatchSink<E> for ChannelSink<E> {
    fn dispatch(&self, event: E) {
        if self.tx.send(event).is_err() {
            warn!("Dispatch receiver dropped, event discarded");
        }
    }
}

impl<E, F> DispatchSink<E> for F
where
    F: Fn(E) + Send + Sync + 'static,
{
    fn dispatch(&self, event: E) {
        self(event)
    }
}
