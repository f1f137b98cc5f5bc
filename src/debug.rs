//! Runtime-toggleable debug logging.
//!
//! Debug events are emitted at `info` level under the `netevents::debug`
//! target so switching debug mode on does not also require changing the
//! tracing filter.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared debug switch. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct DebugFlag(Arc<AtomicBool>);

impl DebugFlag {
    pub fn new(enabled: bool) -> Self {
        Self(Arc::new(AtomicBool::new(enabled)))
    }

    pub fn set(&self, enabled: bool) {
        self.0.store(enabled, Ordering::Relaxed);
    }

    pub fn enabled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Log through `tracing` only while the given [`DebugFlag`] is on.
///
/// ```rust
/// use netevents::{debug_log, DebugFlag};
///
/// let flag = DebugFlag::new(true);
/// debug_log!(flag, origin = 25565u16, "Calling event");
/// ```
#[macro_export]
macro_rules! debug_log {
    ($flag:expr, $($arg:tt)+) => {
        if $flag.enabled() {
            $crate::tracing::info!(target: "netevents::debug", $($arg)+);
        }
    };
}
