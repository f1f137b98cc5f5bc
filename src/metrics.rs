//! Metrics for observability.
//!
//! Exports Prometheus-compatible metrics for:
//! - Broker connection pool activity
//! - Subscription lifecycle (subscribes, failures, state)
//! - Inbound frame classification
//! - Outbound publish outcomes and queue depth
//!
//! # Metric Naming Convention
//!
//! All metrics are prefixed with `netevents_` and follow Prometheus conventions:
//! - Counters end in `_total`
//! - Gauges represent current state
//! - Histograms track distributions (duration)
//!
//! # Usage
//!
//! ```rust,no_run
//! use netevents::metrics;
//!
//! // In the subscriber after classifying a frame
//! metrics::record_inbound_frame("accepted");
//!
//! // In the publisher worker after a publish attempt
//! metrics::record_publish("published");
//! ```

use metrics::{counter, gauge, histogram};
use std::time::Duration;

// =============================================================================
// Connection Pool Metrics
// =============================================================================

/// Record a pool dial attempt.
pub fn record_pool_connect(success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!("netevents_pool_connects_total", "status" => status).increment(1);
}

/// Record a connection closed by the pool instead of being reused.
pub fn record_pool_discard(reason: &str) {
    counter!("netevents_pool_discards_total", "reason" => reason.to_string()).increment(1);
}

/// Gauge for idle pooled connections.
pub fn set_pool_idle(count: usize) {
    gauge!("netevents_pool_idle_connections").set(count as f64);
}

// =============================================================================
// Subscriber Metrics
// =============================================================================

/// Record a subscribe attempt outcome.
pub fn record_subscribe(success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!("netevents_subscribes_total", "status" => status).increment(1);
}

/// Record a subscriber connection failure. `reported` is true for the first
/// failure of a streak.
pub fn record_subscriber_failure(reported: bool) {
    counter!("netevents_subscriber_failures_total").increment(1);
    if reported {
        counter!("netevents_subscriber_failure_reports_total").increment(1);
    }
}

/// Record an inbound frame by classification label.
pub fn record_inbound_frame(label: &str) {
    counter!("netevents_inbound_frames_total", "outcome" => label.to_string()).increment(1);
}

/// Record how long the sink took to accept an event.
pub fn record_dispatch_latency(duration: Duration) {
    histogram!("netevents_dispatch_duration_seconds").record(duration.as_secs_f64());
}

/// Gauge for subscriber state (0=connecting, 1=subscribing, 2=active, 3=backoff, 4=stopped).
pub fn set_subscriber_state(state: &str) {
    let value = match state {
        "Connecting" => 0.0,
        "Subscribing" => 1.0,
        "Active" => 2.0,
        "Backoff" => 3.0,
        "Stopped" => 4.0,
        _ => -1.0,
    };
    gauge!("netevents_subscriber_state").set(value);
}

// =============================================================================
// Publisher Metrics
// =============================================================================

/// Record a publish outcome (`enqueued`, `published`, `dropped`).
pub fn record_publish(outcome: &str) {
    counter!("netevents_publish_total", "outcome" => outcome.to_string()).increment(1);
}

/// Record broker publish round-trip latency.
pub fn record_publish_latency(duration: Duration) {
    histogram!("netevents_publish_duration_seconds").record(duration.as_secs_f64());
}

/// Gauge for frames waiting in the outbound queue.
pub fn set_queue_depth(depth: u64) {
    gauge!("netevents_outbound_queue_depth").set(depth as f64);
}

// =============================================================================
// Node Metrics
// =============================================================================

/// Record errors by type.
pub fn record_error(component: &str, error_type: &str) {
    counter!(
        "netevents_errors_total",
        "component" => component.to_string(),
        "error_type" => error_type.to_string()
    )
    .increment(1);
}

/// Gauge for node state.
pub fn set_node_state(state: &str) {
    let value = match state {
        "Created" => 0.0,
        "Connecting" => 1.0,
        "Running" => 2.0,
        "ShuttingDown" => 3.0,
        "Stopped" => 4.0,
        "Failed" => 5.0,
        _ => -1.0,
    };
    gauge!("netevents_node_state").set(value);
}
