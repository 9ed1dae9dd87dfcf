//! Upstream metrics collection.
//!
//! Provides standardized metrics for monitoring provider calls:
//! - Request counters by outcome
//! - Latency histograms
//! - Retry counters
//! - Circuit breaker state and rejections

use metrics::{counter, gauge, histogram};

// =============================================================================
// Metric Names
// =============================================================================

/// Metric name constants for consistency.
pub mod names {
    /// Total logical provider calls by outcome.
    pub const REQUESTS_TOTAL: &str = "vidlens_upstream_requests_total";

    /// Total retry attempts by operation and error kind.
    pub const RETRIES_TOTAL: &str = "vidlens_upstream_retries_total";

    /// Logical call latency in seconds, retries included.
    pub const LATENCY_SECONDS: &str = "vidlens_upstream_latency_seconds";

    /// Breaker state: 0 closed, 1 half-open, 2 open.
    pub const BREAKER_STATE: &str = "vidlens_upstream_breaker_state";

    /// Calls rejected by an open breaker.
    pub const BREAKER_REJECTIONS_TOTAL: &str = "vidlens_upstream_breaker_rejections_total";
}

// =============================================================================
// Recording Functions
// =============================================================================

/// Record a completed logical call.
pub fn record_request(outcome: &str, latency_ms: f64) {
    counter!(
        names::REQUESTS_TOTAL,
        "outcome" => outcome.to_string()
    )
    .increment(1);

    histogram!(names::LATENCY_SECONDS).record(latency_ms / 1000.0);
}

/// Record a retry attempt.
pub fn record_retry(operation: &str, kind: &str) {
    counter!(
        names::RETRIES_TOTAL,
        "operation" => operation.to_string(),
        "kind" => kind.to_string()
    )
    .increment(1);
}

/// Record the current breaker state.
pub fn record_breaker_state(value: f64) {
    gauge!(names::BREAKER_STATE).set(value);
}

/// Record a call rejected without reaching the provider.
pub fn record_breaker_rejection() {
    counter!(names::BREAKER_REJECTIONS_TOTAL).increment(1);
}
