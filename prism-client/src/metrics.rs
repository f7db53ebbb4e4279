//! Client observability metrics
//!
//! Prometheus-compatible metrics for the product check and outbound requests.

use std::time::{Duration, Instant};

/// Record a finished product check
pub fn record_product_check(outcome: &str, duration: Duration) {
    metrics::counter!(
        "prism_client_product_checks_total",
        "outcome" => outcome.to_string(),
    )
    .increment(1);

    metrics::histogram!("prism_client_product_check_duration_seconds")
        .record(duration.as_secs_f64());
}

/// Record the number of callers released by a probe
pub fn record_gate_waiters(count: usize) {
    metrics::gauge!("prism_client_gate_waiters").set(count as f64);
}

/// Record an outbound request event
pub fn record_request(method: &str, error_type: Option<&str>) {
    let status = if error_type.is_some() { "error" } else { "ok" };
    metrics::counter!(
        "prism_client_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
    )
    .increment(1);

    if let Some(error_type) = error_type {
        metrics::counter!(
            "prism_client_request_errors_total",
            "method" => method.to_string(),
            "error_type" => error_type.to_string(),
        )
        .increment(1);
    }
}

/// Record request duration
pub fn record_request_duration(method: &str, duration: Duration) {
    metrics::histogram!(
        "prism_client_request_duration_seconds",
        "method" => method.to_string(),
    )
    .record(duration.as_secs_f64());
}

/// Guard for timing outbound requests
pub struct RequestTimer {
    method: &'static str,
    start: Instant,
}

impl RequestTimer {
    /// Start timing a request
    pub fn new(method: &'static str) -> Self {
        Self {
            method,
            start: Instant::now(),
        }
    }

    /// Record the elapsed duration
    pub fn finish(self) -> Duration {
        let duration = self.start.elapsed();
        record_request_duration(self.method, duration);
        duration
    }
}
