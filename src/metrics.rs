/// Metrics and telemetry for Civic Desk
///
/// Provides Prometheus-compatible metrics for monitoring:
/// - HTTP request counts and latencies
/// - Gate rejections (origin, rate limit, CAPTCHA, admin auth)
/// - Moderation decisions and their outcomes
/// - Upstream collaborator failures
use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec, IntCounterVec,
    TextEncoder,
};

lazy_static! {
    // ========== HTTP Metrics ==========

    /// Total HTTP requests by method, route, and status
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "route", "status"]
    )
    .expect("http_requests_total registration");

    /// HTTP request duration in seconds
    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request latencies in seconds",
        &["method", "route"],
        vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .expect("http_request_duration_seconds registration");

    // ========== Gate Metrics ==========

    /// Requests refused by a gate, by route and gate
    pub static ref GATE_REJECTIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "gate_rejections_total",
        "Total number of requests refused by a gate",
        &["route", "gate"]
    )
    .expect("gate_rejections_total registration");

    // ========== Moderation Metrics ==========

    /// Moderation decisions by decision and outcome
    pub static ref MODERATION_DECISIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "moderation_decisions_total",
        "Total number of moderation decisions",
        &["decision", "outcome"]
    )
    .expect("moderation_decisions_total registration");

    /// Submissions created by type
    pub static ref SUBMISSIONS_CREATED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "submissions_created_total",
        "Total number of complaints and reports created",
        &["type"]
    )
    .expect("submissions_created_total registration");

    // ========== Upstream Metrics ==========

    /// Failed collaborator calls by collaborator
    pub static ref UPSTREAM_FAILURES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "upstream_failures_total",
        "Total number of failed calls to external collaborators",
        &["collaborator"]
    )
    .expect("upstream_failures_total registration");

    /// Status cache lookups by result
    pub static ref STATUS_CACHE_LOOKUPS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "status_cache_lookups_total",
        "Total number of status cache lookups",
        &["result"]
    )
    .expect("status_cache_lookups_total registration");
}

/// Render metrics in Prometheus text format
pub fn render_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Record an HTTP request
pub fn record_http_request(method: &str, route: &str, status: u16, duration: f64) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, route, &status.to_string()])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, route])
        .observe(duration);
}

/// Record a gate rejection
pub fn record_gate_rejection(route: &str, gate: &str) {
    GATE_REJECTIONS_TOTAL.with_label_values(&[route, gate]).inc();
}

/// Record a moderation decision
pub fn record_moderation_decision(decision: &str, outcome: &str) {
    MODERATION_DECISIONS_TOTAL
        .with_label_values(&[decision, outcome])
        .inc();
}

/// Record a created submission
pub fn record_submission_created(kind: &str) {
    SUBMISSIONS_CREATED_TOTAL.with_label_values(&[kind]).inc();
}

/// Record an upstream failure
pub fn record_upstream_failure(collaborator: &str) {
    UPSTREAM_FAILURES_TOTAL
        .with_label_values(&[collaborator])
        .inc();
}

/// Record a status cache lookup ("hit", "revalidated" or "miss")
pub fn record_status_cache(result: &str) {
    STATUS_CACHE_LOOKUPS_TOTAL.with_label_values(&[result]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_http_request() {
        record_http_request("POST", "submitComment", 200, 0.05);
        let metrics = render_metrics();
        assert!(metrics.contains("http_requests_total"));
        assert!(metrics.contains("http_request_duration_seconds"));
    }

    #[test]
    fn test_record_gate_rejection() {
        record_gate_rejection("getUploadTicket", "captcha");
        let metrics = render_metrics();
        assert!(metrics.contains("gate_rejections_total"));
    }

    #[test]
    fn test_record_moderation_decision() {
        record_moderation_decision("approve", "partial");
        let metrics = render_metrics();
        assert!(metrics.contains("moderation_decisions_total"));
        assert!(metrics.contains("outcome=\"partial\""));
    }

    #[test]
    fn test_record_upstream_failure() {
        record_upstream_failure("tracker");
        let metrics = render_metrics();
        assert!(metrics.contains("upstream_failures_total"));
    }
}
