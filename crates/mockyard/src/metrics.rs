//! Prometheus metrics for mockyard.
//!
//! Tracks served requests per project/server/outcome, upstream latency, and
//! how many mock servers are listening.
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, Encoder,
    GaugeVec, HistogramVec, TextEncoder,
};

lazy_static! {
    /// Total number of requests served by mock servers
    pub static ref REQUESTS_TOTAL: CounterVec = register_counter_vec!(
        "mockyard_requests_total",
        "Total number of requests served by mock servers",
        &["project", "server", "outcome"]  // outcome: mock|proxy|error|notFound
    )
    .unwrap();

    /// End-to-end request duration, including delay and upstream time
    pub static ref REQUEST_DURATION_MS: HistogramVec = register_histogram_vec!(
        "mockyard_request_duration_ms",
        "Histogram of request handling time in milliseconds",
        &["project", "server"],
        vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0]
    )
    .unwrap();

    /// Upstream round-trip duration for proxied requests
    pub static ref UPSTREAM_DURATION_MS: HistogramVec = register_histogram_vec!(
        "mockyard_upstream_duration_ms",
        "Duration of upstream requests made while proxying",
        &["project", "server", "result"]  // result: ok|error
    )
    .unwrap();

    /// Mock servers currently accepting connections
    pub static ref SERVERS_RUNNING: GaugeVec = register_gauge_vec!(
        "mockyard_servers_running",
        "Mock servers currently accepting connections",
        &["project"]
    )
    .unwrap();

    /// Preset applications
    pub static ref PRESETS_APPLIED_TOTAL: CounterVec = register_counter_vec!(
        "mockyard_presets_applied_total",
        "Total number of preset applications",
        &["project"]
    )
    .unwrap();
}

/// Collect and return all metrics in Prometheus text format
pub fn collect_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Helper to record a served request
pub fn record_request(project: &str, server: &str, outcome: &str, duration_ms: f64) {
    REQUESTS_TOTAL
        .with_label_values(&[project, server, outcome])
        .inc();
    REQUEST_DURATION_MS
        .with_label_values(&[project, server])
        .observe(duration_ms);
}

/// Helper to record an upstream round trip
pub fn record_upstream(project: &str, server: &str, ok: bool, duration_ms: f64) {
    let result = if ok { "ok" } else { "error" };
    UPSTREAM_DURATION_MS
        .with_label_values(&[project, server, result])
        .observe(duration_ms);
}

/// Helper to track running servers
pub fn server_started(project: &str) {
    SERVERS_RUNNING.with_label_values(&[project]).inc();
}

pub fn server_stopped(project: &str) {
    SERVERS_RUNNING.with_label_values(&[project]).dec();
}

pub fn record_preset_applied(project: &str) {
    PRESETS_APPLIED_TOTAL.with_label_values(&[project]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_collection() {
        record_request("metrics-test", "api", "mock", 3.0);
        record_upstream("metrics-test", "api", false, 12.0);

        let output = collect_metrics();
        assert!(output.contains("mockyard_requests_total"));
        assert!(output.contains("mockyard_upstream_duration_ms"));
    }

    #[test]
    fn test_request_counter_increments() {
        let before = REQUESTS_TOTAL
            .with_label_values(&["metrics-counter", "api", "proxy"])
            .get();
        record_request("metrics-counter", "api", "proxy", 1.0);
        let after = REQUESTS_TOTAL
            .with_label_values(&["metrics-counter", "api", "proxy"])
            .get();
        assert_eq!(after, before + 1.0);
    }

    #[test]
    fn test_running_gauge() {
        server_started("metrics-gauge");
        server_started("metrics-gauge");
        server_stopped("metrics-gauge");
        assert_eq!(SERVERS_RUNNING.with_label_values(&["metrics-gauge"]).get(), 1.0);
    }
}
