//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the zenload server:
//! - HTTP request metrics (latency, counts)
//! - Download manager state and per-host limiter usage (collected dynamically)
//! - Core orchestration metrics registered from `zenload_core::metrics`

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "zenload_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("zenload_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "zenload_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// Manager Metrics (collected dynamically)
// =============================================================================

/// Whether new submissions are accepted (1) or refused for shutdown (0).
pub static MANAGER_ACCEPTING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "zenload_manager_accepting",
        "Whether the download manager accepts submissions (1) or not (0)",
    )
    .unwrap()
});

/// Users with at least one live task.
pub static ACTIVE_USERS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("zenload_active_users", "Users with queued or running downloads").unwrap()
});

/// Free limiter slots per upstream host.
pub static HOST_SLOTS_AVAILABLE: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new(
            "zenload_host_slots_available",
            "Free extractor slots per upstream host",
        ),
        &["host"],
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();

    // Manager
    registry
        .register(Box::new(MANAGER_ACCEPTING.clone()))
        .unwrap();
    registry.register(Box::new(ACTIVE_USERS.clone())).unwrap();
    registry
        .register(Box::new(HOST_SLOTS_AVAILABLE.clone()))
        .unwrap();

    // Core metrics (admission, workers, progress)
    for metric in zenload_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

/// Collect dynamic metrics from current application state.
///
/// Called before encoding so gauges reflect the manager's current view.
pub fn collect_dynamic_metrics(state: &crate::state::AppState) {
    let status = state.manager().status();
    MANAGER_ACCEPTING.set(if status.accepting { 1 } else { 0 });
    ACTIVE_USERS.set(status.users as i64);
    for host in &status.hosts {
        HOST_SLOTS_AVAILABLE
            .with_label_values(&[&host.host])
            .set(host.available as i64);
    }
}

/// Normalize a path for metric labels (replace IDs with placeholders).
pub fn normalize_path(path: &str) -> String {
    let uuid_regex = regex_lite::Regex::new(
        r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}",
    )
    .unwrap();
    let numeric_regex = regex_lite::Regex::new(r"/-?\d+(/|$)").unwrap();

    let result = uuid_regex.replace_all(path, "{id}");
    let result = numeric_regex.replace_all(&result, "/{id}$1");
    result.to_string()
}
