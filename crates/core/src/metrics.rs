//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Admission (submissions by outcome)
//! - Workers (terminal states, durations)
//! - Progress reporting (renders, skips, gateway edit failures)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts};

// =============================================================================
// Admission
// =============================================================================

/// Submissions by outcome.
pub static SUBMISSIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("zenload_submissions_total", "Download submissions by outcome"),
        &["outcome"], // "accepted", "too_many_downloads", "queue_full", "shutting_down", "unsupported_url"
    )
    .unwrap()
});

/// Tasks waiting for a global slot.
pub static DOWNLOADS_QUEUED: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("zenload_downloads_queued", "Downloads waiting in the queue").unwrap()
});

/// Tasks currently owned by a worker.
pub static DOWNLOADS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("zenload_downloads_in_flight", "Downloads currently running").unwrap()
});

// =============================================================================
// Workers
// =============================================================================

/// Terminal states reached, by kind.
pub static DOWNLOADS_FINISHED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "zenload_downloads_finished_total",
            "Downloads that reached a terminal state",
        ),
        &["state", "reason"],
    )
    .unwrap()
});

/// Time from admission to terminal state.
pub static DOWNLOAD_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "zenload_download_duration_seconds",
            "Duration of a download from admission to terminal state",
        )
        .buckets(vec![1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0]),
        &["state"],
    )
    .unwrap()
});

/// Cleanup steps that failed.
pub static CLEANUP_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("zenload_cleanup_failures_total", "Failed cleanup steps"),
        &["step"], // "scratch_dir", "status_message"
    )
    .unwrap()
});

// =============================================================================
// Progress reporting
// =============================================================================

/// Status edits issued to the gateway.
pub static PROGRESS_RENDERS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "zenload_progress_renders_total",
        "Progress status edits issued",
    )
    .unwrap()
});

/// Progress events not rendered.
pub static PROGRESS_SKIPPED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("zenload_progress_skipped_total", "Progress events not rendered"),
        &["reason"], // "duplicate", "throttled", "dropped"
    )
    .unwrap()
});

/// Status edits that failed for a reason other than "not modified".
pub static GATEWAY_EDIT_FAILURES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "zenload_gateway_edit_failures_total",
        "Failed progress status edits",
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Admission
        Box::new(SUBMISSIONS_TOTAL.clone()),
        Box::new(DOWNLOADS_QUEUED.clone()),
        Box::new(DOWNLOADS_IN_FLIGHT.clone()),
        // Workers
        Box::new(DOWNLOADS_FINISHED.clone()),
        Box::new(DOWNLOAD_DURATION.clone()),
        Box::new(CLEANUP_FAILURES.clone()),
        // Progress
        Box::new(PROGRESS_RENDERS.clone()),
        Box::new(PROGRESS_SKIPPED.clone()),
        Box::new(GATEWAY_EDIT_FAILURES.clone()),
    ]
}
