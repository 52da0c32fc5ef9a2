//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Admission gate occupancy
//! - Jobs (separation, alignment) by outcome and duration
//! - Result cache hit rate
//! - Upload volume and heartbeats

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts};

// =============================================================================
// Admission Gate
// =============================================================================

/// Requests waiting for the compute slot.
pub static ADMISSION_QUEUED: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "jellysing_admission_queued",
        "Jobs waiting for the compute slot",
    )
    .unwrap()
});

/// Jobs holding the compute slot (0 or 1).
pub static ADMISSION_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "jellysing_admission_running",
        "Jobs holding the compute slot",
    )
    .unwrap()
});

// =============================================================================
// Jobs
// =============================================================================

/// Workflow invocations by kind and outcome.
pub static JOBS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("jellysing_jobs_total", "Workflow invocations by outcome"),
        &["kind", "outcome"], // kind: separate|align, outcome: cached|completed|failed
    )
    .unwrap()
});

/// Time spent inside the model call.
pub static JOB_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "jellysing_job_duration_seconds",
            "Duration of the running phase of a job",
        )
        .buckets(vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1200.0]),
        &["kind"],
    )
    .unwrap()
});

/// Heartbeats emitted while jobs run.
pub static HEARTBEATS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "jellysing_heartbeats_total",
        "Heartbeat events emitted during running jobs",
    )
    .unwrap()
});

// =============================================================================
// Cache and uploads
// =============================================================================

/// Cache lookups by result.
pub static CACHE_LOOKUPS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("jellysing_cache_lookups_total", "Result cache lookups"),
        &["result"], // "hit", "miss"
    )
    .unwrap()
});

/// Bytes received in uploads.
pub static UPLOAD_BYTES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("jellysing_upload_bytes_total", "Bytes received in uploads").unwrap()
});

/// Returns all core metrics for registration.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(ADMISSION_QUEUED.clone()),
        Box::new(ADMISSION_RUNNING.clone()),
        Box::new(JOBS_TOTAL.clone()),
        Box::new(JOB_DURATION.clone()),
        Box::new(HEARTBEATS_TOTAL.clone()),
        Box::new(CACHE_LOOKUPS.clone()),
        Box::new(UPLOAD_BYTES.clone()),
    ]
}
