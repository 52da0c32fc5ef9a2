//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the jellysing server:
//! - HTTP request metrics (latency, counts, errors)
//! - Progress stream metrics
//! - Result cache size (collected dynamically)
//!
//! Job, gate and cache-lookup metrics live in `jellysing_core::metrics` and
//! are registered here as well.

use once_cell::sync::Lazy;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use regex_lite::Regex;

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
///
/// For streaming endpoints this is the time until the response head is sent.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "jellysing_http_request_duration_seconds",
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
        Opts::new("jellysing_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "jellysing_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

/// Authentication failures.
pub static AUTH_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "jellysing_auth_failures_total",
            "Total authentication failures",
        ),
        &["reason"],
    )
    .unwrap()
});

// =============================================================================
// Progress Stream Metrics
// =============================================================================

/// Progress streams currently attached to a client.
pub static SSE_STREAMS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "jellysing_sse_streams_active",
        "Number of open progress streams",
    )
    .unwrap()
});

/// Progress streams opened (cumulative).
pub static SSE_STREAMS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "jellysing_sse_streams_total",
        "Total progress streams since startup",
    )
    .unwrap()
});

/// Progress events delivered by type.
pub static SSE_EVENTS_SENT: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("jellysing_sse_events_sent_total", "Progress events sent"),
        &["type"],
    )
    .unwrap()
});

// =============================================================================
// Cache Metrics (collected dynamically)
// =============================================================================

/// Cached separations (stem files in the data directory).
pub static CACHE_ENTRIES: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "jellysing_cache_entries",
        "Number of cached separations",
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
    registry
        .register(Box::new(AUTH_FAILURES_TOTAL.clone()))
        .unwrap();

    // Progress streams
    registry
        .register(Box::new(SSE_STREAMS_ACTIVE.clone()))
        .unwrap();
    registry
        .register(Box::new(SSE_STREAMS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(SSE_EVENTS_SENT.clone()))
        .unwrap();

    // Cache
    registry.register(Box::new(CACHE_ENTRIES.clone())).unwrap();

    // Core metrics (gate, jobs, uploads)
    for metric in jellysing_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Collect dynamic metrics from current application state.
///
/// Counts stem files in the data directory. Called before encoding.
pub async fn collect_dynamic_metrics(state: &crate::state::AppState) {
    let dir = state.orchestrator().cache().dir().to_path_buf();
    let Ok(mut entries) = tokio::fs::read_dir(&dir).await else {
        return;
    };

    let mut stems = 0i64;
    while let Ok(Some(entry)) = entries.next_entry().await {
        if is_stem_name(&entry.file_name().to_string_lossy()) {
            stems += 1;
        }
    }
    CACHE_ENTRIES.set(stems);
}

static STEM_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9a-f]{64}\.[A-Za-z0-9]+$").unwrap());
static DIGEST: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9a-f]{64}").unwrap());

fn is_stem_name(name: &str) -> bool {
    STEM_NAME.is_match(name)
}

/// Normalize a path for metric labels (replace digests with a placeholder).
pub fn normalize_path(path: &str) -> String {
    DIGEST.replace_all(path, "{hash}").into_owned()
}
