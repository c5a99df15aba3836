//! Prometheus metrics for the FRKB server.
//!
//! The `/metrics` endpoint is unauthenticated to allow scraping; metrics
//! carry no per-user identifiers. Restrict the endpoint to scraper IPs at
//! the infrastructure level.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

pub static CHECKS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("frkb_checks_total", "Sync check requests by decision"),
        &["reason"],
    )
    .expect("metric creation failed")
});

pub static DIFF_BATCHES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "frkb_diff_batches_total",
        "Bidirectional diff batches processed",
    )
    .expect("metric creation failed")
});

pub static ANALYZE_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "frkb_analyze_diff_total",
        "Whole-set diff analyses performed",
    )
    .expect("metric creation failed")
});

pub static PAGES_PULLED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("frkb_diff_pages_pulled_total", "Diff pages served")
        .expect("metric creation failed")
});

pub static ADDS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("frkb_batch_adds_total", "Batch add requests completed")
        .expect("metric creation failed")
});

pub static FINGERPRINTS_ADDED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "frkb_fingerprints_added_total",
        "Fingerprints newly stored by batch adds",
    )
    .expect("metric creation failed")
});

pub static FINGERPRINTS_DUPLICATE_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "frkb_fingerprints_duplicate_total",
        "Fingerprints reported as duplicates by batch adds",
    )
    .expect("metric creation failed")
});

pub static RESETS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("frkb_user_resets_total", "User data resets performed")
        .expect("metric creation failed")
});

pub static CHECK_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new("frkb_check_duration_seconds", "Sync check latency")
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]),
    )
    .expect("metric creation failed")
});

pub static ADD_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new("frkb_batch_add_duration_seconds", "Batch add latency")
            .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
    )
    .expect("metric creation failed")
});

pub static ANALYZE_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "frkb_analyze_diff_duration_seconds",
            "Whole-set diff latency",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
    )
    .expect("metric creation failed")
});

/// Register all metrics with the global registry. Idempotent.
pub fn register_metrics() {
    static ONCE: Once = Once::new();
    ONCE.call_once(|| {
        let registry = &*REGISTRY;
        registry
            .register(Box::new(CHECKS_TOTAL.clone()))
            .expect("register frkb_checks_total");
        registry
            .register(Box::new(DIFF_BATCHES_TOTAL.clone()))
            .expect("register frkb_diff_batches_total");
        registry
            .register(Box::new(ANALYZE_TOTAL.clone()))
            .expect("register frkb_analyze_diff_total");
        registry
            .register(Box::new(PAGES_PULLED_TOTAL.clone()))
            .expect("register frkb_diff_pages_pulled_total");
        registry
            .register(Box::new(ADDS_TOTAL.clone()))
            .expect("register frkb_batch_adds_total");
        registry
            .register(Box::new(FINGERPRINTS_ADDED_TOTAL.clone()))
            .expect("register frkb_fingerprints_added_total");
        registry
            .register(Box::new(FINGERPRINTS_DUPLICATE_TOTAL.clone()))
            .expect("register frkb_fingerprints_duplicate_total");
        registry
            .register(Box::new(RESETS_TOTAL.clone()))
            .expect("register frkb_user_resets_total");
        registry
            .register(Box::new(CHECK_DURATION.clone()))
            .expect("register frkb_check_duration_seconds");
        registry
            .register(Box::new(ADD_DURATION.clone()))
            .expect("register frkb_batch_add_duration_seconds");
        registry
            .register(Box::new(ANALYZE_DURATION.clone()))
            .expect("register frkb_analyze_diff_duration_seconds");
    });
}

/// GET /metrics - Prometheus text exposition.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let families = REGISTRY.gather();
    let mut buffer = Vec::new();
    match encoder.encode(&families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", encoder.format_type().to_string())],
            buffer,
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("metrics encoding failed: {e}"),
        )
            .into_response(),
    }
}
