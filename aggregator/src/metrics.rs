//! Prometheus metrics for the aggregation service
//!
//! Metrics are process-local; nothing here opens a listener. Hosts that want
//! to expose them can call [`encode_metrics`].

use once_cell::sync::Lazy;
use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_histogram, Counter,
    CounterVec, Encoder, Gauge, Histogram, TextEncoder,
};

// ── Producer metrics ─────────────────────────────────────────────────────────

pub static RECORDED_EVENTS: Lazy<Counter> = Lazy::new(|| {
    register_counter!("packetlog_recorded_events_total", "Events passed to record()").unwrap()
});

pub static LIVE_CATEGORIES: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "packetlog_live_categories",
        "Categories captured by the most recent window snapshot"
    )
    .unwrap()
});

// ── Flush metrics ────────────────────────────────────────────────────────────

pub static FLUSH_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "packetlog_flush_total",
        "Flush attempts by outcome",
        &["status"]
    )
    .unwrap()
});

pub static FLUSH_ROWS: Lazy<Counter> = Lazy::new(|| {
    register_counter!("packetlog_flush_rows_total", "Aggregate rows committed").unwrap()
});

pub static FLUSH_DURATION: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "packetlog_flush_duration_seconds",
        "Flush transaction latency",
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .unwrap()
});

pub static DROPPED_WINDOWS: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "packetlog_dropped_windows_total",
        "Windows discarded after a failed flush"
    )
    .unwrap()
});

// ── Direction metrics ────────────────────────────────────────────────────────

pub static DIRECTION_WRITES: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "packetlog_direction_writes_total",
        "Direction record writes by outcome",
        &["status"]
    )
    .unwrap()
});

/// Render all registered metrics to Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&families, &mut buffer) {
        tracing::warn!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
