//! Metrics Module
//!
//! Provides Prometheus-compatible metrics for monitoring:
//! - API request metrics (latency, count, errors)
//! - Matching engine metrics (orders, trades, latency)
//! - Change-queue depth and synchroniser throughput
//! - Operational store metrics (ping latency)
//! - Publisher metrics (tape-event loss)

#![allow(dead_code)]

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Instant;

/// Metric names as constants for consistency
pub mod names {
    // API Metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";

    // Matching Engine Metrics
    pub const ORDERS_SUBMITTED_TOTAL: &str = "orders_submitted_total";
    pub const ORDERS_REJECTED_TOTAL: &str = "orders_rejected_total";
    pub const ORDERS_CANCELLED_TOTAL: &str = "orders_cancelled_total";
    pub const ORDER_MATCH_DURATION_SECONDS: &str = "order_match_duration_seconds";
    pub const TRADES_EXECUTED_TOTAL: &str = "trades_executed_total";
    pub const TRADE_VOLUME_QUOTE: &str = "trade_volume_quote";
    pub const SETTLEMENT_FAILURES_TOTAL: &str = "settlement_failures_total";

    // Change Queue / Synchroniser Metrics
    pub const SYNC_QUEUE_DEPTH: &str = "sync_queue_depth";
    pub const SYNC_BATCHES_TOTAL: &str = "sync_batches_total";
    pub const SYNC_RECORDS_TOTAL: &str = "sync_records_total";

    // Operational Store Metrics
    pub const STORE_PING_SECONDS: &str = "store_ping_seconds";

    // Publisher Metrics
    pub const TAPE_EVENTS_DROPPED_TOTAL: &str = "tape_events_dropped_total";
}

/// Label keys
pub mod labels {
    pub const METHOD: &str = "method";
    pub const ENDPOINT: &str = "endpoint";
    pub const STATUS: &str = "status";
    pub const ORDER_SIDE: &str = "side";
    pub const ORDER_TYPE: &str = "order_type";
    pub const SYMBOL: &str = "symbol";
    pub const REASON: &str = "reason";
    pub const KIND: &str = "kind";
    pub const OUTCOME: &str = "outcome";
    pub const GROUP: &str = "group";
}

/// Initialize Prometheus metrics exporter
///
/// Returns a handle that can be used to render metrics
pub fn init_metrics() -> PrometheusHandle {
    let builder = PrometheusBuilder::new()
        // HTTP request duration buckets (in seconds)
        .set_buckets_for_metric(
            Matcher::Full(names::HTTP_REQUEST_DURATION_SECONDS.to_string()),
            &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
        )
        .unwrap()
        // Order matching duration buckets (in seconds) - should be fast
        .set_buckets_for_metric(
            Matcher::Full(names::ORDER_MATCH_DURATION_SECONDS.to_string()),
            &[0.0001, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.5],
        )
        .unwrap()
        // Store ping buckets
        .set_buckets_for_metric(
            Matcher::Full(names::STORE_PING_SECONDS.to_string()),
            &[0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0],
        )
        .unwrap();

    builder
        .install_recorder()
        .expect("Failed to install Prometheus recorder")
}

// ============================================================================
// HTTP Metrics
// ============================================================================

/// Record HTTP request
pub fn record_http_request(method: &str, endpoint: &str, status: u16, duration_secs: f64) {
    let status_str = status.to_string();
    counter!(
        names::HTTP_REQUESTS_TOTAL,
        labels::METHOD => method.to_string(),
        labels::ENDPOINT => endpoint.to_string(),
        labels::STATUS => status_str.clone()
    )
    .increment(1);

    histogram!(
        names::HTTP_REQUEST_DURATION_SECONDS,
        labels::METHOD => method.to_string(),
        labels::ENDPOINT => endpoint.to_string(),
        labels::STATUS => status_str
    )
    .record(duration_secs);
}

// ============================================================================
// Matching Engine Metrics
// ============================================================================

/// Record order submission
pub fn record_order_submitted(side: &str, order_type: &str) {
    counter!(
        names::ORDERS_SUBMITTED_TOTAL,
        labels::ORDER_SIDE => side.to_string(),
        labels::ORDER_TYPE => order_type.to_string()
    )
    .increment(1);
}

/// Record order rejection
pub fn record_order_rejected(reason: &str) {
    counter!(
        names::ORDERS_REJECTED_TOTAL,
        labels::REASON => reason.to_string()
    )
    .increment(1);
}

/// Record order cancelled
pub fn record_order_cancelled() {
    counter!(names::ORDERS_CANCELLED_TOTAL).increment(1);
}

/// Record order matching duration
pub fn record_match_duration(duration_secs: f64) {
    histogram!(names::ORDER_MATCH_DURATION_SECONDS).record(duration_secs);
}

/// Record trade execution
pub fn record_trade_executed(symbol: &str, volume_quote: f64) {
    counter!(
        names::TRADES_EXECUTED_TOTAL,
        labels::SYMBOL => symbol.to_string()
    )
    .increment(1);

    counter!(names::TRADE_VOLUME_QUOTE).increment(volume_quote as u64);
}

/// Record settlement failure (invariant breach or script timeout)
pub fn record_settlement_failure(symbol: &str) {
    counter!(
        names::SETTLEMENT_FAILURES_TOTAL,
        labels::SYMBOL => symbol.to_string()
    )
    .increment(1);
}

// ============================================================================
// Change Queue / Synchroniser Metrics
// ============================================================================

/// Set change queue depth
pub fn set_sync_queue_depth(kind: &str, depth: i64) {
    gauge!(
        names::SYNC_QUEUE_DEPTH,
        labels::KIND => kind.to_string()
    )
    .set(depth as f64);
}

/// Record a drained batch
pub fn record_sync_batch(kind: &str, outcome: &str, records: usize) {
    counter!(
        names::SYNC_BATCHES_TOTAL,
        labels::KIND => kind.to_string(),
        labels::OUTCOME => outcome.to_string()
    )
    .increment(1);

    counter!(
        names::SYNC_RECORDS_TOTAL,
        labels::KIND => kind.to_string(),
        labels::OUTCOME => outcome.to_string()
    )
    .increment(records as u64);
}

// ============================================================================
// Operational Store Metrics
// ============================================================================

/// Record store ping latency
pub fn record_store_ping(duration_secs: f64) {
    histogram!(names::STORE_PING_SECONDS).record(duration_secs);
}

// ============================================================================
// Publisher Metrics
// ============================================================================

/// Record a tape event lost to back-pressure
pub fn record_tape_dropped(group: &str) {
    counter!(
        names::TAPE_EVENTS_DROPPED_TOTAL,
        labels::GROUP => group.to_string()
    )
    .increment(1);
}

// ============================================================================
// Timer Helper
// ============================================================================

/// Timer for measuring durations
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Create a new timer
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed time in seconds
    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
