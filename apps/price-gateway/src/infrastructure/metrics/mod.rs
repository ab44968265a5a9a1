//! Prometheus Metrics Module
//!
//! Exposes application metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Feeds**: Frames received, ticks decoded, decode errors, reconnects
//! - **Fan-out**: Publish batches, deliveries, failures, dropped ticks
//! - **Downstream**: Active connections and control message outcomes
//! - **Latency**: Publish duration
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the gateway HTTP port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Repeated calls return the handle installed by the first call.
///
/// # Errors
///
/// Returns an error if the recorder cannot be installed (for example when
/// another global recorder was installed first).
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();

    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Feed counters
    describe_counter!(
        "price_gateway_frames_received_total",
        "Total frames received from upstream feeds"
    );
    describe_counter!(
        "price_gateway_ticks_decoded_total",
        "Total price ticks decoded from upstream feeds"
    );
    describe_counter!(
        "price_gateway_decode_errors_total",
        "Total upstream frames that failed to decode"
    );
    describe_counter!(
        "price_gateway_reconnects_total",
        "Total upstream reconnection attempts"
    );
    describe_gauge!(
        "price_gateway_feed_connected",
        "Whether the upstream feed is connected (1) or not (0)"
    );

    // Fan-out counters
    describe_counter!(
        "price_gateway_publish_batches_total",
        "Total fan-out batches sent"
    );
    describe_counter!(
        "price_gateway_deliveries_total",
        "Total price updates delivered to subscribers"
    );
    describe_counter!(
        "price_gateway_delivery_failures_total",
        "Total price updates that failed or timed out"
    );
    describe_counter!(
        "price_gateway_deliveries_skipped_total",
        "Total subscribers skipped because their channel was closed"
    );
    describe_counter!(
        "price_gateway_ticks_dropped_total",
        "Total ticks dropped because the publish queue was full"
    );

    // Downstream
    describe_gauge!(
        "price_gateway_downstream_connections",
        "Number of active downstream WebSocket connections"
    );
    describe_counter!(
        "price_gateway_control_messages_total",
        "Total control messages received from subscribers by outcome"
    );

    // Latency histograms
    describe_histogram!(
        "price_gateway_publish_duration_seconds",
        "Time to fan one tick out to all of its subscribers"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Metric labels for feed families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedLabel {
    /// Crypto top-of-book feed.
    Crypto,
    /// Forex quote feed.
    Forex,
}

impl FeedLabel {
    /// Label value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Crypto => "crypto",
            Self::Forex => "forex",
        }
    }
}

/// Record a frame received from an upstream feed.
pub fn record_frame_received(feed: FeedLabel) {
    counter!("price_gateway_frames_received_total", "feed" => feed.as_str()).increment(1);
}

/// Record a tick decoded from an upstream feed.
pub fn record_tick_decoded(feed: FeedLabel) {
    counter!("price_gateway_ticks_decoded_total", "feed" => feed.as_str()).increment(1);
}

/// Record an upstream frame that failed to decode.
pub fn record_decode_error(feed: FeedLabel) {
    counter!("price_gateway_decode_errors_total", "feed" => feed.as_str()).increment(1);
}

/// Record an upstream reconnection attempt.
pub fn record_reconnect(feed: FeedLabel) {
    counter!("price_gateway_reconnects_total", "feed" => feed.as_str()).increment(1);
}

/// Update the connected gauge for a feed.
pub fn set_feed_connected(feed: FeedLabel, connected: bool) {
    gauge!("price_gateway_feed_connected", "feed" => feed.as_str())
        .set(if connected { 1.0 } else { 0.0 });
}

/// Record the outcome of one publish.
pub fn record_publish(batches: u64, delivered: u64, failed: u64, skipped: u64, duration: Duration) {
    counter!("price_gateway_publish_batches_total").increment(batches);
    counter!("price_gateway_deliveries_total").increment(delivered);
    counter!("price_gateway_delivery_failures_total").increment(failed);
    counter!("price_gateway_deliveries_skipped_total").increment(skipped);
    histogram!("price_gateway_publish_duration_seconds").record(duration.as_secs_f64());
}

/// Record a tick dropped by a full publish queue.
pub fn record_tick_dropped() {
    counter!("price_gateway_ticks_dropped_total").increment(1);
}

/// Update the active downstream connection count.
#[allow(clippy::cast_precision_loss)]
pub fn set_downstream_connections(count: usize) {
    gauge!("price_gateway_downstream_connections").set(count as f64);
}

/// Record a control message outcome (`accepted` or `rejected`).
pub fn record_control_message(outcome: &'static str) {
    counter!("price_gateway_control_messages_total", "outcome" => outcome).increment(1);
}

// =============================================================================
// Tests
// =============================================================================
