//! Prometheus Metrics Module
//!
//! Exposes stream metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Frames**: Inbound frames and how their ticks were routed
//! - **Connection**: Current lifecycle state and reconnects
//! - **Errors**: Transport and parse errors by kind
//! - **Batches**: Coalesced batch sizes delivered to the series builder
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port. Recording
//! before [`init_metrics`] is a no-op.

use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::domain::connection::{ConnectionState, DisconnectReason};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Subsequent calls return the handle installed by the first one.
///
/// # Errors
///
/// Returns an error if the recorder cannot be installed.
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
    // Frame counters
    describe_counter!(
        "ticker_stream_frames_received_total",
        "Total data frames received from the stream"
    );
    describe_counter!(
        "ticker_stream_ticks_total",
        "Total decoded ticks by routing outcome"
    );

    // Connection
    describe_gauge!(
        "ticker_stream_connection_state",
        "Current connection state (1 for the active state label)"
    );
    describe_counter!(
        "ticker_stream_reconnects_total",
        "Total reconnects scheduled by reason"
    );

    // Errors
    describe_counter!(
        "ticker_stream_errors_total",
        "Total stream errors by kind"
    );

    // Batches
    describe_histogram!(
        "ticker_stream_batch_size",
        "Ticks per coalesced batch"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Routing outcome label for ticks.
#[derive(Debug, Clone, Copy)]
pub enum TickOutcome {
    /// Tick for a tracked symbol.
    Routed,
    /// Tick for an untracked symbol.
    Untracked,
    /// Payload that did not decode or validate.
    Malformed,
}

impl TickOutcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Routed => "routed",
            Self::Untracked => "untracked",
            Self::Malformed => "malformed",
        }
    }
}

const STATES: [ConnectionState; 5] = [
    ConnectionState::Disconnected,
    ConnectionState::Connecting,
    ConnectionState::Connected,
    ConnectionState::Error,
    ConnectionState::Failed,
];

/// Record an inbound data frame.
pub fn record_frame_received() {
    counter!("ticker_stream_frames_received_total").increment(1);
}

/// Record the routing outcome of a payload.
pub fn record_tick(outcome: TickOutcome) {
    counter!(
        "ticker_stream_ticks_total",
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

/// Set the connection state gauge.
pub fn set_connection_state(current: ConnectionState) {
    for state in STATES {
        gauge!(
            "ticker_stream_connection_state",
            "state" => state.as_str()
        )
        .set(if state == current { 1.0 } else { 0.0 });
    }
}

/// Record a scheduled reconnect.
pub fn record_reconnect(reason: DisconnectReason) {
    counter!(
        "ticker_stream_reconnects_total",
        "reason" => reason.as_str()
    )
    .increment(1);
}

/// Record a stream error.
pub fn record_error(kind: &'static str) {
    counter!(
        "ticker_stream_errors_total",
        "kind" => kind
    )
    .increment(1);
}

/// Record the size of a delivered batch.
#[allow(clippy::cast_precision_loss)]
pub fn record_batch_size(size: usize) {
    histogram!("ticker_stream_batch_size").record(size as f64);
}

// =============================================================================
// Tests
// =============================================================================
