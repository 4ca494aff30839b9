//! Prometheus metrics for the broker.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `cartstream_broker_events_received_total` - Events parsed from peers
//! - `cartstream_broker_persist_failures_total` - Events the sink failed to store
//! - `cartstream_broker_malformed_messages_total` - Frames that failed to parse
//! - `cartstream_broker_deliveries_total{outcome}` - Per-peer delivery attempts
//! - `cartstream_postgres_rows_written_total` - Rows inserted by the Postgres sink
//!
//! ## Gauges
//! - `cartstream_broker_connected_peers` - Current broadcast members

use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use thiserror::Error;

/// Errors from metrics setup.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to install the Prometheus exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Register every metric description.
pub fn register_metrics() {
    describe_counter!(
        "cartstream_broker_events_received_total",
        "Total number of events received from peers"
    );
    describe_counter!(
        "cartstream_broker_persist_failures_total",
        "Total number of events the persistence sink failed to store"
    );
    describe_counter!(
        "cartstream_broker_malformed_messages_total",
        "Total number of frames that could not be parsed as events"
    );
    describe_counter!(
        "cartstream_broker_deliveries_total",
        "Total number of per-peer delivery attempts by outcome (delivered, failed)"
    );
    describe_counter!(
        "cartstream_postgres_rows_written_total",
        "Total number of event rows written to PostgreSQL"
    );
    describe_gauge!(
        "cartstream_broker_connected_peers",
        "Current number of connected peers"
    );

    tracing::debug!("Broker metrics registered");
}

/// Register descriptions and serve `/metrics` on `addr`.
///
/// # Errors
///
/// Returns [`MetricsError::Install`] if the exporter cannot bind or a
/// recorder is already installed.
pub fn install_exporter(addr: SocketAddr) -> Result<(), MetricsError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| MetricsError::Install(e.to_string()))?;

    register_metrics();
    tracing::info!(%addr, "Prometheus metrics available at http://{addr}/metrics");
    Ok(())
}

/// Record an event parsed from a peer.
pub fn record_event_received() {
    metrics::counter!("cartstream_broker_events_received_total").increment(1);
}

/// Record a sink failure.
pub fn record_persist_failure() {
    metrics::counter!("cartstream_broker_persist_failures_total").increment(1);
}

/// Record a frame that did not parse.
pub fn record_malformed_message() {
    metrics::counter!("cartstream_broker_malformed_messages_total").increment(1);
}

/// Record one per-peer delivery attempt.
pub fn record_delivery(delivered: bool) {
    let outcome = if delivered { "delivered" } else { "failed" };
    metrics::counter!("cartstream_broker_deliveries_total", "outcome" => outcome).increment(1);
}

/// Update the connected-peers gauge.
#[allow(clippy::cast_precision_loss)] // Peer counts are far below 2^52
pub fn set_connected_peers(count: usize) {
    metrics::gauge!("cartstream_broker_connected_peers").set(count as f64);
}
