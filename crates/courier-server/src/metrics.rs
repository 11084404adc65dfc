//! Metrics collection and export for Courier.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "courier_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "courier_connections_active";
    pub const MESSAGES_TOTAL: &str = "courier_messages_total";
    pub const DELIVERED_PUSHES_TOTAL: &str = "courier_delivered_pushes_total";
    pub const SEEN_SWEEPS_TOTAL: &str = "courier_seen_sweeps_total";
    pub const SEEN_MESSAGES_TOTAL: &str = "courier_seen_messages_total";
    pub const ONLINE_IDENTITIES: &str = "courier_online_identities";
    pub const ERRORS_TOTAL: &str = "courier_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of connections since server start"
    );
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Current number of active connections"
    );
    metrics::describe_counter!(names::MESSAGES_TOTAL, "Total number of messages routed");
    metrics::describe_counter!(
        names::DELIVERED_PUSHES_TOTAL,
        "Messages pushed live to an online receiver"
    );
    metrics::describe_counter!(names::SEEN_SWEEPS_TOTAL, "Seen acknowledgement sweeps");
    metrics::describe_counter!(
        names::SEEN_MESSAGES_TOTAL,
        "Messages transitioned to seen by sweeps"
    );
    metrics::describe_gauge!(
        names::ONLINE_IDENTITIES,
        "Identities with at least one live connection"
    );
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of errors");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record a new connection.
pub fn record_connection() {
    counter!(names::CONNECTIONS_TOTAL).increment(1);
    gauge!(names::CONNECTIONS_ACTIVE).increment(1.0);
}

/// Record a disconnection.
pub fn record_disconnection() {
    gauge!(names::CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record a routed message.
pub fn record_message(direction: &str) {
    counter!(names::MESSAGES_TOTAL, "direction" => direction.to_string()).increment(1);
}

/// Record a live delivered push.
pub fn record_delivered_push() {
    counter!(names::DELIVERED_PUSHES_TOTAL).increment(1);
}

/// Record a seen acknowledgement sweep.
pub fn record_seen_sweep(rows: u64) {
    counter!(names::SEEN_SWEEPS_TOTAL).increment(1);
    counter!(names::SEEN_MESSAGES_TOTAL).increment(rows);
}

/// Update the online identity count.
pub fn set_online_identities(count: usize) {
    gauge!(names::ONLINE_IDENTITIES).set(count as f64);
}

/// Record an error.
pub fn record_error(error_type: &str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type.to_string()).increment(1);
}

/// Metrics guard that records disconnection on drop.
pub struct ConnectionMetricsGuard;

impl ConnectionMetricsGuard {
    /// Create a new metrics guard, recording a connection.
    #[must_use]
    pub fn new() -> Self {
        record_connection();
        Self
    }
}

impl Default for ConnectionMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionMetricsGuard {
    fn drop(&mut self) {
        record_disconnection();
    }
}
