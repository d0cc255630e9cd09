//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render the `/metrics` endpoint.
/// Must be called once at startup before any metrics are recorded.
pub fn install_recorder() -> PrometheusHandle {
    let builder = PrometheusBuilder::new();
    let handle = builder
        .install_recorder()
        .expect("failed to install metrics recorder");
    info!("prometheus metrics recorder installed");
    handle
}

/// Clients attached since start (counter).
pub const SSE_CONNECTIONS_TOTAL: &str = "sse_connections_total";
/// Clients detached since start (counter).
pub const SSE_DISCONNECTIONS_TOTAL: &str = "sse_disconnections_total";
/// Currently attached clients (gauge).
pub const SSE_CONNECTIONS_ACTIVE: &str = "sse_connections_active";
/// Broadcast calls (counter).
pub const SSE_BROADCASTS_TOTAL: &str = "sse_broadcasts_total";
/// Frames dropped on full client buffers (counter).
pub const SSE_FRAMES_DROPPED_TOTAL: &str = "sse_frames_dropped_total";
/// Heartbeat frames delivered (counter).
pub const SSE_HEARTBEATS_TOTAL: &str = "sse_heartbeats_total";
