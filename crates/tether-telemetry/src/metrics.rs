//! Prometheus metrics export.
//!
//! Library crates record through the `metrics` facade; this module installs
//! the Prometheus recorder and its HTTP listener and describes the metrics
//! Tether emits.
//!
//! # Standard Metrics
//!
//! | Metric | Type | Description |
//! |--------|------|-------------|
//! | `tether_connections_registered_total` | Counter | Connections admitted to the registry |
//! | `tether_connections_rejected_total` | Counter | Connections refused by the registry |
//! | `tether_connections_active` | Gauge | Live connections |
//! | `tether_broadcast_failures_total` | Counter | Broadcast deliveries that failed |

use crate::error::TelemetryError;
use crate::TelemetryResult;
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Metrics configuration.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Whether to serve metrics.
    pub enabled: bool,

    /// Address to expose metrics on (e.g., "0.0.0.0:9090").
    pub addr: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            addr: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Installs the Prometheus recorder and starts its HTTP listener.
///
/// Must be called from within a Tokio runtime; the listener runs as a task
/// on it.
///
/// # Errors
///
/// Returns `TelemetryError::InvalidAddress` for an unparsable address and
/// `TelemetryError::MetricsInit` if the exporter cannot be installed.
pub fn init_metrics(config: &MetricsConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let addr: SocketAddr = config
        .addr
        .parse()
        .map_err(|e| TelemetryError::InvalidAddress(format!("{}: {e}", config.addr)))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

    register_metric_descriptions();
    tracing::info!(%addr, "Prometheus metrics listening");

    Ok(())
}

/// Registers descriptions for all standard metrics.
fn register_metric_descriptions() {
    describe_counter!(
        "tether_connections_registered_total",
        "Total WebSocket connections admitted to the registry"
    );
    describe_counter!(
        "tether_connections_rejected_total",
        "Total WebSocket connections refused by the registry"
    );
    describe_gauge!(
        "tether_connections_active",
        "Number of live WebSocket connections"
    );
    describe_counter!(
        "tether_broadcast_failures_total",
        "Total broadcast deliveries that failed"
    );
}
