//! Observability setup for Tether: structured logging and Prometheus metrics.
//!
//! The library crates only emit through the `tracing` and `metrics` facades.
//! Binaries call [`init_telemetry`] once at startup to decide where that
//! output goes.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  tether-ws (tracing::info!, counter!, ...)   │
//! └──────────────┬───────────────────┬───────────┘
//!                │                   │
//!                ▼                   ▼
//!      ┌──────────────────┐  ┌──────────────────┐
//!      │ tracing-subscriber│  │ Prometheus       │
//!      │ json / pretty     │  │ recorder         │
//!      └────────┬─────────┘  └────────┬─────────┘
//!               ▼                     ▼
//!            stdout            GET /metrics
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use tether_telemetry::{init_telemetry, LogConfig, TelemetryConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = TelemetryConfig::builder()
//!         .service_name("tether")
//!         .logging(LogConfig::production())
//!         .metrics_addr("0.0.0.0:9090")
//!         .build();
//!
//!     init_telemetry(&config).expect("Failed to init telemetry");
//! }
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;

pub use config::{TelemetryConfig, TelemetryConfigBuilder};
pub use error::TelemetryError;
pub use logging::{create_env_filter, init_logging, open_log_file, LogConfig};
pub use metrics::{init_metrics, MetricsConfig};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Initializes logging, then metrics.
///
/// # Errors
///
/// Returns `TelemetryError` if either subsystem fails to initialize.
pub fn init_telemetry(config: &TelemetryConfig) -> TelemetryResult<()> {
    init_logging(&config.logging)?;
    init_metrics(&config.metrics)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_telemetry_disabled() {
        let config = TelemetryConfig::builder()
            .logging(LogConfig {
                enabled: false,
                ..LogConfig::default()
            })
            .build();
        assert!(init_telemetry(&config).is_ok());
    }
}
