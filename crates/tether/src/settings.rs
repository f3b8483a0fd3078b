//! Conversion from file configuration to runtime configuration.
//!
//! `tether-config` describes what an operator writes down; `tether-ws` and
//! `tether-telemetry` take their own builder types. This module is the only
//! place the two meet.

use std::time::Duration;

use tether_config::{ConfigError, LogFormat, TetherConfig, WebSocketSettings};
use tether_telemetry::{LogConfig, MetricsConfig, TelemetryConfig};
use tether_ws::{ClientConfig, ReconnectPolicy, RegistryConfig, ServerConfig, WebSocketConfig};

/// Per-connection settings.
pub fn websocket_config(settings: &WebSocketSettings) -> WebSocketConfig {
    let mut config = WebSocketConfig::new()
        .max_frame_size(settings.max_frame_size)
        .max_handshake_size(settings.max_handshake_size)
        .send_queue_size(settings.send_queue_size)
        .accept_unmasked_frames(settings.accept_unmasked_frames)
        .echo_close(settings.echo_close);

    if let Some(ms) = settings.handshake_timeout_ms {
        config = config.handshake_timeout(Duration::from_millis(ms));
    }
    if let Some(secs) = settings.idle_timeout_secs {
        config = config.idle_timeout(Duration::from_secs(secs));
    }

    config
}

/// Server driver settings.
///
/// # Errors
///
/// Returns `ConfigError::InvalidValue` if the bind address does not parse.
pub fn server_config(config: &TetherConfig) -> Result<ServerConfig, ConfigError> {
    Ok(ServerConfig::new()
        .bind_addr(config.bind_addr()?)
        .shutdown_timeout(Duration::from_secs(config.server.shutdown_timeout_secs))
        .websocket(websocket_config(&config.websocket))
        .registry(RegistryConfig::new().max_connections(config.server.max_connections)))
}

/// Client driver settings.
pub fn client_config(config: &TetherConfig) -> ClientConfig {
    let client = &config.client;
    let reconnect = ReconnectPolicy::default()
        .max_retries(client.max_retries)
        .initial_backoff(Duration::from_millis(client.initial_backoff_ms))
        .max_backoff(Duration::from_millis(client.max_backoff_ms));

    let mut out = ClientConfig::new(client.host.clone(), client.port)
        .path(client.path.clone())
        .websocket(websocket_config(&config.websocket))
        .reconnect(reconnect);

    if let Some(ms) = client.connect_timeout_ms {
        out = out.connect_timeout(Duration::from_millis(ms));
    }

    out
}

/// Logging and metrics settings.
pub fn telemetry_config(config: &TetherConfig) -> TelemetryConfig {
    let telemetry = &config.telemetry;
    let logging = &telemetry.logging;

    TelemetryConfig::builder()
        .service_name(&telemetry.service_name)
        .logging(LogConfig {
            enabled: logging.enabled,
            level: logging.level.clone(),
            json_format: logging.format == LogFormat::Json,
            file_line_info: logging.include_location,
            include_target: logging.include_target,
            file: logging.file.clone(),
            ..LogConfig::default()
        })
        .metrics(MetricsConfig {
            enabled: telemetry.metrics.enabled,
            addr: telemetry.metrics.addr.clone(),
        })
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_websocket_timeouts_are_optional() {
        let config = websocket_config(&WebSocketSettings::default());
        assert!(config.handshake_timeout.is_none());
        assert!(config.idle_timeout.is_none());
        assert!(config.echo_close);

        let production = TetherConfig::production();
        let config = websocket_config(&production.websocket);
        assert_eq!(config.handshake_timeout, Some(Duration::from_secs(10)));
        assert_eq!(config.idle_timeout, Some(Duration::from_secs(300)));
    }

    #[test]
    fn test_server_config() {
        let mut config = TetherConfig::development();
        config.server.max_connections = 3;

        let server = server_config(&config).unwrap();
        assert_eq!(server.bind_addr.to_string(), "127.0.0.1:8080");
        assert_eq!(server.shutdown_timeout, Duration::from_secs(30));
        assert_eq!(server.registry.max_connections, 3);
    }

    #[test]
    fn test_server_config_rejects_bad_addr() {
        let mut config = TetherConfig::default();
        config.server.bind_addr = "localhost".to_string();
        assert!(server_config(&config).is_err());
    }

    #[test]
    fn test_client_config() {
        let mut config = TetherConfig::default();
        config.client.host = "robot.local".to_string();
        config.client.max_retries = 5;
        config.client.connect_timeout_ms = Some(250);

        let client = client_config(&config);
        assert_eq!(client.host, "robot.local");
        assert_eq!(client.port, 8080);
        assert_eq!(client.reconnect.max_retries, 5);
        assert_eq!(client.reconnect.initial_backoff, Duration::from_millis(500));
        assert_eq!(client.connect_timeout, Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_telemetry_config() {
        let telemetry = telemetry_config(&TetherConfig::production());
        assert!(telemetry.logging.json_format);
        assert!(telemetry.metrics.enabled);
        assert_eq!(telemetry.logging.service_name, "tether");

        let telemetry = telemetry_config(&TetherConfig::development());
        assert!(!telemetry.logging.json_format);
        assert!(telemetry.logging.file_line_info);
        assert_eq!(telemetry.logging.level, "debug");
        assert!(telemetry.logging.file.is_none());
    }

    #[test]
    fn test_log_file_and_send_queue_carried_over() {
        let mut config = TetherConfig::default();
        config.telemetry.logging.file = Some("/tmp/tether.log".into());
        config.websocket.send_queue_size = 16;

        let telemetry = telemetry_config(&config);
        assert_eq!(
            telemetry.logging.file.as_deref(),
            Some(std::path::Path::new("/tmp/tether.log"))
        );
        assert_eq!(websocket_config(&config.websocket).send_queue_size, 16);
    }
}
