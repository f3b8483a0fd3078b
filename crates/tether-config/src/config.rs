//! Main configuration types.
//!
//! This module provides the top-level [`TetherConfig`] struct and its builder.

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::{
    ClientSettings, ConfigError, LogFormat, ServerSettings, TelemetrySettings, WebSocketSettings,
};

/// Complete Tether configuration.
///
/// This is the root configuration type that contains all configuration sections.
/// Use [`ConfigLoader`](crate::ConfigLoader) to load configuration from files
/// and environment variables.
///
/// # Example
///
/// ```
/// use tether_config::TetherConfig;
///
/// let config = TetherConfig::default();
/// assert_eq!(config.server.bind_addr, "0.0.0.0:8080");
/// assert_eq!(config.client.port, 8080);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct TetherConfig {
    /// Server driver configuration.
    #[serde(default)]
    pub server: ServerSettings,

    /// Client driver configuration.
    #[serde(default)]
    pub client: ClientSettings,

    /// Protocol settings shared by both drivers.
    #[serde(default)]
    pub websocket: WebSocketSettings,

    /// Logging and metrics.
    #[serde(default)]
    pub telemetry: TelemetrySettings,
}

impl TetherConfig {
    /// Create a new configuration builder.
    #[must_use]
    pub fn builder() -> TetherConfigBuilder {
        TetherConfigBuilder::new()
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - The server or metrics address is not a socket address
    /// - The client host is empty, the port is 0, or the path is not absolute
    /// - The retry backoff bounds are inverted
    /// - A size limit is zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        parse_addr("server.bind_addr", &self.server.bind_addr)?;

        if self.telemetry.metrics.enabled {
            parse_addr("telemetry.metrics.addr", &self.telemetry.metrics.addr)?;
        }

        if self.client.host.trim().is_empty() {
            return Err(ConfigError::invalid_value("client.host", "must not be empty"));
        }
        if self.client.port == 0 {
            return Err(ConfigError::invalid_value("client.port", "must not be 0"));
        }
        if !self.client.path.starts_with('/') {
            return Err(ConfigError::invalid_value(
                "client.path",
                format!("must start with '/': {}", self.client.path),
            ));
        }
        if self.client.initial_backoff_ms > self.client.max_backoff_ms {
            return Err(ConfigError::validation_error(
                "client.initial_backoff_ms must not exceed client.max_backoff_ms",
            ));
        }

        if self.websocket.max_frame_size == 0 {
            return Err(ConfigError::invalid_value(
                "websocket.max_frame_size",
                "must be greater than 0",
            ));
        }
        if self.websocket.max_handshake_size == 0 {
            return Err(ConfigError::invalid_value(
                "websocket.max_handshake_size",
                "must be greater than 0",
            ));
        }
        if self.websocket.send_queue_size == 0 {
            return Err(ConfigError::invalid_value(
                "websocket.send_queue_size",
                "must be greater than 0",
            ));
        }

        Ok(())
    }

    /// Development preset: debug level, pretty output with source locations.
    ///
    /// # Example
    ///
    /// ```
    /// use tether_config::TetherConfig;
    ///
    /// let config = TetherConfig::development();
    /// assert_eq!(config.telemetry.logging.level, "debug");
    /// ```
    #[must_use]
    pub fn development() -> Self {
        let mut config = Self::default();

        config.server.bind_addr = "127.0.0.1:8080".to_string();
        config.telemetry.logging.level = "debug".to_string();
        config.telemetry.logging.format = LogFormat::Pretty;
        config.telemetry.logging.include_location = true;

        config
    }

    /// Production preset: JSON logs, metrics, and timeouts on handshakes and
    /// idle connections.
    ///
    /// # Example
    ///
    /// ```
    /// use tether_config::{LogFormat, TetherConfig};
    ///
    /// let config = TetherConfig::production();
    /// assert_eq!(config.telemetry.logging.format, LogFormat::Json);
    /// ```
    #[must_use]
    pub fn production() -> Self {
        let mut config = Self::default();

        config.telemetry.logging.level = "info".to_string();
        config.telemetry.logging.format = LogFormat::Json;
        config.telemetry.metrics.enabled = true;

        config.websocket.handshake_timeout_ms = Some(10_000);
        config.websocket.idle_timeout_secs = Some(300);

        config
    }

    /// The server listen address.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if the address does not parse.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        parse_addr("server.bind_addr", &self.server.bind_addr)
    }
}

fn parse_addr(field: &str, value: &str) -> Result<SocketAddr, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::invalid_value(field, format!("invalid socket address: {value}")))
}

/// Builder for [`TetherConfig`].
#[derive(Debug, Default)]
pub struct TetherConfigBuilder {
    server: Option<ServerSettings>,
    client: Option<ClientSettings>,
    websocket: Option<WebSocketSettings>,
    telemetry: Option<TelemetrySettings>,
}

impl TetherConfigBuilder {
    /// Create a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the server section.
    #[must_use]
    pub fn server(mut self, server: ServerSettings) -> Self {
        self.server = Some(server);
        self
    }

    /// Set the client section.
    #[must_use]
    pub fn client(mut self, client: ClientSettings) -> Self {
        self.client = Some(client);
        self
    }

    /// Set the websocket section.
    #[must_use]
    pub fn websocket(mut self, websocket: WebSocketSettings) -> Self {
        self.websocket = Some(websocket);
        self
    }

    /// Set the telemetry section.
    #[must_use]
    pub fn telemetry(mut self, telemetry: TelemetrySettings) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Build the configuration. Unset sections use their defaults.
    #[must_use]
    pub fn build(self) -> TetherConfig {
        TetherConfig {
            server: self.server.unwrap_or_default(),
            client: self.client.unwrap_or_default(),
            websocket: self.websocket.unwrap_or_default(),
            telemetry: self.telemetry.unwrap_or_default(),
        }
    }

    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if validation fails.
    pub fn build_validated(self) -> Result<TetherConfig, ConfigError> {
        let config = self.build();
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = TetherConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.telemetry.service_name, "tether");
    }

    #[test]
    fn test_builder_keeps_other_defaults() {
        let config = TetherConfig::builder()
            .client(ClientSettings {
                host: "robot.local".to_string(),
                ..Default::default()
            })
            .build();

        assert_eq!(config.client.host, "robot.local");
        assert_eq!(config.server.bind_addr, "0.0.0.0:8080");
    }

    #[test]
    fn test_validate_invalid_bind_addr() {
        let config = TetherConfig::builder()
            .server(ServerSettings {
                bind_addr: "not-an-address".to_string(),
                ..Default::default()
            })
            .build();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("server.bind_addr"));
    }

    #[test]
    fn test_validate_metrics_addr_only_when_enabled() {
        let mut config = TetherConfig::default();
        config.telemetry.metrics.addr = "nowhere".to_string();
        assert!(config.validate().is_ok());

        config.telemetry.metrics.enabled = true;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_client_fields() {
        let mut config = TetherConfig::default();
        config.client.port = 0;
        assert!(config.validate().is_err());

        let mut config = TetherConfig::default();
        config.client.path = "ws".to_string();
        assert!(config.validate().is_err());

        let mut config = TetherConfig::default();
        config.client.initial_backoff_ms = 60_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_frame_size() {
        let mut config = TetherConfig::default();
        config.websocket.max_frame_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_send_queue_size() {
        let mut config = TetherConfig::default();
        config.websocket.send_queue_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_presets_are_valid() {
        assert!(TetherConfig::development().validate().is_ok());
        assert!(TetherConfig::production().validate().is_ok());
        assert!(TetherConfig::production().telemetry.metrics.enabled);
    }

    #[test]
    fn test_bind_addr() {
        let config = TetherConfig::development();
        assert_eq!(config.bind_addr().unwrap().port(), 8080);
    }
}
