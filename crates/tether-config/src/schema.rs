//! Configuration schema types.
//!
//! This module defines the structure of all configuration sections. Every
//! section rejects unknown fields, so a typo in a config file fails loudly.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Server section.
///
/// # Example
///
/// ```
/// use tether_config::ServerSettings;
///
/// let server = ServerSettings {
///     bind_addr: "127.0.0.1:9000".to_string(),
///     ..Default::default()
/// };
/// assert_eq!(server.max_connections, 10_000);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ServerSettings {
    /// Listen address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// How long to wait for connections to close on shutdown, in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Maximum live connections; 0 means unlimited.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            max_connections: default_max_connections(),
        }
    }
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_max_connections() -> usize {
    10_000
}

/// Client section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ClientSettings {
    /// Server host name or address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request path of the upgrade request.
    #[serde(default = "default_path")]
    pub path: String,

    /// TCP connect timeout in milliseconds. None waits indefinitely.
    #[serde(default)]
    pub connect_timeout_ms: Option<u64>,

    /// Connection attempts after the first failure.
    #[serde(default)]
    pub max_retries: u32,

    /// Delay before the first retry, in milliseconds.
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Upper bound on the retry delay, in milliseconds.
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            path: default_path(),
            connect_timeout_ms: None,
            max_retries: 0,
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_path() -> String {
    "/".to_string()
}

fn default_initial_backoff() -> u64 {
    500
}

fn default_max_backoff() -> u64 {
    30_000
}

/// Per-connection protocol settings, shared by server and client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct WebSocketSettings {
    /// Largest accepted frame payload in bytes.
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,

    /// Largest accepted handshake head in bytes.
    #[serde(default = "default_max_handshake_size")]
    pub max_handshake_size: usize,

    /// Messages a connection handle may queue before sends fail.
    #[serde(default = "default_send_queue_size")]
    pub send_queue_size: usize,

    /// Reply to a peer's close frame before releasing the transport.
    #[serde(default = "default_true")]
    pub echo_close: bool,

    /// Accept unmasked frames from clients.
    #[serde(default)]
    pub accept_unmasked_frames: bool,

    /// Handshake deadline in milliseconds. None waits indefinitely.
    #[serde(default)]
    pub handshake_timeout_ms: Option<u64>,

    /// Close connections idle for this many seconds. None disables the check.
    #[serde(default)]
    pub idle_timeout_secs: Option<u64>,
}

impl Default for WebSocketSettings {
    fn default() -> Self {
        Self {
            max_frame_size: default_max_frame_size(),
            max_handshake_size: default_max_handshake_size(),
            send_queue_size: default_send_queue_size(),
            echo_close: true,
            accept_unmasked_frames: false,
            handshake_timeout_ms: None,
            idle_timeout_secs: None,
        }
    }
}

fn default_max_frame_size() -> usize {
    16 * 1024 * 1024
}

fn default_max_handshake_size() -> usize {
    8 * 1024
}

fn default_send_queue_size() -> usize {
    256
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MetricsSettings {
    /// Serve Prometheus metrics.
    #[serde(default)]
    pub enabled: bool,

    /// Prometheus metrics endpoint address.
    #[serde(default = "default_metrics_addr")]
    pub addr: String,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            addr: default_metrics_addr(),
        }
    }
}

fn default_metrics_addr() -> String {
    "0.0.0.0:9090".to_string()
}

/// Log output format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON formatted logs (production).
    Json,
    /// Human-readable pretty format (development).
    #[default]
    Pretty,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingSettings {
    /// Enable logging.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Log level or filter directive (e.g., "info", "tether_ws=debug").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Include source file and line in logs.
    #[serde(default)]
    pub include_location: bool,

    /// Include the module path in logs.
    #[serde(default = "default_true")]
    pub include_target: bool,

    /// Also append plain-text logs to this file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_log_level(),
            format: LogFormat::default(),
            include_location: false,
            include_target: true,
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Telemetry section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TelemetrySettings {
    /// Service name attached to log output.
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingSettings,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsSettings,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            logging: LoggingSettings::default(),
            metrics: MetricsSettings::default(),
        }
    }
}

fn default_service_name() -> String {
    "tether".to_string()
}

fn default_true() -> bool {
    true
}
