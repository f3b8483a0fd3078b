//! WebSocket configuration.
//!
//! This module defines configuration options for individual connections,
//! the connection registry, and the server and client drivers.

use std::net::SocketAddr;
use std::time::Duration;

use crate::frame::DEFAULT_MAX_PAYLOAD_SIZE;
use crate::handshake::DEFAULT_MAX_HEAD_SIZE;

/// Default capacity of a connection's outbound queue.
pub const DEFAULT_SEND_QUEUE_SIZE: usize = 256;

/// Configuration for a WebSocket connection.
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Maximum frame payload size in bytes (default: 16 MB).
    pub max_frame_size: usize,
    /// Maximum HTTP head size during the handshake (default: 8 KB).
    pub max_handshake_size: usize,
    /// Initial read buffer capacity (default: 8 KB).
    pub read_buffer_size: usize,
    /// Messages a [`ConnectionHandle`](crate::ConnectionHandle) may queue
    /// before sends fail (default: 256).
    pub send_queue_size: usize,
    /// Whether to accept unmasked frames from clients (default: false).
    pub accept_unmasked_frames: bool,
    /// Whether to answer a peer's close frame with our own (default: true).
    pub echo_close: bool,
    /// Abort the handshake if it takes longer than this (default: none).
    pub handshake_timeout: Option<Duration>,
    /// Close the connection after this long without inbound traffic
    /// (default: none).
    pub idle_timeout: Option<Duration>,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_PAYLOAD_SIZE,
            max_handshake_size: DEFAULT_MAX_HEAD_SIZE,
            read_buffer_size: 8 * 1024,
            send_queue_size: DEFAULT_SEND_QUEUE_SIZE,
            accept_unmasked_frames: false,
            echo_close: true,
            handshake_timeout: None,
            idle_timeout: None,
        }
    }
}

impl WebSocketConfig {
    /// Create a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum frame size.
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    /// Set the maximum handshake head size.
    pub fn max_handshake_size(mut self, size: usize) -> Self {
        self.max_handshake_size = size;
        self
    }

    /// Set the read buffer size.
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Set the outbound queue capacity. Zero is treated as one.
    pub fn send_queue_size(mut self, size: usize) -> Self {
        self.send_queue_size = size;
        self
    }

    /// Set whether to accept unmasked frames from clients.
    pub fn accept_unmasked_frames(mut self, accept: bool) -> Self {
        self.accept_unmasked_frames = accept;
        self
    }

    /// Set whether to echo a close frame back to the peer.
    pub fn echo_close(mut self, echo: bool) -> Self {
        self.echo_close = echo;
        self
    }

    /// Set the handshake timeout.
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = Some(timeout);
        self
    }

    /// Set the idle timeout.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }
}

/// Configuration for the connection registry.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Maximum live connections; 0 means unlimited (default: 10000).
    pub max_connections: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_connections: 10_000,
        }
    }
}

impl RegistryConfig {
    /// Create a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of live connections.
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }
}

/// Configuration for the server driver.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on (default: 0.0.0.0:8080).
    pub bind_addr: SocketAddr,
    /// How long to wait for connection tasks after shutdown (default: 30 seconds).
    pub shutdown_timeout: Duration,
    /// Per-connection settings.
    pub websocket: WebSocketConfig,
    /// Registry settings.
    pub registry: RegistryConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            shutdown_timeout: Duration::from_secs(30),
            websocket: WebSocketConfig::default(),
            registry: RegistryConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Create a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the listen address.
    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the graceful shutdown timeout.
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Set the per-connection settings.
    pub fn websocket(mut self, config: WebSocketConfig) -> Self {
        self.websocket = config;
        self
    }

    /// Set the registry settings.
    pub fn registry(mut self, config: RegistryConfig) -> Self {
        self.registry = config;
        self
    }
}

/// Retry policy for the client driver.
///
/// Backoff doubles after each failed attempt, capped at `max_backoff`.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Attempts after the first failure; 0 disables retrying (default: 0).
    pub max_retries: u32,
    /// Delay before the first retry (default: 500 ms).
    pub initial_backoff: Duration,
    /// Upper bound on the delay between retries (default: 30 seconds).
    pub max_backoff: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl ReconnectPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self::default()
    }

    /// Set the retry count.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the initial backoff.
    pub fn initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    /// Set the backoff cap.
    pub fn max_backoff(mut self, backoff: Duration) -> Self {
        self.max_backoff = backoff;
        self
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Configuration for the client driver.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server host name or address (default: localhost).
    pub host: String,
    /// Server port (default: 8080).
    pub port: u16,
    /// Request path (default: `/`).
    pub path: String,
    /// TCP connect timeout (default: none).
    pub connect_timeout: Option<Duration>,
    /// Per-connection settings.
    pub websocket: WebSocketConfig,
    /// Retry policy for the initial connect.
    pub reconnect: ReconnectPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8080,
            path: "/".to_string(),
            connect_timeout: None,
            websocket: WebSocketConfig::default(),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Create a configuration for `host:port`.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Set the request path.
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Set the TCP connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set the per-connection settings.
    pub fn websocket(mut self, config: WebSocketConfig) -> Self {
        self.websocket = config;
        self
    }

    /// Set the retry policy.
    pub fn reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }
}
