//! WebSocket protocol core for Tether.
//!
//! This crate implements the subset of RFC 6455 that Tether speaks: the
//! opening handshake, single-frame text and binary messages, ping/pong and
//! the close handshake. The same frame codec serves both roles; only the
//! masking direction differs.
//!
//! # Example
//!
//! ```ignore
//! use tether_ws::{ConnectionHandle, Message, Server, ServerConfig};
//!
//! // Echo every data message back to its sender
//! let server = Server::bind(ServerConfig::default(), |conn: &ConnectionHandle, msg: Message| {
//!     if let Err(e) = conn.send(msg) {
//!         tracing::warn!(error = %e, "echo failed");
//!     }
//! })
//! .await?;
//!
//! server.shutdown_handle().trigger_on_os_signals();
//! server.run().await?;
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Connection Flow                       │
//! │                                                              │
//! │  TcpStream ──► handshake::read_http_head() ──► accept/verify │
//! │       │                                                      │
//! │       ▼                                                      │
//! │  Connection (Open) ──► register() ──► ConnectionRegistry     │
//! │       │                                                      │
//! │       ▼                                                      │
//! │  recv(): read_buf ──► FrameCodec::decode() ──► Message       │
//! │       │        ▲                                             │
//! │       │        └── ConnectionHandle commands / shutdown      │
//! │       ▼                                                      │
//! │  Close: echo ──► release transport once ──► unregister       │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Message Handling
//!
//! The [`Message`] enum represents WebSocket messages:
//!
//! - [`Message::Text`] - UTF-8 text messages
//! - [`Message::Binary`] - Binary data
//! - [`Message::Ping`] - Ping frames (answered with Pong before being returned)
//! - [`Message::Pong`] - Pong frames
//! - [`Message::Close`] - Close frames with optional code and reason
//!
//! Continuation frames and fragmented messages are not supported; a peer
//! that sends one is closed with 1003 (Unsupported Data).
//!
//! # Configuration
//!
//! - [`WebSocketConfig`] - Per-connection settings
//! - [`RegistryConfig`] - Connection limit
//! - [`ServerConfig`] / [`ClientConfig`] - Driver settings

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod frame;
pub mod handler;
pub mod handshake;
pub mod message;
pub mod registry;
pub mod server;
pub mod shutdown;

pub use client::Client;
pub use config::{ClientConfig, ReconnectPolicy, RegistryConfig, ServerConfig, WebSocketConfig};
pub use connection::{Connection, ConnectionHandle, ConnectionId, ConnectionState};
pub use error::{CloseCode, FrameError, HandshakeError, WsError, WsResult};
pub use frame::{apply_mask, Decoded, Frame, FrameCodec, Opcode, Role};
pub use handler::MessageHandler;
pub use handshake::{
    accept_handshake, build_handshake_request, compute_accept_key, reject_response,
    verify_handshake_response, ClientHandshake, HandshakeResponse,
};
pub use message::{CloseFrame, Message};
pub use registry::{ConnectionRegistry, RegistrationGuard, RegistryStats};
pub use server::Server;
pub use shutdown::{ConnectionTracker, ShutdownSignal};
