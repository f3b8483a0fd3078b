//! # Tether
//!
//! A WebSocket server and client built on [`tether_ws`].
//!
//! This crate re-exports the workspace crates and holds the `tether` binary's
//! commands:
//!
//! - `tether serve` accepts connections and logs every message, with
//!   optional echo and broadcast
//! - `tether connect` opens an interactive client session
//!
//! ```text
//! tether.toml ─┐
//! .env ────────┼─► TetherConfig ─► settings ─► ServerConfig / ClientConfig
//! TETHER__* ───┘                          └──► TelemetryConfig
//! ```
//!
//! ## Library use
//!
//! ```rust,ignore
//! use tether::ws::{ConnectionHandle, Message, Server, ServerConfig};
//!
//! let server = Server::bind(ServerConfig::new(), |conn: &ConnectionHandle, msg: Message| {
//!     let _ = conn.send(msg);
//! })
//! .await?;
//! server.run().await?;
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub use tether_config as config;
pub use tether_telemetry as telemetry;
pub use tether_ws as ws;

pub mod cli;
pub mod connect;
pub mod serve;
pub mod settings;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
