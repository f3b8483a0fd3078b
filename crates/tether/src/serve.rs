//! `tether serve`: a server that logs what it receives.

use std::fmt::Write as _;
use std::sync::{Arc, OnceLock};

use anyhow::Context;
use tether_ws::{
    ConnectionHandle, ConnectionId, ConnectionRegistry, Message, MessageHandler, Server,
    ServerConfig,
};
use tracing::{debug, info, warn};

/// What the server does with a message besides logging it.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServeOptions {
    /// Send text and binary messages back to their sender.
    pub echo: bool,
    /// Send each text message to every connection.
    pub broadcast: bool,
}

/// Logs every message; optionally echoes or broadcasts it.
#[derive(Debug)]
pub struct LoggingHandler {
    options: ServeOptions,
    registry: Arc<OnceLock<Arc<ConnectionRegistry>>>,
}

impl LoggingHandler {
    /// Create a handler. Broadcasting starts once `registry` is filled.
    pub fn new(options: ServeOptions, registry: Arc<OnceLock<Arc<ConnectionRegistry>>>) -> Self {
        Self { options, registry }
    }

    fn reply(conn: &ConnectionHandle, message: Message) {
        if let Err(e) = conn.send(message) {
            warn!(connection_id = %conn.id(), error = %e, "failed to echo message");
        }
    }
}

impl MessageHandler for LoggingHandler {
    fn on_open(&self, conn: &ConnectionHandle) {
        info!(connection_id = %conn.id(), peer = ?conn.peer(), "client connected");
    }

    fn on_message(&self, conn: &ConnectionHandle, message: Message) {
        match message {
            Message::Text(text) => {
                info!(connection_id = %conn.id(), len = text.len(), text = %text, "text message");

                if self.options.broadcast {
                    if let Some(registry) = self.registry.get() {
                        let delivered = registry.broadcast(&Message::Text(text));
                        debug!(delivered, "broadcast text message");
                    }
                } else if self.options.echo {
                    Self::reply(conn, Message::Text(text));
                }
            }
            Message::Binary(data) => {
                info!(
                    connection_id = %conn.id(),
                    len = data.len(),
                    hex = %to_hex(&data),
                    "binary message"
                );

                if self.options.echo {
                    Self::reply(conn, Message::Binary(data));
                }
            }
            _ => {}
        }
    }

    fn on_close(&self, id: ConnectionId) {
        info!(connection_id = %id, "client disconnected");
    }
}

/// Bind, then serve until Ctrl-C or SIGTERM.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound.
pub async fn run(config: ServerConfig, options: ServeOptions) -> anyhow::Result<()> {
    let registry = Arc::new(OnceLock::new());
    let handler = LoggingHandler::new(options, Arc::clone(&registry));

    let bind_addr = config.bind_addr;
    let server = Server::bind(config, handler)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    let _ = registry.set(server.registry());

    server.shutdown_handle().trigger_on_os_signals();
    info!(
        addr = %server.local_addr()?,
        echo = options.echo,
        broadcast = options.broadcast,
        "tether server listening"
    );

    server.run().await?;
    info!("tether server stopped");
    Ok(())
}

/// Lowercase hex, two digits per byte.
pub fn to_hex(data: &[u8]) -> String {
    data.iter().fold(String::with_capacity(data.len() * 2), |mut out, byte| {
        let _ = write!(out, "{byte:02x}");
        out
    })
}
