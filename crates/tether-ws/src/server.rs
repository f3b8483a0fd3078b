//! WebSocket server driver.
//!
//! The server owns a TCP listener, a [`ConnectionRegistry`] and a
//! [`MessageHandler`]. Every accepted socket gets its own task:
//!
//! ```text
//! accept ──► handshake ──► register ──► on_open ──► recv loop ──► on_close
//!                │             │                        │
//!                └─ 400 ───────┴─ close ────────────────┴──► unregister
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use tether_ws::{ConnectionHandle, Message, Server, ServerConfig};
//!
//! let server = Server::bind(ServerConfig::default(), |conn: &ConnectionHandle, msg: Message| {
//!     let _ = conn.send(msg);
//! })
//! .await?;
//!
//! let shutdown = server.shutdown_handle();
//! shutdown.trigger_on_os_signals();
//! server.run().await?;
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::config::{ServerConfig, WebSocketConfig};
use crate::connection::Connection;
use crate::error::{CloseCode, WsResult};
use crate::handler::{drive, MessageHandler};
use crate::registry::ConnectionRegistry;
use crate::shutdown::{ConnectionTracker, ShutdownSignal};

/// The WebSocket server.
pub struct Server<H> {
    listener: TcpListener,
    config: ServerConfig,
    registry: Arc<ConnectionRegistry>,
    handler: Arc<H>,
    shutdown: ShutdownSignal,
    tracker: ConnectionTracker,
}

impl<H: MessageHandler> Server<H> {
    /// Bind the listener.
    ///
    /// Binding to port 0 picks a free port; see [`local_addr`](Self::local_addr).
    pub async fn bind(config: ServerConfig, handler: H) -> WsResult<Self> {
        let listener = TcpListener::bind(config.bind_addr).await?;
        let shutdown = ShutdownSignal::new();
        let registry = ConnectionRegistry::with_shutdown(config.registry.clone(), shutdown.clone());

        Ok(Self {
            listener,
            config,
            registry,
            handler: Arc::new(handler),
            shutdown,
            tracker: ConnectionTracker::new(),
        })
    }

    /// The address the listener is bound to.
    pub fn local_addr(&self) -> WsResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// The registry of live connections.
    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        Arc::clone(&self.registry)
    }

    /// A signal that stops the accept loop and closes every connection.
    pub fn shutdown_handle(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Accept connections until shutdown, then wait for them to drain.
    pub async fn run(self) -> WsResult<()> {
        let Self {
            listener,
            config,
            registry,
            handler,
            shutdown,
            tracker,
        } = self;

        info!(addr = %listener.local_addr()?, "WebSocket server listening");

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            let token = tracker.acquire();
                            let websocket = config.websocket.clone();
                            let registry = Arc::clone(&registry);
                            let handler = Arc::clone(&handler);

                            tokio::spawn(async move {
                                serve_connection(stream, peer, websocket, registry, handler).await;
                                drop(token);
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "failed to accept connection");
                        }
                    }
                }

                () = shutdown.recv() => {
                    info!("shutdown signal received, stopping server");
                    break;
                }
            }
        }

        drop(listener);
        registry.shutdown();

        info!(
            timeout = ?config.shutdown_timeout,
            connections = tracker.active_connections(),
            "waiting for connections to close"
        );

        tokio::select! {
            () = tracker.wait_for_drain() => {
                info!("all connections closed");
            }
            () = tokio::time::sleep(config.shutdown_timeout) => {
                warn!(
                    connections = tracker.active_connections(),
                    "shutdown timeout reached"
                );
            }
        }

        info!("server stopped");
        Ok(())
    }
}

async fn serve_connection<H: MessageHandler>(
    stream: TcpStream,
    peer: SocketAddr,
    config: WebSocketConfig,
    registry: Arc<ConnectionRegistry>,
    handler: Arc<H>,
) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!(%peer, error = %e, "failed to set TCP_NODELAY");
    }

    let shutdown = registry.shutdown_signal();
    let accepted = tokio::select! {
        result = Connection::accept(stream, Some(peer), config) => result,
        () = shutdown.recv() => {
            debug!(%peer, "shutdown during handshake, dropping connection");
            return;
        }
    };

    let mut conn = match accepted {
        Ok(conn) => conn.with_shutdown(shutdown),
        Err(e) => {
            debug!(%peer, error = %e, "connection rejected during handshake");
            return;
        }
    };

    let handle = conn.handle();
    let guard = match registry.register_guarded(handle.clone()) {
        Ok(guard) => guard,
        Err(e) => {
            let code = if registry.is_shutdown() {
                CloseCode::GoingAway
            } else {
                CloseCode::PolicyViolation
            };
            conn.disconnect(code, &e.to_string()).await;
            return;
        }
    };

    handler.on_open(&handle);
    drive(&mut conn, &handle, handler.as_ref()).await;
    handler.on_close(conn.id());
    drop(guard);
}
