//! WebSocket client driver.
//!
//! # Example
//!
//! ```rust,ignore
//! use tether_ws::{Client, ClientConfig, ReconnectPolicy};
//!
//! let client = Client::new(
//!     ClientConfig::new("localhost", 8080).reconnect(ReconnectPolicy::none().max_retries(3)),
//! );
//! let mut conn = client.connect_with_retry().await?;
//! conn.send_text("hello").await?;
//! ```

use std::time::Duration;

use tokio::net::TcpStream;
use tracing::{info, instrument, warn};

use crate::config::ClientConfig;
use crate::connection::Connection;
use crate::error::{WsError, WsResult};
use crate::handler::{drive, MessageHandler};
use crate::shutdown::ShutdownSignal;

/// Connects to a WebSocket server.
#[derive(Debug, Clone)]
pub struct Client {
    config: ClientConfig,
    shutdown: ShutdownSignal,
}

impl Client {
    /// Create a client.
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            shutdown: ShutdownSignal::new(),
        }
    }

    /// Attach the shutdown signal that connections from this client listen to.
    pub fn with_shutdown(mut self, signal: ShutdownSignal) -> Self {
        self.shutdown = signal;
        self
    }

    /// Get the client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Open a TCP connection and run the client handshake once.
    #[instrument(skip(self), fields(host = %self.config.host, port = self.config.port))]
    pub async fn connect(&self) -> WsResult<Connection<TcpStream>> {
        let ClientConfig {
            host,
            port,
            path,
            connect_timeout,
            websocket,
            ..
        } = &self.config;

        let connecting = TcpStream::connect((host.as_str(), *port));
        let stream = match connect_timeout {
            Some(limit) => tokio::time::timeout(*limit, connecting)
                .await
                .map_err(|_| WsError::timeout(format!("connecting to {host}:{port}")))??,
            None => connecting.await?,
        };
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?;

        let conn = Connection::connect(stream, host, *port, path, websocket.clone()).await?;
        Ok(conn.with_peer(peer).with_shutdown(self.shutdown.clone()))
    }

    /// Connect, retrying with exponential backoff per the reconnect policy.
    pub async fn connect_with_retry(&self) -> WsResult<Connection<TcpStream>> {
        let policy = &self.config.reconnect;
        let mut attempt = 0;

        loop {
            match self.connect().await {
                Ok(conn) => return Ok(conn),
                Err(e) if attempt < policy.max_retries => {
                    attempt += 1;
                    let delay = policy.backoff_for(attempt);
                    warn!(
                        attempt,
                        max_retries = policy.max_retries,
                        delay_ms = duration_millis(delay),
                        error = %e,
                        "connect failed, retrying"
                    );

                    tokio::select! {
                        () = tokio::time::sleep(delay) => {}
                        () = self.shutdown.recv() => return Err(e),
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Connect and feed every message to `handler` until the connection closes.
    pub async fn run<H: MessageHandler>(&self, handler: H) -> WsResult<()> {
        let mut conn = self.connect_with_retry().await?;
        let handle = conn.handle();

        handler.on_open(&handle);
        drive(&mut conn, &handle, &handler).await;
        handler.on_close(conn.id());

        info!(connection_id = %conn.id(), "client finished");
        Ok(())
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReconnectPolicy;
    use std::time::Instant;
    use tokio::net::TcpListener;

    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        port
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let client = Client::new(ClientConfig::new("127.0.0.1", closed_port().await));
        let err = client.connect().await.unwrap_err();
        assert!(matches!(err, WsError::Io(_)));
    }

    #[tokio::test]
    async fn test_connect_with_retry_gives_up() {
        let policy = ReconnectPolicy::none()
            .max_retries(2)
            .initial_backoff(Duration::from_millis(10))
            .max_backoff(Duration::from_millis(20));
        let client =
            Client::new(ClientConfig::new("127.0.0.1", closed_port().await).reconnect(policy));

        let started = Instant::now();
        assert!(client.connect_with_retry().await.is_err());
        // Two retries: 10 ms then 20 ms.
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn test_retry_stops_on_shutdown() {
        let policy = ReconnectPolicy::none()
            .max_retries(10)
            .initial_backoff(Duration::from_secs(30));
        let shutdown = ShutdownSignal::new();
        let client = Client::new(ClientConfig::new("127.0.0.1", closed_port().await).reconnect(policy))
            .with_shutdown(shutdown.clone());

        shutdown.trigger();
        let result = tokio::time::timeout(Duration::from_secs(2), client.connect_with_retry())
            .await
            .expect("retry loop should stop on shutdown");
        assert!(result.is_err());
    }
}
