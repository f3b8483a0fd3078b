//! WebSocket connection state machine.
//!
//! A [`Connection`] owns one transport for its whole life and walks the
//! linear state sequence
//!
//! ```text
//! Connecting ──handshake ok──► Open ──close sent/received──► Closing ──► Closed
//!      │                         │                                        ▲
//!      └──handshake failed───────┴──────EOF / read error / violation──────┘
//! ```
//!
//! Inbound bytes accumulate in a read buffer; [`Connection::recv`] decodes
//! frames from it only once they are complete, so a frame split across any
//! number of reads (or several frames in one read) is handled in order.
//! Pings are answered inline. The transport is shut down and dropped exactly
//! once, on whichever exit path comes first.
//!
//! Other tasks talk to a connection through a cloneable [`ConnectionHandle`];
//! queued messages are written by the owning task inside `recv`.

use std::fmt;
use std::net::SocketAddr;
use std::time::Instant;

use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, instrument, trace, warn};
use uuid::Uuid;

use crate::config::WebSocketConfig;
use crate::error::{CloseCode, FrameError, HandshakeError, WsError, WsResult};
use crate::frame::{Decoded, Frame, FrameCodec, Opcode, Role};
use crate::handshake::{
    accept_handshake, build_handshake_request_with_key, generate_client_key, read_http_head,
    reject_response, verify_handshake_response, ReadHeadError,
};
use crate::message::Message;
use crate::shutdown::ShutdownSignal;

/// A unique identifier for a WebSocket connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Create a new time-ordered connection ID.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for ConnectionId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// Lifecycle state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Handshake in progress.
    Connecting,
    /// Handshake complete; data may flow.
    Open,
    /// A close frame has been sent or received.
    Closing,
    /// Transport released.
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Work queued for the owning task by a [`ConnectionHandle`].
#[derive(Debug)]
pub(crate) enum Command {
    Send(Message),
    Disconnect { code: CloseCode, reason: String },
}

enum Event {
    Read(std::io::Result<usize>),
    Command(Option<Command>),
    Shutdown,
    Aborted,
    Idle,
}

/// A WebSocket connection over any async byte stream.
///
/// # Example
///
/// ```ignore
/// use tether_ws::{Connection, Message, WebSocketConfig};
///
/// let mut conn = Connection::accept(stream, Some(peer), WebSocketConfig::default()).await?;
/// while let Some(msg) = conn.recv().await {
///     match msg? {
///         Message::Text(text) => conn.send(Message::text(text)).await?,
///         Message::Close(_) => break,
///         _ => {}
///     }
/// }
/// ```
pub struct Connection<S> {
    id: ConnectionId,
    role: Role,
    peer: Option<SocketAddr>,
    state: ConnectionState,
    stream: Option<S>,
    read_buf: BytesMut,
    codec: FrameCodec,
    config: WebSocketConfig,
    commands_tx: mpsc::Sender<Command>,
    commands_rx: mpsc::Receiver<Command>,
    shutdown: ShutdownSignal,
    abort: ShutdownSignal,
    connected_at: Instant,
    last_activity: Instant,
}

impl<S> fmt::Debug for Connection<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("peer", &self.peer)
            .field("state", &self.state)
            .field("buffered", &self.read_buf.len())
            .finish_non_exhaustive()
    }
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn new(stream: S, role: Role, peer: Option<SocketAddr>, config: WebSocketConfig) -> Self {
        let (commands_tx, commands_rx) = mpsc::channel(config.send_queue_size.max(1));
        let now = Instant::now();
        Self {
            id: ConnectionId::new(),
            role,
            peer,
            state: ConnectionState::Connecting,
            stream: Some(stream),
            read_buf: BytesMut::with_capacity(config.read_buffer_size),
            codec: FrameCodec::new(role).max_payload_size(config.max_frame_size),
            config,
            commands_tx,
            commands_rx,
            shutdown: ShutdownSignal::new(),
            abort: ShutdownSignal::new(),
            connected_at: now,
            last_activity: now,
        }
    }

    /// Run the server side of the handshake on an accepted transport.
    ///
    /// A malformed upgrade request is answered with `400 Bad Request`; the
    /// transport is released on any failure.
    pub async fn accept(
        stream: S,
        peer: Option<SocketAddr>,
        config: WebSocketConfig,
    ) -> WsResult<Self> {
        let mut conn = Self::new(stream, Role::Server, peer, config);
        let result = match conn.config.handshake_timeout {
            Some(limit) => tokio::time::timeout(limit, conn.server_handshake())
                .await
                .unwrap_or_else(|_| Err(HandshakeError::Timeout.into())),
            None => conn.server_handshake().await,
        };
        conn.finish_handshake(result).await
    }

    /// Run the client side of the handshake on a connected transport.
    pub async fn connect(
        stream: S,
        host: &str,
        port: u16,
        path: &str,
        config: WebSocketConfig,
    ) -> WsResult<Self> {
        let mut conn = Self::new(stream, Role::Client, None, config);
        let result = match conn.config.handshake_timeout {
            Some(limit) => tokio::time::timeout(limit, conn.client_handshake(host, port, path))
                .await
                .unwrap_or_else(|_| Err(HandshakeError::Timeout.into())),
            None => conn.client_handshake(host, port, path).await,
        };
        conn.finish_handshake(result).await
    }

    /// Attach the shutdown signal this connection listens to.
    pub fn with_shutdown(mut self, signal: ShutdownSignal) -> Self {
        self.shutdown = signal;
        self
    }

    /// Set the peer address reported in logs and handles.
    pub fn with_peer(mut self, peer: SocketAddr) -> Self {
        self.peer = Some(peer);
        self
    }

    async fn server_handshake(&mut self) -> WsResult<()> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| WsError::connection_closed(None, "transport released"))?;

        let response = match read_http_head(stream, &mut self.read_buf, self.config.max_handshake_size)
            .await
        {
            Ok(head) => accept_handshake(&head),
            Err(ReadHeadError::Handshake(e)) => Err(e),
            Err(ReadHeadError::Io(e)) => return Err(e.into()),
        };

        match response {
            Ok(response) => {
                stream.write_all(response.response.as_bytes()).await?;
                stream.flush().await?;
                Ok(())
            }
            Err(e) => {
                // Best effort: the peer may already be gone.
                let _ = stream.write_all(reject_response(&e.to_string()).as_bytes()).await;
                let _ = stream.flush().await;
                Err(e.into())
            }
        }
    }

    async fn client_handshake(&mut self, host: &str, port: u16, path: &str) -> WsResult<()> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| WsError::connection_closed(None, "transport released"))?;

        let handshake = build_handshake_request_with_key(host, port, path, generate_client_key());
        stream.write_all(handshake.request.as_bytes()).await?;
        stream.flush().await?;

        let head = read_http_head(stream, &mut self.read_buf, self.config.max_handshake_size).await?;
        verify_handshake_response(&head, &handshake.key)?;
        Ok(())
    }

    async fn finish_handshake(mut self, result: WsResult<()>) -> WsResult<Self> {
        match result {
            Ok(()) => {
                self.state = ConnectionState::Open;
                info!(
                    connection_id = %self.id,
                    peer = ?self.peer,
                    role = %self.role,
                    "WebSocket connection established"
                );
                Ok(self)
            }
            Err(e) => {
                warn!(connection_id = %self.id, peer = ?self.peer, error = %e, "handshake failed");
                self.release().await;
                Err(e)
            }
        }
    }

    /// Get the connection ID.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Get the peer address, if known.
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Which side of the connection this is.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether the transport has been released.
    pub fn is_released(&self) -> bool {
        self.stream.is_none()
    }

    /// Get when the connection was created.
    pub fn connected_at(&self) -> Instant {
        self.connected_at
    }

    /// Get the last time inbound bytes arrived.
    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    /// A cloneable handle for sending from other tasks.
    pub fn handle(&self) -> ConnectionHandle {
        ConnectionHandle {
            id: self.id,
            peer: self.peer,
            tx: self.commands_tx.clone(),
            abort: self.abort.clone(),
        }
    }

    /// Receive the next application message.
    ///
    /// Returns `None` once the connection is closed. Pings are answered
    /// before they are returned. A close frame from the peer is returned
    /// once; the transport is already released by then. Protocol violations
    /// close the connection with the matching status code and are returned
    /// as errors.
    #[instrument(skip(self), fields(connection_id = %self.id))]
    pub async fn recv(&mut self) -> Option<WsResult<Message>> {
        loop {
            if self.state != ConnectionState::Open {
                return None;
            }

            match self.codec.decode(&self.read_buf) {
                Ok(Decoded::Complete { frame, consumed }) => {
                    self.read_buf.advance(consumed);
                    return Some(self.dispatch(frame).await);
                }
                Ok(Decoded::NeedMoreData) => {}
                Err(e) => return Some(Err(self.fail(e).await)),
            }

            match self.next_event().await {
                Event::Read(Ok(0)) => {
                    debug!("peer closed the transport");
                    self.release().await;
                    return None;
                }
                Event::Read(Ok(n)) => {
                    trace!(bytes = n, buffered = self.read_buf.len(), "read from transport");
                    self.last_activity = Instant::now();
                }
                Event::Read(Err(e)) => {
                    warn!(error = %e, "transport read failed");
                    self.release().await;
                    return Some(Err(e.into()));
                }
                Event::Command(Some(Command::Send(message))) => {
                    if let Err(e) = self.send(message).await {
                        return Some(Err(e));
                    }
                }
                Event::Command(Some(Command::Disconnect { code, reason })) => {
                    self.disconnect(code, &reason).await;
                    return None;
                }
                Event::Command(None) => {}
                Event::Shutdown => {
                    self.disconnect(CloseCode::GoingAway, "shutting down").await;
                    return None;
                }
                Event::Aborted => {
                    warn!("connection aborted, peer is not keeping up");
                    self.release().await;
                    return Some(Err(WsError::send_failed("connection aborted")));
                }
                Event::Idle => {
                    warn!("idle timeout elapsed");
                    self.disconnect(CloseCode::PolicyViolation, "idle timeout").await;
                    return Some(Err(WsError::timeout("idle timeout elapsed")));
                }
            }
        }
    }

    async fn next_event(&mut self) -> Event {
        let Some(stream) = self.stream.as_mut() else {
            return Event::Read(Ok(0));
        };

        self.read_buf.reserve(self.config.read_buffer_size);
        let idle_deadline = self
            .config
            .idle_timeout
            .map(|timeout| tokio::time::Instant::from_std(self.last_activity) + timeout);

        tokio::select! {
            read = stream.read_buf(&mut self.read_buf) => Event::Read(read),
            command = self.commands_rx.recv() => Event::Command(command),
            () = self.shutdown.recv() => Event::Shutdown,
            () = self.abort.recv() => Event::Aborted,
            () = sleep_until(idle_deadline) => Event::Idle,
        }
    }

    async fn dispatch(&mut self, frame: Frame) -> WsResult<Message> {
        trace!(opcode = %frame.opcode, len = frame.payload.len(), "frame received");

        if let Err(e) = self.check_masking(&frame) {
            return Err(self.fail(e).await);
        }

        let message = match Message::try_from(frame) {
            Ok(message) => message,
            Err(e) => return Err(self.fail(e).await),
        };

        match &message {
            Message::Ping(payload) => {
                debug!(len = payload.len(), "received ping, sending pong");
                let pong = Frame::pong(Bytes::copy_from_slice(payload));
                if let Err(e) = self.write_frame(&pong).await {
                    self.release().await;
                    return Err(e);
                }
            }
            Message::Pong(payload) => {
                debug!(len = payload.len(), "received pong");
            }
            Message::Close(close) => {
                debug!(code = ?close.as_ref().map(|c| c.code), "received close frame");
                self.state = ConnectionState::Closing;
                if self.config.echo_close {
                    let reply = Frame::close(close.as_ref().map(|c| close_reply_code(c.code)), "");
                    if let Err(e) = self.write_frame(&reply).await {
                        debug!(error = %e, "failed to echo close frame");
                    }
                }
                self.release().await;
            }
            Message::Text(_) | Message::Binary(_) => {}
        }

        Ok(message)
    }

    fn check_masking(&self, frame: &Frame) -> Result<(), FrameError> {
        match self.role {
            Role::Server if !frame.masked && !self.config.accept_unmasked_frames => {
                Err(FrameError::UnmaskedClientFrame)
            }
            Role::Client if frame.masked => Err(FrameError::MaskedServerFrame),
            _ => Ok(()),
        }
    }

    /// Close after a protocol violation.
    async fn fail(&mut self, error: FrameError) -> WsError {
        let code = error.close_code();
        warn!(error = %error, code = code.as_u16(), "protocol violation, closing connection");
        self.disconnect(code, &error.to_string()).await;
        WsError::Frame(error)
    }

    /// Send an application message.
    ///
    /// Sending a close message is the same as calling
    /// [`disconnect`](Self::disconnect).
    #[instrument(skip(self, message), fields(connection_id = %self.id, opcode = %message.opcode()))]
    pub async fn send(&mut self, message: Message) -> WsResult<()> {
        if let Message::Close(close) = message {
            let (code, reason) = close.map_or((CloseCode::Normal, String::new()), |c| {
                (
                    CloseCode::from_u16(c.code).unwrap_or(CloseCode::Normal),
                    c.reason.into_owned(),
                )
            });
            self.disconnect(code, &reason).await;
            return Ok(());
        }
        self.send_frame(message.into_frame()).await
    }

    /// Send a text message.
    pub async fn send_text(&mut self, text: impl Into<String>) -> WsResult<()> {
        self.send(Message::text(text)).await
    }

    /// Send a binary message.
    pub async fn send_binary(&mut self, data: impl Into<Vec<u8>>) -> WsResult<()> {
        self.send(Message::binary(data)).await
    }

    /// Send a ping.
    pub async fn ping(&mut self, data: impl Into<Vec<u8>>) -> WsResult<()> {
        self.send(Message::ping(data)).await
    }

    /// Send a raw frame with any opcode.
    ///
    /// Only valid while open. A transport failure releases the connection.
    pub async fn send_frame(&mut self, frame: Frame) -> WsResult<()> {
        if self.state != ConnectionState::Open {
            return Err(WsError::connection_closed(
                None,
                format!("connection is {}", self.state),
            ));
        }

        if let Err(e) = self.write_frame(&frame).await {
            warn!(connection_id = %self.id, error = %e, "write failed, releasing transport");
            self.release().await;
            return Err(e);
        }
        Ok(())
    }

    /// Send a raw frame with the given opcode and payload.
    pub async fn send_opcode(&mut self, opcode: Opcode, payload: impl Into<Bytes>) -> WsResult<()> {
        self.send_frame(Frame::new(opcode, payload)).await
    }

    /// Close the connection.
    ///
    /// Sends a close frame if the connection is open, then releases the
    /// transport. Calling this again does nothing.
    pub async fn disconnect(&mut self, code: CloseCode, reason: &str) {
        if self.state == ConnectionState::Open {
            self.state = ConnectionState::Closing;
            debug!(connection_id = %self.id, code = code.as_u16(), reason, "sending close frame");
            let frame = Frame::close(Some(code.as_u16()), reason);
            if let Err(e) = self.write_frame(&frame).await {
                debug!(connection_id = %self.id, error = %e, "failed to send close frame");
            }
        }
        self.release().await;
    }

    async fn write_frame(&mut self, frame: &Frame) -> WsResult<()> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| WsError::connection_closed(None, "transport released"))?;

        let bytes = self.codec.encode(frame);
        trace!(opcode = %frame.opcode, len = frame.payload.len(), "writing frame");

        // A peer that stops reading blocks the write; an abort unblocks it.
        tokio::select! {
            result = async {
                stream.write_all(&bytes).await?;
                stream.flush().await
            } => Ok(result?),
            () = self.abort.recv() => Err(WsError::send_failed("connection aborted")),
        }
    }

    /// Shut down and drop the transport. Only the first call does anything.
    async fn release(&mut self) {
        self.state = ConnectionState::Closed;
        self.commands_rx.close();
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                debug!(connection_id = %self.id, error = %e, "transport shutdown failed");
            }
            info!(connection_id = %self.id, peer = ?self.peer, "WebSocket connection closed");
        }
    }
}

async fn sleep_until(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// A handle for sending messages to a connection from other tasks.
///
/// Messages are queued and written by the task that owns the
/// [`Connection`]. The queue holds
/// [`send_queue_size`](WebSocketConfig::send_queue_size) messages; a send
/// fails once it is full or the connection is closed.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    peer: Option<SocketAddr>,
    tx: mpsc::Sender<Command>,
    abort: ShutdownSignal,
}

impl ConnectionHandle {
    /// Get the connection ID.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Get the peer address, if known.
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Whether the owning connection has closed.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Queue a message without waiting.
    pub fn send(&self, message: Message) -> WsResult<()> {
        self.enqueue(Command::Send(message))
    }

    fn enqueue(&self, command: Command) -> WsResult<()> {
        self.tx.try_send(command).map_err(|e| match e {
            TrySendError::Full(_) => {
                WsError::send_failed(format!("connection {} send queue is full", self.id))
            }
            TrySendError::Closed(_) => {
                WsError::send_failed(format!("connection {} is closed", self.id))
            }
        })
    }

    /// Queue a text message.
    pub fn send_text(&self, text: impl Into<String>) -> WsResult<()> {
        self.send(Message::text(text))
    }

    /// Queue a binary message.
    pub fn send_binary(&self, data: impl Into<Vec<u8>>) -> WsResult<()> {
        self.send(Message::binary(data))
    }

    /// Queue a JSON-encoded text message.
    pub fn send_json<T: serde::Serialize>(&self, value: &T) -> WsResult<()> {
        self.send(Message::from_json(value)?)
    }

    /// Ask the owning task to close the connection.
    ///
    /// The request is queued behind earlier messages, so it fails like
    /// [`send`](Self::send) when the queue is full; use
    /// [`abort`](Self::abort) for a peer that has stopped reading.
    pub fn disconnect(&self, code: CloseCode, reason: impl Into<String>) -> WsResult<()> {
        self.enqueue(Command::Disconnect {
            code,
            reason: reason.into(),
        })
    }

    /// Drop the connection without a close handshake.
    ///
    /// Interrupts a write blocked on the peer, so it works even when the
    /// queue is full.
    pub fn abort(&self) {
        self.abort.trigger();
    }

    #[cfg(test)]
    pub(crate) fn test_pair(capacity: usize) -> (Self, mpsc::Receiver<Command>) {
        let (tx, rx) = mpsc::channel(capacity);
        let handle = Self {
            id: ConnectionId::new(),
            peer: None,
            tx,
            abort: ShutdownSignal::new(),
        };
        (handle, rx)
    }

    #[cfg(test)]
    pub(crate) fn is_aborted(&self) -> bool {
        self.abort.is_shutdown()
    }
}

/// The status to answer a peer's close with: its own code when that code may
/// appear on the wire, otherwise 1002.
fn close_reply_code(code: u16) -> u16 {
    let sendable = CloseCode::from_u16(code).is_some_and(CloseCode::is_sendable)
        || (3000..=4999).contains(&code);
    if sendable {
        code
    } else {
        CloseCode::Protocol.as_u16()
    }
}
