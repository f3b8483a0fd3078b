//! Application callbacks for the server and client drivers.

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use crate::connection::{Connection, ConnectionHandle, ConnectionId};
use crate::message::Message;

/// Receives connection lifecycle events and data messages.
///
/// Callbacks run on the connection's own task. Replies go through the
/// [`ConnectionHandle`], which queues them for that task to write, so a
/// callback never blocks on the transport.
///
/// Any `Fn(&ConnectionHandle, Message)` closure is a handler that ignores
/// open and close events.
pub trait MessageHandler: Send + Sync + 'static {
    /// Called once the handshake has completed.
    fn on_open(&self, _conn: &ConnectionHandle) {}

    /// Called for every text or binary message.
    fn on_message(&self, conn: &ConnectionHandle, message: Message);

    /// Called after the transport has been released.
    fn on_close(&self, _id: ConnectionId) {}
}

impl<F> MessageHandler for F
where
    F: Fn(&ConnectionHandle, Message) + Send + Sync + 'static,
{
    fn on_message(&self, conn: &ConnectionHandle, message: Message) {
        self(conn, message);
    }
}

/// Feed a connection's messages to a handler until it closes.
///
/// The connection closes itself on protocol errors, so they are only logged.
pub(crate) async fn drive<S, H>(conn: &mut Connection<S>, handle: &ConnectionHandle, handler: &H)
where
    S: AsyncRead + AsyncWrite + Unpin,
    H: MessageHandler + ?Sized,
{
    while let Some(result) = conn.recv().await {
        match result {
            Ok(message) if message.is_data() => handler.on_message(handle, message),
            Ok(_) => {}
            Err(e) => debug!(connection_id = %conn.id(), error = %e, "connection error"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Command;

    #[test]
    fn test_closure_handler() {
        let handler = |conn: &ConnectionHandle, message: Message| {
            conn.send(message).unwrap();
        };

        let (handle, mut rx) = ConnectionHandle::test_pair(8);
        handler.on_open(&handle);
        handler.on_message(&handle, Message::text("echo"));
        handler.on_close(handle.id());

        match rx.try_recv().unwrap() {
            Command::Send(message) => assert_eq!(message, Message::text("echo")),
            Command::Disconnect { .. } => panic!("unexpected disconnect"),
        }
    }
}
