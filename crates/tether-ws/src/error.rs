//! Error types for WebSocket operations.
//!
//! Errors are split by the layer that produces them:
//!
//! - [`HandshakeError`] - the opening HTTP upgrade exchange failed
//! - [`FrameError`] - a frame on the wire violates the protocol
//! - [`WsError`] - everything a connection, registry or driver can report,
//!   wrapping the two above and transport I/O errors
//!
//! A short read is not an error: the codec reports it as
//! [`Decoded::NeedMoreData`](crate::frame::Decoded::NeedMoreData).

use std::fmt;
use thiserror::Error;

/// Result type for WebSocket operations.
pub type WsResult<T> = Result<T, WsError>;

/// Errors raised while negotiating the opening handshake.
///
/// Every variant is fatal to the attempt: the connection never reaches
/// the open state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    /// The upgrade request carried no usable `Sec-WebSocket-Key` header.
    #[error("missing Sec-WebSocket-Key header")]
    MissingKey,

    /// The server answered with something other than `101`.
    #[error("unexpected handshake status line: {0}")]
    BadStatus(String),

    /// The server response carried no `Sec-WebSocket-Accept` header.
    #[error("missing Sec-WebSocket-Accept header")]
    MissingAccept,

    /// The accept key does not match the one derived from our key.
    #[error("Sec-WebSocket-Accept mismatch: expected {expected}, got {actual}")]
    KeyMismatch {
        /// The accept key derived locally.
        expected: String,
        /// The accept key the peer sent.
        actual: String,
    },

    /// The HTTP head grew past the configured limit without terminating.
    #[error("handshake head exceeds {0} bytes")]
    HeadTooLarge(usize),

    /// The peer closed the stream before the HTTP head was complete.
    #[error("connection closed during handshake")]
    Incomplete,

    /// The HTTP head is not valid UTF-8.
    #[error("handshake head is not valid UTF-8")]
    InvalidEncoding,

    /// The handshake did not finish within the configured timeout.
    #[error("handshake timed out")]
    Timeout,
}

/// Protocol violations detected while decoding or dispatching a frame.
///
/// All of these are fatal to the connection that produced them.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// A reserved opcode (0x3-0x7, 0xB-0xF).
    #[error("invalid opcode: {0:#x}")]
    InvalidOpcode(u8),

    /// A continuation frame; fragmented messages are not supported.
    #[error("continuation frames are not supported")]
    UnsupportedContinuation,

    /// A data frame with the FIN bit cleared.
    #[error("fragmented messages are not supported")]
    Fragmented,

    /// One of RSV1-RSV3 is set without a negotiated extension.
    #[error("reserved bits set without a negotiated extension")]
    ReservedBitsSet,

    /// A 64-bit length with the most significant bit set.
    #[error("payload length overflows 63 bits")]
    LengthOverflow,

    /// The declared payload exceeds the configured maximum.
    #[error("payload of {size} bytes exceeds maximum of {max} bytes")]
    PayloadTooLarge {
        /// Declared payload size.
        size: u64,
        /// Configured maximum.
        max: usize,
    },

    /// A control frame that is fragmented or longer than 125 bytes.
    #[error("invalid control frame: {0}")]
    InvalidControlFrame(&'static str),

    /// A client sent an unmasked frame to a server.
    #[error("client frame is not masked")]
    UnmaskedClientFrame,

    /// A server sent a masked frame to a client.
    #[error("server frame is masked")]
    MaskedServerFrame,

    /// A text frame whose payload is not UTF-8.
    #[error("text payload is not valid UTF-8")]
    InvalidUtf8,
}

impl FrameError {
    /// The close status code sent to the peer before dropping the connection.
    pub fn close_code(&self) -> CloseCode {
        match self {
            Self::UnsupportedContinuation | Self::Fragmented => CloseCode::Unsupported,
            Self::PayloadTooLarge { .. } => CloseCode::MessageTooBig,
            Self::InvalidUtf8 => CloseCode::InvalidPayload,
            Self::InvalidOpcode(_)
            | Self::ReservedBitsSet
            | Self::LengthOverflow
            | Self::InvalidControlFrame(_)
            | Self::UnmaskedClientFrame
            | Self::MaskedServerFrame => CloseCode::Protocol,
        }
    }
}

/// Errors that can occur during WebSocket operations.
#[derive(Debug, Error)]
pub enum WsError {
    /// The opening handshake failed.
    #[error("WebSocket handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    /// The peer violated the framing protocol.
    #[error("protocol error: {0}")]
    Frame(#[from] FrameError),

    /// The WebSocket connection was closed.
    #[error("connection closed: {reason}")]
    ConnectionClosed {
        /// Optional close code from the peer.
        code: Option<u16>,
        /// Reason for closing.
        reason: String,
    },

    /// Failed to queue a message for a connection.
    #[error("failed to send message: {0}")]
    SendFailed(String),

    /// The message payload could not be encoded.
    #[error("failed to encode message: {0}")]
    EncodeFailed(String),

    /// The message payload could not be decoded.
    #[error("failed to decode message: {0}")]
    DecodeFailed(String),

    /// Connection limit reached.
    #[error("connection limit reached: {0}")]
    ConnectionLimitReached(String),

    /// A connection with the same ID is already registered.
    #[error("connection already registered: {connection_id}")]
    AlreadyRegistered {
        /// The duplicate connection ID.
        connection_id: String,
    },

    /// Connection not found.
    #[error("connection not found: {connection_id}")]
    ConnectionNotFound {
        /// The ID of the connection that was not found.
        connection_id: String,
    },

    /// An operation did not complete in time.
    #[error("timed out: {0}")]
    Timeout(String),

    /// Transport I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl WsError {
    /// Create a new connection closed error.
    pub fn connection_closed(code: Option<u16>, reason: impl Into<String>) -> Self {
        Self::ConnectionClosed {
            code,
            reason: reason.into(),
        }
    }

    /// Create a new send failed error.
    pub fn send_failed(reason: impl Into<String>) -> Self {
        Self::SendFailed(reason.into())
    }

    /// Create a new connection limit reached error.
    pub fn connection_limit(reason: impl Into<String>) -> Self {
        Self::ConnectionLimitReached(reason.into())
    }

    /// Create a new already registered error.
    pub fn already_registered(connection_id: impl Into<String>) -> Self {
        Self::AlreadyRegistered {
            connection_id: connection_id.into(),
        }
    }

    /// Create a new connection not found error.
    pub fn connection_not_found(connection_id: impl Into<String>) -> Self {
        Self::ConnectionNotFound {
            connection_id: connection_id.into(),
        }
    }

    /// Create a new timeout error.
    pub fn timeout(reason: impl Into<String>) -> Self {
        Self::Timeout(reason.into())
    }

    /// Get the close code associated with this error, if any.
    pub fn close_code(&self) -> Option<u16> {
        match self {
            Self::ConnectionClosed { code, .. } => *code,
            Self::Frame(e) => Some(e.close_code().as_u16()),
            _ => None,
        }
    }

    /// Check if this error ends the connection that raised it.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Handshake(_)
                | Self::Frame(_)
                | Self::ConnectionClosed { .. }
                | Self::Io(_)
                | Self::Timeout(_)
        )
    }
}

/// Close code for WebSocket connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum CloseCode {
    /// Normal closure (1000).
    Normal = 1000,
    /// Going away (1001).
    GoingAway = 1001,
    /// Protocol error (1002).
    Protocol = 1002,
    /// Unsupported data (1003).
    Unsupported = 1003,
    /// No status received (1005).
    NoStatus = 1005,
    /// Abnormal closure (1006).
    Abnormal = 1006,
    /// Invalid payload data (1007).
    InvalidPayload = 1007,
    /// Policy violation (1008).
    PolicyViolation = 1008,
    /// Message too big (1009).
    MessageTooBig = 1009,
    /// Extension required (1010).
    ExtensionRequired = 1010,
    /// Internal error (1011).
    InternalError = 1011,
}

impl CloseCode {
    /// Convert from a u16 code.
    pub fn from_u16(code: u16) -> Option<Self> {
        match code {
            1000 => Some(Self::Normal),
            1001 => Some(Self::GoingAway),
            1002 => Some(Self::Protocol),
            1003 => Some(Self::Unsupported),
            1005 => Some(Self::NoStatus),
            1006 => Some(Self::Abnormal),
            1007 => Some(Self::InvalidPayload),
            1008 => Some(Self::PolicyViolation),
            1009 => Some(Self::MessageTooBig),
            1010 => Some(Self::ExtensionRequired),
            1011 => Some(Self::InternalError),
            _ => None,
        }
    }

    /// Get the u16 value of this close code.
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Whether this code may appear in a close frame on the wire.
    ///
    /// 1005 and 1006 are reserved for local reporting only.
    pub fn is_sendable(self) -> bool {
        !matches!(self, Self::NoStatus | Self::Abnormal)
    }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Normal => "Normal",
            Self::GoingAway => "GoingAway",
            Self::Protocol => "Protocol",
            Self::Unsupported => "Unsupported",
            Self::NoStatus => "NoStatus",
            Self::Abnormal => "Abnormal",
            Self::InvalidPayload => "InvalidPayload",
            Self::PolicyViolation => "PolicyViolation",
            Self::MessageTooBig => "MessageTooBig",
            Self::ExtensionRequired => "ExtensionRequired",
            Self::InternalError => "InternalError",
        };
        write!(f, "{} ({})", name, self.as_u16())
    }
}
