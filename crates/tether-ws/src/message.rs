//! Application-level WebSocket messages.
//!
//! A [`Message`] is what the connection hands to, and accepts from, the
//! application. Conversion to and from wire [`Frame`]s happens here so the
//! connection loop only deals with one type in each direction.

use std::borrow::Cow;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{CloseCode, FrameError, WsError, WsResult};
use crate::frame::{Frame, Opcode};

/// A WebSocket message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// A text message (UTF-8 encoded).
    Text(String),
    /// A binary message.
    Binary(Vec<u8>),
    /// A ping frame with optional payload.
    Ping(Vec<u8>),
    /// A pong frame with optional payload.
    Pong(Vec<u8>),
    /// A close frame with optional code and reason.
    Close(Option<CloseFrame>),
}

impl Message {
    /// Create a new text message.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Create a new binary message.
    pub fn binary(data: impl Into<Vec<u8>>) -> Self {
        Self::Binary(data.into())
    }

    /// Create a new ping message.
    pub fn ping(data: impl Into<Vec<u8>>) -> Self {
        Self::Ping(data.into())
    }

    /// Create a new pong message.
    pub fn pong(data: impl Into<Vec<u8>>) -> Self {
        Self::Pong(data.into())
    }

    /// Create a close message with a code and reason.
    pub fn close(code: CloseCode, reason: impl Into<String>) -> Self {
        Self::Close(Some(CloseFrame::new(code, reason)))
    }

    /// The opcode this message travels under.
    pub fn opcode(&self) -> Opcode {
        match self {
            Self::Text(_) => Opcode::Text,
            Self::Binary(_) => Opcode::Binary,
            Self::Ping(_) => Opcode::Ping,
            Self::Pong(_) => Opcode::Pong,
            Self::Close(_) => Opcode::Close,
        }
    }

    /// Check if this is a close message.
    pub fn is_close(&self) -> bool {
        matches!(self, Self::Close(_))
    }

    /// Check if this is a data message (text or binary).
    pub fn is_data(&self) -> bool {
        matches!(self, Self::Text(_) | Self::Binary(_))
    }

    /// Get the message payload as text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get the message payload as bytes. `None` for close messages.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Text(s) => Some(s.as_bytes()),
            Self::Binary(b) | Self::Ping(b) | Self::Pong(b) => Some(b),
            Self::Close(_) => None,
        }
    }

    /// Consume the message and return its payload bytes.
    ///
    /// A close message yields its wire payload: the big-endian status code
    /// followed by the reason, or nothing when it carries no status.
    pub fn into_payload(self) -> Vec<u8> {
        match self {
            Self::Text(s) => s.into_bytes(),
            Self::Binary(b) | Self::Ping(b) | Self::Pong(b) => b,
            close @ Self::Close(_) => close.into_frame().payload.to_vec(),
        }
    }

    /// Get the close frame if this is a close message.
    pub fn close_frame(&self) -> Option<&CloseFrame> {
        match self {
            Self::Close(frame) => frame.as_ref(),
            _ => None,
        }
    }

    /// Try to parse the text message as JSON.
    pub fn json<T: for<'de> Deserialize<'de>>(&self) -> WsResult<T> {
        let text = self
            .as_text()
            .ok_or_else(|| WsError::DecodeFailed("not a text message".to_string()))?;
        serde_json::from_str(text).map_err(|e| WsError::DecodeFailed(e.to_string()))
    }

    /// Create a text message from a JSON-serializable value.
    pub fn from_json<T: Serialize>(value: &T) -> WsResult<Self> {
        let text =
            serde_json::to_string(value).map_err(|e| WsError::EncodeFailed(e.to_string()))?;
        Ok(Self::Text(text))
    }

    /// Length of the payload on the wire.
    pub fn len(&self) -> usize {
        match self {
            Self::Text(s) => s.len(),
            Self::Binary(b) | Self::Ping(b) | Self::Pong(b) => b.len(),
            Self::Close(Some(frame)) => 2 + frame.reason.len(),
            Self::Close(None) => 0,
        }
    }

    /// Check if the message payload is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Build the frame that carries this message.
    pub fn into_frame(self) -> Frame {
        match self {
            Self::Text(s) => Frame::text(s),
            Self::Binary(b) => Frame::binary(b),
            Self::Ping(b) => Frame::ping(b),
            Self::Pong(b) => Frame::pong(b),
            Self::Close(None) => Frame::close(None, ""),
            Self::Close(Some(close)) => Frame::close(Some(close.code), &close.reason),
        }
    }
}

impl TryFrom<Frame> for Message {
    type Error = FrameError;

    /// Interpret a decoded frame. Continuation, fragmented and reserved
    /// frames have no message form.
    fn try_from(frame: Frame) -> Result<Self, Self::Error> {
        if !frame.fin && !frame.opcode.is_control() {
            return Err(FrameError::Fragmented);
        }

        match frame.opcode {
            Opcode::Text => String::from_utf8(frame.payload.to_vec())
                .map(Self::Text)
                .map_err(|_| FrameError::InvalidUtf8),
            Opcode::Binary => Ok(Self::Binary(frame.payload.to_vec())),
            Opcode::Ping => Ok(Self::Ping(frame.payload.to_vec())),
            Opcode::Pong => Ok(Self::Pong(frame.payload.to_vec())),
            Opcode::Close => Ok(Self::Close(frame.close_payload()?.map(
                |(code, reason)| CloseFrame {
                    code,
                    reason: Cow::Owned(reason),
                },
            ))),
            Opcode::Continuation => Err(FrameError::UnsupportedContinuation),
            Opcode::Reserved(raw) => Err(FrameError::InvalidOpcode(raw)),
        }
    }
}

impl From<String> for Message {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for Message {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<Vec<u8>> for Message {
    fn from(b: Vec<u8>) -> Self {
        Self::Binary(b)
    }
}

impl From<Bytes> for Message {
    fn from(b: Bytes) -> Self {
        Self::Binary(b.to_vec())
    }
}

/// A WebSocket close frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    /// The close code.
    pub code: u16,
    /// The close reason.
    pub reason: Cow<'static, str>,
}

impl CloseFrame {
    /// Create a new close frame.
    pub fn new(code: CloseCode, reason: impl Into<String>) -> Self {
        Self {
            code: code.as_u16(),
            reason: Cow::Owned(reason.into()),
        }
    }

    /// Create a normal close frame.
    pub fn normal(reason: impl Into<String>) -> Self {
        Self::new(CloseCode::Normal, reason)
    }

    /// Create a close frame for going away.
    pub fn going_away(reason: impl Into<String>) -> Self {
        Self::new(CloseCode::GoingAway, reason)
    }

    /// Get the close code enum value if it's a standard code.
    pub fn close_code(&self) -> Option<CloseCode> {
        CloseCode::from_u16(self.code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_text() {
        let msg = Message::text("hello");
        assert!(msg.is_data());
        assert_eq!(msg.opcode(), Opcode::Text);
        assert_eq!(msg.as_text(), Some("hello"));
        assert_eq!(msg.len(), 5);
    }

    #[test]
    fn test_message_close() {
        let msg = Message::close(CloseCode::Normal, "goodbye");
        assert!(msg.is_close());
        let frame = msg.close_frame().unwrap();
        assert_eq!(frame.code, 1000);
        assert_eq!(frame.reason, "goodbye");
    }

    #[test]
    fn test_message_into_payload() {
        assert_eq!(Message::text("héllo").into_payload(), "héllo".as_bytes());
        assert_eq!(Message::binary(vec![1u8, 2]).into_payload(), vec![1, 2]);
        assert_eq!(Message::ping(b"p".to_vec()).into_payload(), b"p");
        assert_eq!(Message::pong(Vec::new()).into_payload(), Vec::<u8>::new());
        assert_eq!(
            Message::close(CloseCode::GoingAway, "bye").into_payload(),
            vec![0x03, 0xE9, b'b', b'y', b'e']
        );
        assert!(Message::Close(None).into_payload().is_empty());
    }

    #[test]
    fn test_message_json() {
        #[derive(Serialize, Deserialize, Debug, PartialEq)]
        struct Drive {
            left: i32,
            right: i32,
        }

        let drive = Drive { left: 40, right: -40 };
        let msg = Message::from_json(&drive).unwrap();
        assert_eq!(msg.opcode(), Opcode::Text);

        let parsed: Drive = msg.json().unwrap();
        assert_eq!(parsed, drive);
    }

    #[test]
    fn test_json_on_binary_fails() {
        let msg = Message::binary(vec![1u8, 2]);
        assert!(matches!(
            msg.json::<serde_json::Value>(),
            Err(WsError::DecodeFailed(_))
        ));
    }

    #[test]
    fn test_frame_to_message() {
        let msg = Message::try_from(Frame::text("hi")).unwrap();
        assert_eq!(msg, Message::text("hi"));

        let msg = Message::try_from(Frame::ping(vec![7u8])).unwrap();
        assert_eq!(msg, Message::ping(vec![7]));
    }

    #[test]
    fn test_close_frame_to_message() {
        let msg = Message::try_from(Frame::close(Some(1001), "restart")).unwrap();
        assert_eq!(msg, Message::close(CloseCode::GoingAway, "restart"));

        let msg = Message::try_from(Frame::close(None, "")).unwrap();
        assert_eq!(msg, Message::Close(None));
    }

    #[test]
    fn test_invalid_utf8_text_rejected() {
        let frame = Frame::new(Opcode::Text, vec![0xffu8, 0xfe]);
        assert_eq!(Message::try_from(frame), Err(FrameError::InvalidUtf8));
    }

    #[test]
    fn test_reserved_and_continuation_rejected() {
        let frame = Frame::new(Opcode::Reserved(0x5), Bytes::new());
        assert_eq!(Message::try_from(frame), Err(FrameError::InvalidOpcode(0x5)));

        let frame = Frame::new(Opcode::Continuation, Bytes::new());
        assert_eq!(
            Message::try_from(frame),
            Err(FrameError::UnsupportedContinuation)
        );
    }

    #[test]
    fn test_fragmented_data_rejected() {
        let mut frame = Frame::text("part");
        frame.fin = false;
        assert_eq!(Message::try_from(frame), Err(FrameError::Fragmented));
    }

    #[test]
    fn test_message_into_frame() {
        let frame = Message::close(CloseCode::Normal, "done").into_frame();
        assert_eq!(frame.opcode, Opcode::Close);
        assert_eq!(frame.close_payload(), Ok(Some((1000, "done".to_string()))));
    }
}
