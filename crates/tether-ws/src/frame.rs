//! WebSocket frame codec (RFC 6455 section 5).
//!
//! The codec is a pure function pair over byte buffers: [`FrameCodec::decode`]
//! parses at most one frame from the front of a buffer without consuming it,
//! and [`FrameCodec::encode`] produces the wire bytes for a single frame.
//! Both drivers share it; the [`Role`] decides whether outgoing frames are
//! masked.
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
//! |N|V|V|V|       |S|             |   (if payload len==126/127)   |
//! | |1|2|3|       |K|             |                               |
//! +-+-+-+-+-------+-+-------------+ - - - - - - - - - - - - - - - +
//! |     Extended payload length continued, if payload len == 127  |
//! + - - - - - - - - - - - - - - - +-------------------------------+
//! |                               |Masking-key, if MASK set to 1  |
//! +-------------------------------+-------------------------------+
//! | Masking-key (continued)       |          Payload Data         |
//! +-------------------------------- - - - - - - - - - - - - - - - +
//! ```

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::FrameError;

const FIN_BIT: u8 = 0b1000_0000;
const RSV_BITS: u8 = 0b0111_0000;
const OPCODE_MASK: u8 = 0b0000_1111;
const MASK_BIT: u8 = 0b1000_0000;
const LENGTH_MASK: u8 = 0b0111_1111;

/// Largest payload a control frame may carry.
pub const MAX_CONTROL_PAYLOAD: usize = 125;

/// Default maximum payload size accepted by the decoder (16 MiB).
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Frame opcode.
///
/// Reserved values decode structurally so the connection can reject them
/// with a protocol-error close instead of failing inside the codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// Continuation of a fragmented message (0x0).
    Continuation,
    /// UTF-8 text data (0x1).
    Text,
    /// Binary data (0x2).
    Binary,
    /// Connection close (0x8).
    Close,
    /// Ping (0x9).
    Ping,
    /// Pong (0xA).
    Pong,
    /// Any of 0x3-0x7 or 0xB-0xF.
    Reserved(u8),
}

impl Opcode {
    /// Decode the low nibble of the first header byte.
    pub fn from_u8(value: u8) -> Self {
        match value & OPCODE_MASK {
            0x0 => Self::Continuation,
            0x1 => Self::Text,
            0x2 => Self::Binary,
            0x8 => Self::Close,
            0x9 => Self::Ping,
            0xA => Self::Pong,
            other => Self::Reserved(other),
        }
    }

    /// The raw 4-bit value.
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Continuation => 0x0,
            Self::Text => 0x1,
            Self::Binary => 0x2,
            Self::Close => 0x8,
            Self::Ping => 0x9,
            Self::Pong => 0xA,
            Self::Reserved(v) => v & OPCODE_MASK,
        }
    }

    /// Control opcodes have the high bit of the nibble set.
    pub fn is_control(self) -> bool {
        self.as_u8() & 0x8 != 0
    }

    /// Whether this is a reserved opcode.
    pub fn is_reserved(self) -> bool {
        matches!(self, Self::Reserved(_))
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Continuation => f.write_str("continuation"),
            Self::Text => f.write_str("text"),
            Self::Binary => f.write_str("binary"),
            Self::Close => f.write_str("close"),
            Self::Ping => f.write_str("ping"),
            Self::Pong => f.write_str("pong"),
            Self::Reserved(v) => write!(f, "reserved({v:#x})"),
        }
    }
}

/// Which end of the connection a codec serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Masks every outgoing frame.
    Client,
    /// Never masks outgoing frames.
    Server,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Client => f.write_str("client"),
            Self::Server => f.write_str("server"),
        }
    }
}

/// A single WebSocket frame.
///
/// `payload` always holds unmasked application bytes. `masked` and
/// `mask_key` describe how a decoded frame arrived on the wire. The encoder
/// does not read `masked`: whether a frame is masked on the way out is
/// decided by the codec's [`Role`], and a client codec only borrows
/// `mask_key` when one is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Final fragment flag.
    pub fin: bool,
    /// Frame opcode.
    pub opcode: Opcode,
    /// Whether the frame arrived masked. Ignored when encoding.
    pub masked: bool,
    /// Key the frame arrived masked with, or the key a client codec should use.
    pub mask_key: Option<[u8; 4]>,
    /// Unmasked payload.
    pub payload: Bytes,
}

impl Frame {
    /// Create a final, unmasked frame.
    pub fn new(opcode: Opcode, payload: impl Into<Bytes>) -> Self {
        Self {
            fin: true,
            opcode,
            masked: false,
            mask_key: None,
            payload: payload.into(),
        }
    }

    /// Create a text frame.
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(Opcode::Text, Bytes::from(text.into()))
    }

    /// Create a binary frame.
    pub fn binary(payload: impl Into<Bytes>) -> Self {
        Self::new(Opcode::Binary, payload)
    }

    /// Create a ping frame.
    pub fn ping(payload: impl Into<Bytes>) -> Self {
        Self::new(Opcode::Ping, payload)
    }

    /// Create a pong frame.
    pub fn pong(payload: impl Into<Bytes>) -> Self {
        Self::new(Opcode::Pong, payload)
    }

    /// Create a close frame. The reason is truncated so the payload fits in
    /// a control frame.
    pub fn close(code: Option<u16>, reason: &str) -> Self {
        let Some(code) = code else {
            return Self::new(Opcode::Close, Bytes::new());
        };

        let mut reason_len = reason.len().min(MAX_CONTROL_PAYLOAD - 2);
        while !reason.is_char_boundary(reason_len) {
            reason_len -= 1;
        }

        let mut payload = BytesMut::with_capacity(2 + reason_len);
        payload.put_u16(code);
        payload.put_slice(&reason.as_bytes()[..reason_len]);
        Self::new(Opcode::Close, payload.freeze())
    }

    /// Attach a masking key; client encoders use it instead of a random one
    /// and server encoders drop it.
    pub fn with_mask(mut self, key: [u8; 4]) -> Self {
        self.masked = true;
        self.mask_key = Some(key);
        self
    }

    /// Parse the status code and reason of a close frame payload.
    ///
    /// Returns `None` for an empty payload. A single byte cannot hold a
    /// status code and is rejected.
    pub fn close_payload(&self) -> Result<Option<(u16, String)>, FrameError> {
        match self.payload.len() {
            0 => Ok(None),
            1 => Err(FrameError::InvalidControlFrame(
                "close payload shorter than a status code",
            )),
            _ => {
                let code = u16::from_be_bytes([self.payload[0], self.payload[1]]);
                let reason = String::from_utf8_lossy(&self.payload[2..]).into_owned();
                Ok(Some((code, reason)))
            }
        }
    }
}

/// Outcome of a decode attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A whole frame was parsed from the first `consumed` bytes.
    Complete {
        /// The decoded frame.
        frame: Frame,
        /// Bytes of the buffer this frame occupied.
        consumed: usize,
    },
    /// The buffer holds only a prefix of a frame.
    NeedMoreData,
}

/// Stateless RFC 6455 frame encoder/decoder.
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    role: Role,
    max_payload_size: usize,
}

impl FrameCodec {
    /// Create a codec for the given role.
    pub fn new(role: Role) -> Self {
        Self {
            role,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
        }
    }

    /// Create a client-side codec.
    pub fn client() -> Self {
        Self::new(Role::Client)
    }

    /// Create a server-side codec.
    pub fn server() -> Self {
        Self::new(Role::Server)
    }

    /// Set the largest payload the decoder accepts.
    pub fn max_payload_size(mut self, size: usize) -> Self {
        self.max_payload_size = size;
        self
    }

    /// The role this codec encodes for.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Decode one frame from the front of `buf`.
    ///
    /// Never reads past the first frame and never mutates `buf`; the caller
    /// drops `consumed` bytes after a [`Decoded::Complete`].
    pub fn decode(&self, buf: &[u8]) -> Result<Decoded, FrameError> {
        if buf.len() < 2 {
            return Ok(Decoded::NeedMoreData);
        }

        let first = buf[0];
        let second = buf[1];

        if first & RSV_BITS != 0 {
            return Err(FrameError::ReservedBitsSet);
        }

        let fin = first & FIN_BIT != 0;
        let opcode = Opcode::from_u8(first);
        let masked = second & MASK_BIT != 0;
        let len7 = second & LENGTH_MASK;

        if opcode.is_control() && !opcode.is_reserved() {
            if !fin {
                return Err(FrameError::InvalidControlFrame("fragmented control frame"));
            }
            if usize::from(len7) > MAX_CONTROL_PAYLOAD {
                return Err(FrameError::InvalidControlFrame(
                    "control payload exceeds 125 bytes",
                ));
            }
        }

        let mut offset = 2;
        let payload_len = match len7 {
            126 => {
                let Some(bytes) = buf.get(offset..offset + 2) else {
                    return Ok(Decoded::NeedMoreData);
                };
                offset += 2;
                u64::from(u16::from_be_bytes([bytes[0], bytes[1]]))
            }
            127 => {
                let Some(bytes) = buf.get(offset..offset + 8) else {
                    return Ok(Decoded::NeedMoreData);
                };
                offset += 8;
                let mut raw = [0u8; 8];
                raw.copy_from_slice(bytes);
                let len = u64::from_be_bytes(raw);
                if len & (1 << 63) != 0 {
                    return Err(FrameError::LengthOverflow);
                }
                len
            }
            n => u64::from(n),
        };

        let payload_len = match usize::try_from(payload_len) {
            Ok(len) if len <= self.max_payload_size => len,
            _ => {
                return Err(FrameError::PayloadTooLarge {
                    size: payload_len,
                    max: self.max_payload_size,
                })
            }
        };

        let mask_key = if masked {
            let Some(bytes) = buf.get(offset..offset + 4) else {
                return Ok(Decoded::NeedMoreData);
            };
            offset += 4;
            Some([bytes[0], bytes[1], bytes[2], bytes[3]])
        } else {
            None
        };

        let Some(raw_payload) = buf.get(offset..offset + payload_len) else {
            return Ok(Decoded::NeedMoreData);
        };

        let mut payload = raw_payload.to_vec();
        if let Some(key) = mask_key {
            apply_mask(&mut payload, key);
        }

        Ok(Decoded::Complete {
            frame: Frame {
                fin,
                opcode,
                masked,
                mask_key,
                payload: Bytes::from(payload),
            },
            consumed: offset + payload_len,
        })
    }

    /// Encode a frame into a fresh buffer.
    pub fn encode(&self, frame: &Frame) -> Vec<u8> {
        let mut dst = BytesMut::with_capacity(frame.payload.len() + 14);
        self.encode_into(frame, &mut dst);
        dst.to_vec()
    }

    /// Append the wire form of `frame` to `dst`.
    ///
    /// Always sets FIN. Masking follows the codec's role, never
    /// `frame.masked`: server codecs drop any mask, client codecs mask with
    /// the frame's key or a fresh random one.
    pub fn encode_into(&self, frame: &Frame, dst: &mut BytesMut) {
        let mask_key = match self.role {
            Role::Server => None,
            Role::Client => Some(frame.mask_key.unwrap_or_else(generate_mask_key)),
        };

        let len = frame.payload.len();
        dst.reserve(len + 14);
        dst.put_u8(FIN_BIT | frame.opcode.as_u8());

        let mask_bit = if mask_key.is_some() { MASK_BIT } else { 0 };
        if len < 126 {
            dst.put_u8(mask_bit | len as u8);
        } else if let Ok(len16) = u16::try_from(len) {
            dst.put_u8(mask_bit | 126);
            dst.put_u16(len16);
        } else {
            dst.put_u8(mask_bit | 127);
            dst.put_u64(len as u64);
        }

        match mask_key {
            Some(key) => {
                dst.put_slice(&key);
                let start = dst.len();
                dst.put_slice(&frame.payload);
                apply_mask(&mut dst[start..], key);
            }
            None => dst.put_slice(&frame.payload),
        }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::server()
    }
}

/// XOR `payload` in place with the 4-byte masking key.
///
/// Applying the same key twice restores the original bytes.
pub fn apply_mask(payload: &mut [u8], key: [u8; 4]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= key[i % 4];
    }
}

fn generate_mask_key() -> [u8; 4] {
    rand::random()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_complete(codec: &FrameCodec, buf: &[u8]) -> (Frame, usize) {
        match codec.decode(buf).unwrap() {
            Decoded::Complete { frame, consumed } => (frame, consumed),
            Decoded::NeedMoreData => panic!("expected a complete frame"),
        }
    }

    #[test]
    fn test_opcode_from_u8() {
        assert_eq!(Opcode::from_u8(0x1), Opcode::Text);
        assert_eq!(Opcode::from_u8(0x8), Opcode::Close);
        assert_eq!(Opcode::from_u8(0xA), Opcode::Pong);
        assert_eq!(Opcode::from_u8(0x3), Opcode::Reserved(0x3));
        assert_eq!(Opcode::from_u8(0xB), Opcode::Reserved(0xB));
    }

    #[test]
    fn test_opcode_is_control() {
        assert!(Opcode::Close.is_control());
        assert!(Opcode::Ping.is_control());
        assert!(!Opcode::Text.is_control());
        assert!(!Opcode::Continuation.is_control());
    }

    #[test]
    fn test_apply_mask() {
        let key = [0x37, 0xfa, 0x21, 0x3d];
        let mut data = b"Hello".to_vec();
        apply_mask(&mut data, key);
        assert_eq!(data, [0x7f, 0x9f, 0x4d, 0x51, 0x58]);
        apply_mask(&mut data, key);
        assert_eq!(data, b"Hello");
    }

    #[test]
    fn test_decode_rfc_masked_hello() {
        // RFC 6455 section 5.7: single-frame masked text message.
        let wire = [
            0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58,
        ];
        let (frame, consumed) = decode_complete(&FrameCodec::server(), &wire);
        assert_eq!(consumed, wire.len());
        assert!(frame.fin);
        assert!(frame.masked);
        assert_eq!(frame.opcode, Opcode::Text);
        assert_eq!(frame.mask_key, Some([0x37, 0xfa, 0x21, 0x3d]));
        assert_eq!(&frame.payload[..], b"Hello");
    }

    #[test]
    fn test_server_encode_is_unmasked() {
        let wire = FrameCodec::server().encode(&Frame::text("Hello").with_mask([1, 2, 3, 4]));
        assert_eq!(wire, [0x81, 0x05, b'H', b'e', b'l', b'l', b'o']);
    }

    #[test]
    fn test_client_encode_uses_frame_key() {
        let frame = Frame::text("Hello").with_mask([0x37, 0xfa, 0x21, 0x3d]);
        let wire = FrameCodec::client().encode(&frame);
        assert_eq!(
            wire,
            [0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58]
        );
    }

    #[test]
    fn test_masked_flag_ignored_by_encoder() {
        let frame = Frame {
            masked: true,
            ..Frame::text("Hi")
        };
        assert_eq!(FrameCodec::server().encode(&frame), [0x81, 0x02, b'H', b'i']);

        let frame = Frame {
            masked: false,
            ..Frame::text("Hi")
        };
        let wire = FrameCodec::client().encode(&frame);
        assert_eq!(wire[1], MASK_BIT | 2);
        let (decoded, _) = decode_complete(&FrameCodec::server(), &wire);
        assert!(decoded.masked);
        assert!(decoded.mask_key.is_some());
        assert_eq!(&decoded.payload[..], b"Hi");
    }

    #[test]
    fn test_client_encode_generates_key() {
        let wire = FrameCodec::client().encode(&Frame::binary(vec![1u8, 2, 3]));
        assert_eq!(wire[1] & MASK_BIT, MASK_BIT);
        assert_eq!(wire.len(), 2 + 4 + 3);

        let (frame, _) = decode_complete(&FrameCodec::server(), &wire);
        assert_eq!(&frame.payload[..], &[1, 2, 3]);
    }

    #[test]
    fn test_payload_length_126() {
        let payload = vec![0xABu8; 300];
        let wire = FrameCodec::server().encode(&Frame::binary(payload.clone()));
        assert_eq!(wire[1], 126);
        assert_eq!(u16::from_be_bytes([wire[2], wire[3]]), 300);

        let (frame, consumed) = decode_complete(&FrameCodec::client(), &wire);
        assert_eq!(consumed, 4 + 300);
        assert_eq!(&frame.payload[..], &payload[..]);
    }

    #[test]
    fn test_payload_length_127() {
        let payload = vec![0x5Au8; 70_000];
        let wire = FrameCodec::server().encode(&Frame::binary(payload.clone()));
        assert_eq!(wire[1], 127);
        assert_eq!(wire.len(), 10 + 70_000);

        let (frame, _) = decode_complete(&FrameCodec::client(), &wire);
        assert_eq!(frame.payload.len(), 70_000);
    }

    #[test]
    fn test_partial_frame_needs_more_data() {
        let wire = FrameCodec::client().encode(&Frame::text("partial").with_mask([9, 8, 7, 6]));
        let codec = FrameCodec::server();
        for cut in 0..wire.len() {
            assert_eq!(codec.decode(&wire[..cut]).unwrap(), Decoded::NeedMoreData);
        }
    }

    #[test]
    fn test_decode_stops_at_first_frame() {
        let codec = FrameCodec::server();
        let mut wire = codec.encode(&Frame::text("one"));
        wire.extend(codec.encode(&Frame::text("two")));

        let (first, consumed) = decode_complete(&FrameCodec::client(), &wire);
        assert_eq!(&first.payload[..], b"one");
        let (second, _) = decode_complete(&FrameCodec::client(), &wire[consumed..]);
        assert_eq!(&second.payload[..], b"two");
    }

    #[test]
    fn test_reserved_opcode_decodes() {
        let wire = [0x83, 0x00];
        let (frame, consumed) = decode_complete(&FrameCodec::client(), &wire);
        assert_eq!(consumed, 2);
        assert_eq!(frame.opcode, Opcode::Reserved(0x3));
    }

    #[test]
    fn test_reserved_bits_rejected() {
        let wire = [0xC1, 0x00];
        assert_eq!(
            FrameCodec::client().decode(&wire),
            Err(FrameError::ReservedBitsSet)
        );
    }

    #[test]
    fn test_length_msb_rejected() {
        let mut wire = vec![0x82, 127];
        wire.extend_from_slice(&(1u64 << 63).to_be_bytes());
        assert_eq!(
            FrameCodec::client().decode(&wire),
            Err(FrameError::LengthOverflow)
        );
    }

    #[test]
    fn test_payload_too_large_rejected_early() {
        let codec = FrameCodec::client().max_payload_size(100);
        let mut wire = vec![0x82, 126];
        wire.extend_from_slice(&200u16.to_be_bytes());
        assert_eq!(
            codec.decode(&wire),
            Err(FrameError::PayloadTooLarge { size: 200, max: 100 })
        );
    }

    #[test]
    fn test_control_frame_too_large() {
        let wire = [0x89, 126, 0x00, 0x80];
        assert!(matches!(
            FrameCodec::client().decode(&wire),
            Err(FrameError::InvalidControlFrame(_))
        ));
    }

    #[test]
    fn test_fragmented_control_frame_rejected() {
        let wire = [0x09, 0x00];
        assert!(matches!(
            FrameCodec::client().decode(&wire),
            Err(FrameError::InvalidControlFrame(_))
        ));
    }

    #[test]
    fn test_empty_payload() {
        let wire = FrameCodec::server().encode(&Frame::ping(Bytes::new()));
        assert_eq!(wire, [0x89, 0x00]);
        let (frame, consumed) = decode_complete(&FrameCodec::client(), &wire);
        assert_eq!(consumed, 2);
        assert!(frame.payload.is_empty());
    }

    #[test]
    fn test_close_frame_payload() {
        let frame = Frame::close(Some(1000), "bye");
        assert_eq!(frame.close_payload(), Ok(Some((1000, "bye".to_string()))));
        assert_eq!(Frame::close(None, "ignored").close_payload(), Ok(None));
    }

    #[test]
    fn test_one_byte_close_payload_rejected() {
        let frame = Frame::new(Opcode::Close, vec![0x03]);
        assert!(matches!(
            frame.close_payload(),
            Err(FrameError::InvalidControlFrame(_))
        ));
    }

    #[test]
    fn test_close_reason_truncated_on_char_boundary() {
        let reason = "é".repeat(100);
        let frame = Frame::close(Some(1000), &reason);
        assert!(frame.payload.len() <= MAX_CONTROL_PAYLOAD);
        let (_, decoded) = frame.close_payload().unwrap().unwrap();
        assert!(reason.starts_with(&decoded));
    }
}
