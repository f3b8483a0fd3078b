//! Opening handshake (RFC 6455 section 4).
//!
//! Both sides of the HTTP/1.1 upgrade exchange live here as plain text
//! transformations, plus [`read_http_head`], which pulls the head off a
//! transport while keeping any bytes that follow it for the frame decoder.

use base64::Engine;
use bytes::BytesMut;
use sha1::{Digest, Sha1};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::HandshakeError;

/// The WebSocket magic GUID used in the handshake.
pub const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Default cap on the size of an HTTP request or response head.
pub const DEFAULT_MAX_HEAD_SIZE: usize = 8 * 1024;

const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Derive `Sec-WebSocket-Accept` from a `Sec-WebSocket-Key`.
pub fn compute_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    let result = hasher.finalize();
    base64::engine::general_purpose::STANDARD.encode(result)
}

/// Server answer to a valid upgrade request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeResponse {
    /// The derived accept key.
    pub accept_key: String,
    /// Full response text, ready to write to the transport.
    pub response: String,
}

/// Client upgrade request together with the key it carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientHandshake {
    /// Full request text, ready to write to the transport.
    pub request: String,
    /// The base64 `Sec-WebSocket-Key` sent in the request.
    pub key: String,
}

/// Look up a header value by case-insensitive name.
///
/// The first line of `head` is the request or status line and is skipped.
pub fn header_value<'a>(head: &'a str, name: &str) -> Option<&'a str> {
    head.split("\r\n")
        .skip(1)
        .take_while(|line| !line.is_empty())
        .filter_map(|line| line.split_once(':'))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case(name))
        .map(|(_, value)| value.trim())
}

/// Validate an upgrade request and build the `101` response.
pub fn accept_handshake(request: &str) -> Result<HandshakeResponse, HandshakeError> {
    let key = header_value(request, "Sec-WebSocket-Key")
        .filter(|key| !key.is_empty())
        .ok_or(HandshakeError::MissingKey)?;

    let accept_key = compute_accept_key(key);
    let response = format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {accept_key}\r\n\
         \r\n"
    );

    Ok(HandshakeResponse {
        accept_key,
        response,
    })
}

/// A `400 Bad Request` reply for a failed upgrade.
pub fn reject_response(reason: &str) -> String {
    format!(
        "HTTP/1.1 400 Bad Request\r\n\
         Content-Type: text/plain\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {reason}",
        reason.len()
    )
}

/// Generate a fresh `Sec-WebSocket-Key`: 16 random bytes, base64 encoded.
pub fn generate_client_key() -> String {
    let nonce: [u8; 16] = rand::random();
    base64::engine::general_purpose::STANDARD.encode(nonce)
}

/// Build an upgrade request for `/` with a random key.
pub fn build_handshake_request(host: &str, port: u16) -> ClientHandshake {
    build_handshake_request_with_key(host, port, "/", generate_client_key())
}

/// Build an upgrade request with an explicit path and key.
pub fn build_handshake_request_with_key(
    host: &str,
    port: u16,
    path: &str,
    key: String,
) -> ClientHandshake {
    let request = format!(
        "GET {path} HTTP/1.1\r\n\
         Host: {host}:{port}\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Key: {key}\r\n\
         Sec-WebSocket-Version: 13\r\n\
         \r\n"
    );
    ClientHandshake { request, key }
}

/// Check a server response against the key we sent.
///
/// The status line must be `HTTP/1.1 101` and `Sec-WebSocket-Accept` must
/// equal the accept key derived from `key`.
pub fn verify_handshake_response(response: &str, key: &str) -> Result<(), HandshakeError> {
    let status_line = response.split("\r\n").next().unwrap_or_default();
    let mut parts = status_line.split_whitespace();
    let version = parts.next().unwrap_or_default();
    let status = parts.next().unwrap_or_default();
    if version != "HTTP/1.1" || status != "101" {
        return Err(HandshakeError::BadStatus(status_line.to_string()));
    }

    let actual = header_value(response, "Sec-WebSocket-Accept").ok_or(HandshakeError::MissingAccept)?;
    let expected = compute_accept_key(key);
    if actual != expected {
        return Err(HandshakeError::KeyMismatch {
            expected,
            actual: actual.to_string(),
        });
    }

    Ok(())
}

/// Read an HTTP head from `reader` into `buf`.
///
/// Returns the head text up to and including the blank line. Whatever the
/// peer sent after it stays in `buf` and belongs to the frame stream.
pub async fn read_http_head<R>(
    reader: &mut R,
    buf: &mut BytesMut,
    max_size: usize,
) -> Result<String, ReadHeadError>
where
    R: AsyncRead + Unpin,
{
    let mut searched: usize = 0;
    loop {
        let window_start = searched.saturating_sub(HEAD_TERMINATOR.len() - 1);
        if let Some(pos) = buf[window_start..]
            .windows(HEAD_TERMINATOR.len())
            .position(|w| w == HEAD_TERMINATOR)
        {
            let end = window_start + pos + HEAD_TERMINATOR.len();
            let head = buf.split_to(end);
            return String::from_utf8(head.to_vec())
                .map_err(|_| ReadHeadError::Handshake(HandshakeError::InvalidEncoding));
        }
        searched = buf.len();

        if buf.len() >= max_size {
            return Err(ReadHeadError::Handshake(HandshakeError::HeadTooLarge(
                max_size,
            )));
        }

        if reader.read_buf(buf).await? == 0 {
            return Err(ReadHeadError::Handshake(HandshakeError::Incomplete));
        }
    }
}

/// Failure while reading an HTTP head off a transport.
#[derive(Debug, thiserror::Error)]
pub enum ReadHeadError {
    /// The head itself is unacceptable.
    #[error(transparent)]
    Handshake(#[from] HandshakeError),
    /// The transport failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<ReadHeadError> for crate::error::WsError {
    fn from(err: ReadHeadError) -> Self {
        match err {
            ReadHeadError::Handshake(e) => Self::Handshake(e),
            ReadHeadError::Io(e) => Self::Io(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_KEY: &str = "dGhlIHNhbXBsZSBub25jZQ==";
    const SAMPLE_ACCEPT: &str = "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=";

    fn sample_request(key_header: &str) -> String {
        format!(
            "GET /chat HTTP/1.1\r\n\
             Host: server.example.com\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             {key_header}\r\n\
             Sec-WebSocket-Version: 13\r\n\
             \r\n"
        )
    }

    #[test]
    fn test_compute_accept_key() {
        assert_eq!(compute_accept_key(SAMPLE_KEY), SAMPLE_ACCEPT);
    }

    #[test]
    fn test_accept_handshake_exact_response() {
        let request = sample_request(&format!("Sec-WebSocket-Key: {SAMPLE_KEY}"));
        let response = accept_handshake(&request).unwrap();
        assert_eq!(response.accept_key, SAMPLE_ACCEPT);
        assert_eq!(
            response.response,
            "HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n\r\n"
        );
    }

    #[test]
    fn test_accept_handshake_header_name_case_insensitive() {
        let request = sample_request(&format!("sec-websocket-key:   {SAMPLE_KEY}  "));
        let response = accept_handshake(&request).unwrap();
        assert_eq!(response.accept_key, SAMPLE_ACCEPT);
    }

    #[test]
    fn test_accept_handshake_missing_key() {
        let request = sample_request("X-Other: value");
        assert_eq!(accept_handshake(&request), Err(HandshakeError::MissingKey));
    }

    #[test]
    fn test_accept_handshake_empty_key() {
        let request = sample_request("Sec-WebSocket-Key: ");
        assert_eq!(accept_handshake(&request), Err(HandshakeError::MissingKey));
    }

    #[test]
    fn test_reject_response() {
        let response = reject_response("missing key");
        assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(response.contains("Content-Length: 11\r\n"));
        assert!(response.ends_with("\r\n\r\nmissing key"));
    }

    #[test]
    fn test_build_handshake_request() {
        let handshake = build_handshake_request("localhost", 8080);
        assert!(handshake.request.starts_with("GET / HTTP/1.1\r\n"));
        assert!(handshake.request.contains("Host: localhost:8080\r\n"));
        assert!(handshake.request.contains("Sec-WebSocket-Version: 13\r\n"));
        assert_eq!(
            header_value(&handshake.request, "Sec-WebSocket-Key"),
            Some(handshake.key.as_str())
        );

        let decoded = base64::engine::general_purpose::STANDARD
            .decode(&handshake.key)
            .unwrap();
        assert_eq!(decoded.len(), 16);
    }

    #[test]
    fn test_client_keys_are_random() {
        assert_ne!(generate_client_key(), generate_client_key());
    }

    #[test]
    fn test_server_response_verifies_on_client() {
        let handshake = build_handshake_request("robot.local", 8081);
        let response = accept_handshake(&handshake.request).unwrap();
        assert!(verify_handshake_response(&response.response, &handshake.key).is_ok());
    }

    #[test]
    fn test_verify_bad_status() {
        let response = "HTTP/1.1 200 OK\r\n\r\n";
        assert!(matches!(
            verify_handshake_response(response, SAMPLE_KEY),
            Err(HandshakeError::BadStatus(_))
        ));
    }

    #[test]
    fn test_verify_missing_accept() {
        let response = "HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\n\r\n";
        assert_eq!(
            verify_handshake_response(response, SAMPLE_KEY),
            Err(HandshakeError::MissingAccept)
        );
    }

    #[test]
    fn test_verify_key_mismatch() {
        let response =
            "HTTP/1.1 101 Switching Protocols\r\nSec-WebSocket-Accept: bm90IHRoZSBrZXk=\r\n\r\n";
        assert!(matches!(
            verify_handshake_response(response, SAMPLE_KEY),
            Err(HandshakeError::KeyMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_read_http_head_keeps_leftover_bytes() {
        let mut input: &[u8] = b"GET / HTTP/1.1\r\nHost: a\r\n\r\n\x81\x00";
        let mut buf = BytesMut::new();
        let head = read_http_head(&mut input, &mut buf, DEFAULT_MAX_HEAD_SIZE)
            .await
            .unwrap();
        assert_eq!(head, "GET / HTTP/1.1\r\nHost: a\r\n\r\n");
        assert_eq!(&buf[..], b"\x81\x00");
    }

    #[tokio::test]
    async fn test_read_http_head_across_reads() {
        // The terminator is split across every read.
        let mut mock = tokio_test::io::Builder::new()
            .read(b"GET / HTTP/1.1\r")
            .read(b"\nHost: a\r\n\r")
            .read(b"\n\x89")
            .build();

        let mut buf = BytesMut::new();
        let head = read_http_head(&mut mock, &mut buf, DEFAULT_MAX_HEAD_SIZE)
            .await
            .unwrap();
        assert_eq!(head, "GET / HTTP/1.1\r\nHost: a\r\n\r\n");
        assert_eq!(&buf[..], b"\x89");
    }

    #[tokio::test]
    async fn test_read_http_head_eof() {
        let mut input: &[u8] = b"GET / HTTP/1.1\r\n";
        let mut buf = BytesMut::new();
        let err = read_http_head(&mut input, &mut buf, DEFAULT_MAX_HEAD_SIZE)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ReadHeadError::Handshake(HandshakeError::Incomplete)
        ));
    }

    #[tokio::test]
    async fn test_read_http_head_too_large() {
        let big = vec![b'a'; 100];
        let mut input: &[u8] = &big;
        let mut buf = BytesMut::new();
        let err = read_http_head(&mut input, &mut buf, 32).await.unwrap_err();
        assert!(matches!(
            err,
            ReadHeadError::Handshake(HandshakeError::HeadTooLarge(32))
        ));
    }
}
