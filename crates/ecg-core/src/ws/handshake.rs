//! HTTP/1.1 upgrade handshake

use core::fmt::Write;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use heapless::String;
use sha1::{Digest, Sha1};
use thiserror_no_std::Error;

/// GUID appended to the client key before hashing (RFC 6455 section 1.3).
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Length of a base64 encoded SHA-1 digest.
pub const ACCEPT_KEY_LEN: usize = 28;

/// Capacity of the `101 Switching Protocols` response.
pub const RESPONSE_LEN: usize = 160;

/// The only protocol version this server speaks.
pub const WS_VERSION: &str = "13";

pub type AcceptKey = String<ACCEPT_KEY_LEN>;

const BAD_REQUEST: &[u8] =
    b"HTTP/1.1 400 Bad Request\r\nConnection: close\r\nContent-Length: 0\r\n\r\n";

const UPGRADE_REQUIRED: &[u8] = b"HTTP/1.1 426 Upgrade Required\r\n\
    Sec-WebSocket-Version: 13\r\n\
    Connection: close\r\n\
    Content-Length: 0\r\n\r\n";

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeError {
    #[error("malformed HTTP request")]
    Malformed,
    #[error("only GET requests can be upgraded")]
    MethodNotAllowed,
    #[error("missing or invalid `{0}` header")]
    MissingHeader(&'static str),
    #[error("unsupported WebSocket version")]
    UnsupportedVersion,
    #[error("request head exceeds {0} bytes")]
    TooLarge(usize),
}

impl HandshakeError {
    /// HTTP response sent before closing a rejected peer.
    pub fn rejection(&self) -> &'static [u8] {
        match self {
            Self::UnsupportedVersion => UPGRADE_REQUIRED,
            _ => BAD_REQUEST,
        }
    }
}

/// The parts of a valid upgrade request the server cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpgradeRequest<'a> {
    pub path: &'a str,
    pub key: &'a str,
}

/// Length of the request head including its blank line, once it is complete.
pub fn find_request_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4)
        .position(|window| window == b"\r\n\r\n")
        .map(|pos| pos + 4)
}

/// Validate a complete request head as a WebSocket upgrade.
pub fn parse_upgrade_request(head: &[u8]) -> Result<UpgradeRequest<'_>, HandshakeError> {
    let text = core::str::from_utf8(head).map_err(|_| HandshakeError::Malformed)?;
    let mut lines = text.split("\r\n");

    let mut request_line = lines
        .next()
        .ok_or(HandshakeError::Malformed)?
        .split(' ')
        .filter(|part| !part.is_empty());
    let (Some(method), Some(path), Some(version)) =
        (request_line.next(), request_line.next(), request_line.next())
    else {
        return Err(HandshakeError::Malformed);
    };
    if !version.starts_with("HTTP/1.1") {
        return Err(HandshakeError::Malformed);
    }
    if method != "GET" {
        return Err(HandshakeError::MethodNotAllowed);
    }

    let mut upgrade = false;
    let mut connection = false;
    let mut key = None;
    let mut ws_version = None;

    for line in lines.take_while(|line| !line.is_empty()) {
        let (name, value) = line.split_once(':').ok_or(HandshakeError::Malformed)?;
        let name = name.trim();
        let value = value.trim();

        if name.eq_ignore_ascii_case("upgrade") {
            upgrade = value.eq_ignore_ascii_case("websocket");
        } else if name.eq_ignore_ascii_case("connection") {
            connection = value
                .split(',')
                .any(|token| token.trim().eq_ignore_ascii_case("upgrade"));
        } else if name.eq_ignore_ascii_case("sec-websocket-key") {
            key = Some(value);
        } else if name.eq_ignore_ascii_case("sec-websocket-version") {
            ws_version = Some(value);
        }
    }

    if !upgrade {
        return Err(HandshakeError::MissingHeader("Upgrade"));
    }
    if !connection {
        return Err(HandshakeError::MissingHeader("Connection"));
    }
    if ws_version != Some(WS_VERSION) {
        return Err(HandshakeError::UnsupportedVersion);
    }
    let key = key
        .filter(|key| is_valid_key(key))
        .ok_or(HandshakeError::MissingHeader("Sec-WebSocket-Key"))?;

    Ok(UpgradeRequest { path, key })
}

/// A client key must be the base64 encoding of 16 bytes.
fn is_valid_key(key: &str) -> bool {
    let mut decoded = [0u8; 18];
    matches!(STANDARD.decode_slice(key, &mut decoded), Ok(16))
}

/// `Sec-WebSocket-Accept` value for a client key.
pub fn accept_key(key: &str) -> AcceptKey {
    let mut sha = Sha1::new();
    sha.update(key.as_bytes());
    sha.update(WS_GUID.as_bytes());
    let digest = sha.finalize();

    let mut encoded = [0u8; ACCEPT_KEY_LEN];
    let written = STANDARD.encode_slice(digest, &mut encoded).unwrap_or(0);

    let mut accept = AcceptKey::new();
    for &byte in &encoded[..written] {
        let _ = accept.push(char::from(byte));
    }
    accept
}

/// The `101 Switching Protocols` response completing the handshake.
pub fn switching_protocols(accept: &str) -> String<RESPONSE_LEN> {
    let mut response = String::new();
    let _ = write!(
        response,
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {}\r\n\r\n",
        accept
    );
    response
}
