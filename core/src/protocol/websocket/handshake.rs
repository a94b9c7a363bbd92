/*
 * handshake.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Spoletta, a low-allocation socket toolkit.
 *
 * This file is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This file is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this file.  If not, see <http://www.gnu.org/licenses/>.
 */

//! WebSocket opening handshake (RFC 6455 §4): GET with Upgrade, then scan the
//! server's 101 response for the three upgrade headers.

use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tracing::{debug, trace};

use crate::buffer::ByteCursor;
use crate::client::SocketClient;
use crate::error::{Error, Result};
use crate::socket::Transfer;

/// Magic string for Sec-WebSocket-Accept (RFC 6455 §4.2.2).
const WS_ACCEPT_MAGIC: &[u8] = b"258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Status line prefix every successful upgrade starts with.
const SWITCHING_PROTOCOLS: &[u8] = b"HTTP/1.1 101";

const UPGRADE_HEADER: &[u8] = b"upgrade: websocket";
const CONNECTION_HEADER: &[u8] = b"connection: upgrade";
const ACCEPT_HEADER: &[u8] = b"sec-websocket-accept";
const ALL_HEADERS: u8 = 0b111;

pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Outcome of a handshake attempt.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    #[error("Handshake matched")]
    Matched,
    #[error("IO error while sending handshake to server")]
    InvalidWrite,
    #[error("IO error while reading handshake from the server")]
    InvalidRead,
    #[error("Handshake is being sent in multiple packets")]
    Incomplete,
    #[error("An invalid protocol was sent by the server")]
    InvalidProtocol,
    #[error("The handshake attempt expired")]
    Timeout,
    #[error("Unknown error occurred during the handshake")]
    Unknown,
}

impl HandshakeState {
    /// Human-readable description.
    pub fn description(self) -> String {
        self.to_string()
    }
}

/// Random 16-byte nonce, base64-encoded, for Sec-WebSocket-Key.
pub fn generate_key() -> Result<String> {
    let mut nonce = [0u8; 16];
    getrandom::getrandom(&mut nonce)
        .map_err(|e| Error::protocol(format!("random source failed: {}", e)))?;
    Ok(BASE64.encode(nonce))
}

/// Build the HTTP GET request for the handshake. An empty path becomes "/".
pub fn build_handshake_request(host: &str, path: &str, key: &str) -> Vec<u8> {
    let path = if path.is_empty() { "/" } else { path };
    let mut req = Vec::with_capacity(160 + host.len() + path.len());
    req.extend_from_slice(b"GET ");
    req.extend_from_slice(path.as_bytes());
    req.extend_from_slice(b" HTTP/1.1\r\nHost: ");
    req.extend_from_slice(host.as_bytes());
    req.extend_from_slice(b"\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Key: ");
    req.extend_from_slice(key.as_bytes());
    req.extend_from_slice(b"\r\nSec-WebSocket-Version: 13\r\n\r\n");
    req
}

/// Handshake request with a freshly generated key.
pub fn create_handshake(host: &str, path: &str) -> Result<Vec<u8>> {
    Ok(build_handshake_request(host, path, &generate_key()?))
}

/// Sec-WebSocket-Accept for a key: base64(SHA-1(key + magic)).
pub fn compute_accept(key: &str) -> String {
    use sha1::{Digest, Sha1};
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_ACCEPT_MAGIC);
    BASE64.encode(hasher.finalize())
}

fn contains_ignore_case(line: &[u8], needle: &[u8]) -> bool {
    line.len() >= needle.len()
        && line
            .windows(needle.len())
            .any(|w| w.eq_ignore_ascii_case(needle))
}

/// Scan `buffer.readable()` for a complete 101 response. On `Matched` the
/// position is advanced past the blank line ending the response; otherwise it
/// is left untouched.
pub fn parse_handshake(buffer: &mut ByteCursor) -> HandshakeState {
    let data = buffer.readable();
    let prefix = data.len().min(SWITCHING_PROTOCOLS.len());
    if data[..prefix] != SWITCHING_PROTOCOLS[..prefix] {
        return HandshakeState::InvalidProtocol;
    }
    if prefix < SWITCHING_PROTOCOLS.len() {
        return HandshakeState::Incomplete;
    }
    let mut index = match data[prefix..].iter().position(|&b| b == b'\n') {
        Some(i) => prefix + i + 1,
        None => return HandshakeState::Incomplete,
    };
    let mut headers = 0u8;
    while let Some(i) = data[index..].iter().position(|&b| b == b'\n') {
        let line = &data[index..index + i];
        index += i + 1;
        if line.is_empty() || line == b"\r" {
            if headers == ALL_HEADERS {
                buffer.advance_position(index);
                return HandshakeState::Matched;
            }
            return HandshakeState::Incomplete;
        }
        if contains_ignore_case(line, UPGRADE_HEADER) {
            headers |= 0b001;
        } else if contains_ignore_case(line, CONNECTION_HEADER) {
            headers |= 0b010;
        } else if contains_ignore_case(line, ACCEPT_HEADER) {
            headers |= 0b100;
        }
    }
    HandshakeState::Incomplete
}

/// Drives the opening handshake over a connected, blocking socket client.
#[derive(Debug, Clone)]
pub struct HandshakeHandler {
    timeout: Duration,
}

impl Default for HandshakeHandler {
    fn default() -> Self {
        Self::new(DEFAULT_HANDSHAKE_TIMEOUT)
    }
}

impl HandshakeHandler {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send the request and read until the response is matched, fails or
    /// the deadline passes. Bytes after the response stay in the read buffer.
    ///
    /// Blocking reads are bounded by the time left before the deadline; the
    /// socket has no read timeout once the attempt returns.
    pub fn attempt(
        &self,
        client: &mut SocketClient,
        host: &str,
        path: &str,
    ) -> std::result::Result<(), HandshakeState> {
        let outcome = self.exchange(client, host, path);
        if let Err(e) = client.set_read_timeout(None) {
            debug!("cannot clear handshake read timeout: {}", e);
        }
        outcome
    }

    fn exchange(
        &self,
        client: &mut SocketClient,
        host: &str,
        path: &str,
    ) -> std::result::Result<(), HandshakeState> {
        let deadline = Instant::now() + self.timeout;
        let request = create_handshake(host, path).map_err(|e| {
            debug!("cannot build handshake: {}", e);
            HandshakeState::Unknown
        })?;
        if client.write_buffer_mut().put_slice(&request).is_err() {
            debug!(
                needed = request.len(),
                capacity = client.write_buffer_size(),
                "handshake does not fit the write buffer"
            );
            return Err(HandshakeState::Unknown);
        }
        while client.write_buffer().position() > 0 {
            match client.write() {
                Ok(Transfer::Bytes(_)) => {}
                Ok(Transfer::Closed) | Err(_) => return Err(HandshakeState::InvalidWrite),
            }
            if Instant::now() >= deadline {
                return Err(HandshakeState::Timeout);
            }
        }
        trace!(host, path, "handshake sent");
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                return Err(HandshakeState::Timeout);
            }
            if let Err(e) = client.set_read_timeout(Some(left)) {
                debug!("cannot bound handshake read: {}", e);
                return Err(HandshakeState::InvalidRead);
            }
            match client.read() {
                Ok(Transfer::Bytes(_)) => {}
                Ok(Transfer::Closed) | Err(_) => return Err(HandshakeState::InvalidRead),
            }
            match parse_handshake(client.read_buffer_mut()) {
                HandshakeState::Matched => {
                    debug!(host, path, "handshake matched");
                    return Ok(());
                }
                HandshakeState::Incomplete => {}
                failed => return Err(failed),
            }
            let buffer = client.read_buffer();
            if buffer.remaining() == buffer.capacity() {
                debug!(
                    capacity = buffer.capacity(),
                    "handshake response does not fit the read buffer"
                );
                return Err(HandshakeState::Unknown);
            }
            if Instant::now() >= deadline {
                return Err(HandshakeState::Timeout);
            }
            std::thread::yield_now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::testing::ScriptedSocket;

    const RESPONSE: &[u8] = b"HTTP/1.1 101 Switching Protocols\r\n\
        Upgrade: websocket\r\n\
        Connection: Upgrade\r\n\
        Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n\r\n";

    fn readable(bytes: &[u8]) -> ByteCursor {
        ByteCursor::from_slice(bytes)
    }

    #[test]
    fn rfc_accept_example() {
        assert_eq!(
            compute_accept("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn request_template() {
        let req = build_handshake_request("example.com", "", "a2V5");
        assert_eq!(
            req,
            b"GET / HTTP/1.1\r\nHost: example.com\r\nUpgrade: websocket\r\n\
Connection: Upgrade\r\nSec-WebSocket-Key: a2V5\r\nSec-WebSocket-Version: 13\r\n\r\n"
        );
    }

    #[test]
    fn generated_key_is_16_bytes() {
        let key = generate_key().unwrap();
        assert_eq!(BASE64.decode(key).unwrap().len(), 16);
    }

    #[test]
    fn matched_consumes_exactly_the_response() {
        let mut bytes = RESPONSE.to_vec();
        bytes.extend_from_slice(&[0x81, 0x00]);
        let mut buf = readable(&bytes);
        assert_eq!(parse_handshake(&mut buf), HandshakeState::Matched);
        assert_eq!(buf.position(), RESPONSE.len());
        assert_eq!(buf.readable(), &[0x81, 0x00]);
    }

    #[test]
    fn extra_headers_and_case_still_match() {
        let response = b"HTTP/1.1 101 Switching Protocols\r\n\
            Server: test\r\n\
            UPGRADE: WebSocket\r\n\
            connection: upgrade\r\n\
            Date: today\r\n\
            sec-websocket-accept: abc\r\n\r\n";
        let mut buf = readable(response);
        assert_eq!(parse_handshake(&mut buf), HandshakeState::Matched);
        assert_eq!(buf.position(), response.len());
    }

    #[test]
    fn missing_header_is_incomplete() {
        let response = b"HTTP/1.1 101 Switching Protocols\r\n\
            Upgrade: websocket\r\n\
            Sec-WebSocket-Accept: abc\r\n\r\n";
        let mut buf = readable(response);
        assert_eq!(parse_handshake(&mut buf), HandshakeState::Incomplete);
        assert_eq!(buf.position(), 0);
    }

    #[test]
    fn non_101_is_invalid_protocol() {
        let mut buf = readable(b"HTTP/1.1 400 Bad Request\r\n\r\n");
        assert_eq!(parse_handshake(&mut buf), HandshakeState::InvalidProtocol);
        let mut buf = readable(b"HTTP/1.0 101");
        assert_eq!(parse_handshake(&mut buf), HandshakeState::InvalidProtocol);
    }

    #[test]
    fn every_prefix_is_incomplete() {
        for cut in 0..RESPONSE.len() {
            let mut buf = readable(&RESPONSE[..cut]);
            assert_eq!(parse_handshake(&mut buf), HandshakeState::Incomplete, "cut {}", cut);
        }
    }

    #[test]
    fn descriptions() {
        assert_eq!(
            HandshakeState::InvalidWrite.description(),
            "IO error while sending handshake to server"
        );
        assert_eq!(
            HandshakeState::Unknown.to_string(),
            "Unknown error occurred during the handshake"
        );
    }

    fn scripted_client(socket: &ScriptedSocket, write_size: usize) -> SocketClient {
        SocketClient::new(Box::new(socket.clone()), 1024, write_size)
    }

    #[test]
    fn attempt_sends_request_and_matches_split_response() {
        let socket = ScriptedSocket::new();
        socket.push_inbound(&RESPONSE[..20]);
        socket.push_inbound(&RESPONSE[20..]);
        let mut client = scripted_client(&socket, 512);
        let handler = HandshakeHandler::default();
        assert_eq!(handler.attempt(&mut client, "example.com", "/feed"), Ok(()));
        let sent = socket.outbound();
        assert!(sent.starts_with(b"GET /feed HTTP/1.1\r\nHost: example.com\r\n"));
        assert!(!client.read_buffer().has_remaining());
    }

    #[test]
    fn attempt_bounds_each_read_and_clears_the_timeout() {
        let socket = ScriptedSocket::new();
        socket.push_inbound(&RESPONSE[..40]);
        socket.push_inbound(&RESPONSE[40..]);
        let mut client = scripted_client(&socket, 512);
        let handler = HandshakeHandler::new(Duration::from_secs(5));
        assert_eq!(handler.attempt(&mut client, "example.com", "/"), Ok(()));
        let timeouts = socket.wire.lock().unwrap().read_timeouts.clone();
        let (last, bounded) = timeouts.split_last().unwrap();
        assert_eq!(*last, None);
        assert!(bounded.len() >= 2);
        for timeout in bounded {
            let timeout = timeout.unwrap();
            assert!(timeout > Duration::ZERO && timeout <= Duration::from_secs(5));
        }
    }

    #[test]
    fn attempt_times_out() {
        let socket = ScriptedSocket::new();
        let mut client = scripted_client(&socket, 512);
        let handler = HandshakeHandler::new(Duration::from_millis(20));
        assert_eq!(
            handler.attempt(&mut client, "example.com", "/"),
            Err(HandshakeState::Timeout)
        );
        assert_eq!(socket.wire.lock().unwrap().read_timeouts.last(), Some(&None));
    }

    #[test]
    fn attempt_reports_peer_close_as_invalid_read() {
        let socket = ScriptedSocket::new();
        socket.push_inbound(b"HTTP/1.1 101 Switching Protocols\r\n");
        socket.wire.lock().unwrap().read_eof = true;
        let mut client = scripted_client(&socket, 512);
        assert_eq!(
            HandshakeHandler::default().attempt(&mut client, "example.com", "/"),
            Err(HandshakeState::InvalidRead)
        );
    }

    #[test]
    fn attempt_reports_write_failure() {
        let socket = ScriptedSocket::new();
        socket.wire.lock().unwrap().closed_by_peer = true;
        let mut client = scripted_client(&socket, 512);
        assert_eq!(
            HandshakeHandler::default().attempt(&mut client, "example.com", "/"),
            Err(HandshakeState::InvalidWrite)
        );
    }

    #[test]
    fn attempt_with_tiny_write_buffer_is_unknown() {
        let socket = ScriptedSocket::new();
        let mut client = scripted_client(&socket, 16);
        assert_eq!(
            HandshakeHandler::default().attempt(&mut client, "example.com", "/"),
            Err(HandshakeState::Unknown)
        );
    }

    #[derive(Clone, Default)]
    struct CapturedLog(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLog {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn attempt_with_response_filling_read_buffer_is_unknown_and_logged() {
        let socket = ScriptedSocket::new();
        let mut response = b"HTTP/1.1 101 Switching Protocols\r\nX-Padding: ".to_vec();
        response.resize(96, b'a');
        socket.push_inbound(&response);
        let mut client = SocketClient::new(Box::new(socket.clone()), 64, 512);

        let log = CapturedLog::default();
        let writer = log.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let outcome = tracing::subscriber::with_default(subscriber, || {
            HandshakeHandler::default().attempt(&mut client, "example.com", "/")
        });
        assert_eq!(outcome, Err(HandshakeState::Unknown));
        let log = String::from_utf8(log.0.lock().unwrap().clone()).unwrap();
        assert!(log.contains("handshake response does not fit the read buffer"));
        assert!(log.contains("capacity=64"));
    }

    #[test]
    fn attempt_reports_non_101() {
        let socket = ScriptedSocket::new();
        socket.push_inbound(b"HTTP/1.1 403 Forbidden\r\n\r\n");
        let mut client = scripted_client(&socket, 512);
        assert_eq!(
            HandshakeHandler::default().attempt(&mut client, "example.com", "/"),
            Err(HandshakeState::InvalidProtocol)
        );
    }
}
