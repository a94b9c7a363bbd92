/*
 * client.rs
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

//! WebSocket client: connect to a ws:// or wss:// URL, perform the opening
//! handshake, then exchange single-frame messages.
//!
//! The handshake runs on a blocking socket; afterwards the socket is switched
//! to non-blocking and [`WebSocketClient::read`] returns immediately when no
//! complete frame is buffered.

use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tracing::{debug, trace};

use super::frame::{self, DataFrame, Opcode, MAX_CONTROL_PAYLOAD};
use super::handshake::HandshakeHandler;
use super::status::StatusCode;
use crate::buffer::ByteCursor;
use crate::client::{MessageClient, MessageFraming, MessageStatus, SocketClient};
use crate::config::WebSocketConfig;
use crate::error::{Error, Result};
use crate::socket::{SocketFactory, TransportKind};

/// Parsed components of a WebSocket URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebSocketUrl {
    pub secure: bool,
    pub host: String,
    pub port: u16,
    /// Path including any query string; "/" when absent.
    pub path: String,
}

impl WebSocketUrl {
    /// Parse a ws:// or wss:// URL.
    pub fn parse(url: &str) -> Result<Self> {
        let (secure, rest) = if let Some(r) = url.strip_prefix("wss://") {
            (true, r)
        } else if let Some(r) = url.strip_prefix("ws://") {
            (false, r)
        } else {
            return Err(Error::Config("URL scheme must be ws or wss".into()));
        };
        let default_port: u16 = if secure { 443 } else { 80 };

        let (authority, path) = match rest.find(|c| c == '/' || c == '?') {
            Some(i) if rest.as_bytes()[i] == b'?' => (&rest[..i], format!("/{}", &rest[i..])),
            Some(i) => (&rest[..i], rest[i..].to_string()),
            None => (rest, "/".to_string()),
        };

        // IPv6 literal [::1]:port
        let (host, port) = if let Some(inner) = authority.strip_prefix('[') {
            let end = inner
                .find(']')
                .ok_or_else(|| Error::Config("unterminated IPv6 bracket".into()))?;
            let port = match inner[end + 1..].strip_prefix(':') {
                Some(p) => parse_port(p)?,
                None => default_port,
            };
            (&inner[..end], port)
        } else {
            match authority.rfind(':') {
                Some(i) => (&authority[..i], parse_port(&authority[i + 1..])?),
                None => (authority, default_port),
            }
        };

        if host.is_empty() {
            return Err(Error::Config("URL has no host".into()));
        }

        Ok(Self {
            secure,
            host: host.to_string(),
            port,
            path,
        })
    }

    /// Value for the Host header: the port is omitted when it is the scheme default.
    pub fn authority(&self) -> String {
        let host = if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        let default_port = if self.secure { 443 } else { 80 };
        if self.port == default_port {
            host
        } else {
            format!("{}:{}", host, self.port)
        }
    }

    pub fn transport(&self) -> TransportKind {
        if self.secure {
            TransportKind::Tls
        } else {
            TransportKind::Plain
        }
    }
}

fn parse_port(s: &str) -> Result<u16> {
    s.parse::<u16>()
        .map_err(|_| Error::Config(format!("invalid port '{}'", s)))
}

/// A complete frame at the buffer position is one message.
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameFraming;

impl MessageFraming for FrameFraming {
    fn is_complete_message(&mut self, buffer: &mut ByteCursor) -> Result<bool> {
        let frame = DataFrame::from_slice(buffer.readable());
        if !frame.is_incomplete() {
            let length = frame.length();
            buffer.advance_position(length);
            return Ok(true);
        }
        if frame.has_complete_header() && frame.length() > buffer.capacity() {
            return Err(Error::FrameTooLarge {
                needed: frame.length(),
                capacity: buffer.capacity(),
            });
        }
        Ok(false)
    }
}

/// Result of [`WebSocketClient::read`]. `body` is valid until the next call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WebSocketResponse<'a> {
    /// A frame was received.
    pub success: bool,
    pub opcode: Option<Opcode>,
    pub body: &'a [u8],
    /// The peer closed the connection.
    pub closed: bool,
}

impl WebSocketResponse<'static> {
    fn pending() -> Self {
        Self {
            success: false,
            opcode: None,
            body: &[],
            closed: false,
        }
    }

    fn closed() -> Self {
        Self {
            closed: true,
            ..Self::pending()
        }
    }
}

impl WebSocketResponse<'_> {
    /// Body as UTF-8, for text frames.
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(self.body).ok()
    }
}

fn mask_key() -> Result<[u8; 4]> {
    let mut key = [0u8; 4];
    getrandom::getrandom(&mut key)
        .map_err(|e| Error::protocol(format!("random source failed: {}", e)))?;
    Ok(key)
}

/// WebSocket client over a [`MessageClient`].
pub struct WebSocketClient {
    messages: MessageClient<FrameFraming>,
    url: WebSocketUrl,
    handshake: HandshakeHandler,
    body: BytesMut,
}

impl WebSocketClient {
    pub fn builder() -> WebSocketClientBuilder {
        WebSocketClientBuilder::default()
    }

    /// Wrap an existing socket client; `connect` still performs the handshake.
    pub fn new(client: SocketClient, url: WebSocketUrl, handshake_timeout: Duration) -> Self {
        let body = BytesMut::with_capacity(client.read_buffer_size());
        Self {
            messages: MessageClient::new(client, FrameFraming),
            url,
            handshake: HandshakeHandler::new(handshake_timeout),
            body,
        }
    }

    pub fn url(&self) -> &WebSocketUrl {
        &self.url
    }

    /// Connect, perform the opening handshake and switch to non-blocking mode.
    pub fn connect(&mut self) -> Result<()> {
        let client = self.messages.client_mut();
        client.configure_blocking(true)?;
        client.connect()?;
        client.clear_buffers();
        let authority = self.url.authority();
        if let Err(state) = self.handshake.attempt(client, &authority, &self.url.path) {
            debug!(url = %authority, "handshake failed: {}", state);
            if let Err(e) = client.close() {
                debug!("close after failed handshake: {}", e);
            }
            return Err(Error::Handshake(state));
        }
        client.configure_blocking(false)?;
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.messages.is_connected()
    }

    /// Read at most one frame. Pings are answered with a pong carrying the same payload.
    pub fn read(&mut self) -> Result<WebSocketResponse<'_>> {
        match self.messages.read_message()? {
            MessageStatus::Closed => return Ok(WebSocketResponse::closed()),
            MessageStatus::Pending => return Ok(WebSocketResponse::pending()),
            MessageStatus::Ready => {}
        }
        let frame = DataFrame::from_slice(self.messages.message());
        if frame.is_fragment() {
            return Err(Error::UnsupportedFragment);
        }
        let opcode = frame.opcode()?;
        if opcode == Opcode::Continuous {
            return Err(Error::UnsupportedFragment);
        }
        self.body.clear();
        frame.copy_payload_data(&mut self.body)?;
        trace!(?opcode, len = self.body.len(), "frame received");
        if opcode == Opcode::Ping {
            let payload = std::mem::take(&mut self.body);
            let sent = self.send(Opcode::Pong, &payload);
            self.body = payload;
            sent?;
        }
        Ok(WebSocketResponse {
            success: true,
            opcode: Some(opcode),
            body: &self.body,
            closed: false,
        })
    }

    /// Send one final frame. Returns false if the peer closed before it was written.
    pub fn send(&mut self, opcode: Opcode, payload: &[u8]) -> Result<bool> {
        if opcode.is_control() && payload.len() > MAX_CONTROL_PAYLOAD {
            return Err(Error::protocol(format!(
                "control frame payload of {} bytes exceeds {}",
                payload.len(),
                MAX_CONTROL_PAYLOAD
            )));
        }
        let client = self.messages.client_mut();
        let needed = frame::encoded_len(payload.len());
        if needed > client.write_buffer_size() {
            return Err(Error::BufferOverflow {
                needed,
                capacity: client.write_buffer_size(),
            });
        }
        if needed > client.write_buffer().remaining() && !client.flush()? {
            return Ok(false);
        }
        frame::encode(opcode, payload, mask_key()?, client.write_buffer_mut())?;
        Ok(client.flush()?)
    }

    pub fn send_text(&mut self, text: &str) -> Result<bool> {
        self.send(Opcode::Text, text.as_bytes())
    }

    pub fn send_binary(&mut self, data: &[u8]) -> Result<bool> {
        self.send(Opcode::Binary, data)
    }

    pub fn ping(&mut self, payload: &[u8]) -> Result<bool> {
        self.send(Opcode::Ping, payload)
    }

    /// Send a close frame with `status` and `reason`, then close the socket.
    pub fn close(&mut self, status: StatusCode, reason: &str) -> Result<()> {
        if self.messages.is_connected() {
            let mut payload = Vec::with_capacity(2 + reason.len());
            if status.may_be_sent() {
                payload.extend_from_slice(&status.code().to_be_bytes());
                payload.extend_from_slice(reason.as_bytes());
            }
            payload.truncate(MAX_CONTROL_PAYLOAD);
            if let Err(e) = self.send(Opcode::Closing, &payload) {
                debug!("close frame not sent: {}", e);
            }
        }
        self.messages.close()?;
        Ok(())
    }

    pub fn client(&self) -> &SocketClient {
        self.messages.client()
    }
}

/// Builder for [`WebSocketClient`].
#[derive(Default)]
pub struct WebSocketClientBuilder {
    uri: Option<String>,
    factory: Option<Arc<dyn SocketFactory>>,
    config: WebSocketConfig,
}

impl WebSocketClientBuilder {
    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    /// Socket factory; by default chosen from the URL scheme.
    pub fn socket_factory(mut self, factory: Arc<dyn SocketFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn config(mut self, config: WebSocketConfig) -> Self {
        self.config = config;
        self
    }

    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.config.client.read_buffer_size = size;
        self
    }

    pub fn write_buffer_size(mut self, size: usize) -> Self {
        self.config.client.write_buffer_size = size;
        self
    }

    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config.handshake_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Create the client. Does not connect.
    pub fn build(self) -> Result<WebSocketClient> {
        let uri = self
            .uri
            .ok_or_else(|| Error::Config("WebSocket client requires a URI".into()))?;
        let url = WebSocketUrl::parse(&uri)?;
        let factory = self.factory.unwrap_or_else(|| url.transport().factory());
        let client = SocketClient::builder()
            .host(url.host.clone())
            .port(url.port)
            .socket_factory(factory)
            .config(self.config.client.clone())
            .build()?;
        Ok(WebSocketClient::new(
            client,
            url,
            self.config.handshake_timeout(),
        ))
    }
}
