/*
 * client.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Spoletta, a low-allocation socket toolkit.
 *
 * Spoletta is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Spoletta is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Spoletta.  If not, see <http://www.gnu.org/licenses/>.
 */

//! Keep-alive HTTP/1.1 client: one pooled blocking connection per host.
//!
//! Not for concurrent use. The response body is copied into a buffer owned by
//! the client and borrowed by the returned [`HttpResponse`].

use std::sync::Arc;

use bytes::BytesMut;
use tracing::debug;

use super::decoder::HttpDecoder;
use super::encoder::{HttpEncoder, Request};
use super::request::{split_host_port, HttpProtocol, Method};
use crate::buffer::ByteCursor;
use crate::client::{MessageClient, MessageFraming, MessageStatus, SocketClient};
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::pool::{ConnectionPool, PoolKey, Pooled};
use crate::socket::SocketFactory;

/// Read buffer size for HTTP connections.
pub const DEFAULT_HTTP_READ_BUFFER_SIZE: usize = 32 * 1024;

/// A complete response (head and Content-Length body) is one message.
#[derive(Debug, Default)]
pub struct HttpFraming {
    decoder: HttpDecoder,
}

impl HttpFraming {
    pub fn decoder(&self) -> &HttpDecoder {
        &self.decoder
    }
}

impl MessageFraming for HttpFraming {
    fn is_complete_message(&mut self, buffer: &mut ByteCursor) -> Result<bool> {
        self.decoder.wrap(buffer.readable())?;
        if let Some(length) = self.decoder.length() {
            if self.decoder.is_complete() {
                buffer.advance_position(length);
                return Ok(true);
            }
            if length > buffer.capacity() {
                return Err(Error::FrameTooLarge {
                    needed: length,
                    capacity: buffer.capacity(),
                });
            }
        }
        if buffer.position() == 0 && buffer.limit() == buffer.capacity() {
            return Err(Error::BufferOverflow {
                needed: buffer.capacity() + 1,
                capacity: buffer.capacity(),
            });
        }
        Ok(false)
    }
}

/// One keep-alive connection: encodes requests and frames responses.
#[derive(Debug)]
pub struct HttpMessageClient {
    messages: MessageClient<HttpFraming>,
    encoder: HttpEncoder,
    /// Value of the Host header.
    host: String,
}

impl HttpMessageClient {
    pub fn new(client: SocketClient, host: impl Into<String>) -> Self {
        Self {
            messages: MessageClient::new(client, HttpFraming::default()),
            encoder: HttpEncoder::default(),
            host: host.into(),
        }
    }

    /// Create and connect a client for `key`, sending `host` as the Host header.
    pub fn connect(
        key: &PoolKey,
        host: &str,
        factory: Arc<dyn SocketFactory>,
        config: &ClientConfig,
    ) -> Result<Self> {
        let client = SocketClient::builder()
            .host(key.host.clone())
            .port(key.port)
            .socket_factory(factory)
            .config(config.clone())
            .build()?;
        let mut this = Self::new(client, host);
        this.messages.connect()?;
        debug!(host = %key.host, port = key.port, "HTTP connection open");
        Ok(this)
    }

    /// Encode and flush one request. Returns false if the peer closed.
    pub fn request(
        &mut self,
        method: Method,
        path: &str,
        body: Option<&[u8]>,
        headers: &[(&str, &str)],
    ) -> Result<bool> {
        let client = self.messages.client_mut();
        let mut request = Request::new(method, path, &self.host).headers(headers);
        if let Some(body) = body {
            request = request.body(body);
        }
        client.write_buffer_mut().clear();
        self.encoder.encode(&request, client.write_buffer_mut())?;
        Ok(client.flush()?)
    }

    /// Read until a complete response is buffered. Returns false if the peer closed first.
    pub fn read_response(&mut self) -> Result<bool> {
        loop {
            match self.messages.read_message()? {
                MessageStatus::Ready => return Ok(true),
                MessageStatus::Closed => return Ok(false),
                MessageStatus::Pending => std::thread::yield_now(),
            }
        }
    }

    /// Decoder state for the last response.
    pub fn decoder(&self) -> &HttpDecoder {
        self.messages.framing().decoder()
    }

    /// Bytes of the last response, head included.
    pub fn message(&self) -> &[u8] {
        self.messages.message()
    }

    pub fn reconnect(&mut self) -> Result<()> {
        self.messages.reconnect()?;
        Ok(())
    }

    pub fn close(&mut self) -> Result<()> {
        self.messages.close()?;
        Ok(())
    }
}

impl Pooled for HttpMessageClient {
    fn is_available(&self) -> bool {
        self.messages.is_connected()
    }
}

/// Result of one request. `body` is valid until the next request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpResponse<'a> {
    /// Status was 200.
    pub success: bool,
    /// None when no response was received.
    pub status: Option<u16>,
    pub body: &'a [u8],
}

impl HttpResponse<'_> {
    fn failed() -> Self {
        Self {
            success: false,
            status: None,
            body: &[],
        }
    }

    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(self.body).ok()
    }
}

/// HTTP client with one pooled connection per host.
pub struct HttpClient {
    pool: ConnectionPool<HttpMessageClient>,
    config: ClientConfig,
    factory: Option<Arc<dyn SocketFactory>>,
    body: BytesMut,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::with_config(ClientConfig {
            read_buffer_size: DEFAULT_HTTP_READ_BUFFER_SIZE,
            ..ClientConfig::default()
        })
    }
}

impl HttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// `config.transport` is ignored: the scheme of each request picks it.
    pub fn with_config(config: ClientConfig) -> Self {
        let body = BytesMut::with_capacity(config.read_buffer_size);
        Self {
            pool: ConnectionPool::new(),
            config,
            factory: None,
            body,
        }
    }

    /// Use `factory` for every connection instead of the scheme's default.
    pub fn socket_factory(mut self, factory: Arc<dyn SocketFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn get(&mut self, protocol: HttpProtocol, host: &str, path: &str) -> Result<HttpResponse<'_>> {
        self.request(protocol, host, Method::Get, path, None, &[])
    }

    pub fn post(
        &mut self,
        protocol: HttpProtocol,
        host: &str,
        path: &str,
        body: &[u8],
    ) -> Result<HttpResponse<'_>> {
        self.request(protocol, host, Method::Post, path, Some(body), &[])
    }

    /// Send one request on the pooled connection for `host` ("name" or
    /// "name:port") and wait for the response. A connection found closed
    /// during the exchange is reconnected and the request sent once more.
    pub fn request(
        &mut self,
        protocol: HttpProtocol,
        host: &str,
        method: Method,
        path: &str,
        body: Option<&[u8]>,
        headers: &[(&str, &str)],
    ) -> Result<HttpResponse<'_>> {
        let (name, port) = split_host_port(host, protocol.default_port())?;
        let key = PoolKey::new(name, port, protocol == HttpProtocol::Https);
        let factory = self
            .factory
            .clone()
            .unwrap_or_else(|| protocol.transport().factory());
        let config = &self.config;
        let client = self.pool.get_or_connect(&key, |key| {
            HttpMessageClient::connect(key, host, factory.clone(), config)
        })?;

        let mut retried = false;
        loop {
            if client.request(method, path, body, headers)? && client.read_response()? {
                break;
            }
            if retried {
                debug!(host, "connection closed again after reconnect");
                if let Err(e) = client.close() {
                    debug!("close failed: {}", e);
                }
                return Ok(HttpResponse::failed());
            }
            debug!(host, "connection closed, reconnecting");
            client.reconnect()?;
            retried = true;
        }

        self.body.clear();
        let decoder = client.decoder();
        decoder.copy_body(client.message(), &mut self.body)?;
        let status = decoder.status();
        Ok(HttpResponse {
            success: status == Some(200),
            status,
            body: &self.body,
        })
    }
}
