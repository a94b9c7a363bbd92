/*
 * encoder.rs
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

//! HTTP/1.1 request encoder writing straight into a [`ByteCursor`].

use super::request::Method;
use crate::buffer::ByteCursor;
use crate::error::{Error, Result};

pub const DEFAULT_PROTOCOL: &str = "HTTP/1.1";

const CRLF: &[u8] = b"\r\n";
const HEADER_SEPARATOR: &[u8] = b": ";

/// One request to encode. `headers` are written in order after the fixed ones.
#[derive(Debug, Clone, Copy)]
pub struct Request<'a> {
    pub method: Method,
    pub path: &'a str,
    pub host: &'a str,
    pub headers: &'a [(&'a str, &'a str)],
    pub body: Option<&'a [u8]>,
}

impl<'a> Request<'a> {
    pub fn new(method: Method, path: &'a str, host: &'a str) -> Self {
        Self {
            method,
            path,
            host,
            headers: &[],
            body: None,
        }
    }

    pub fn headers(mut self, headers: &'a [(&'a str, &'a str)]) -> Self {
        self.headers = headers;
        self
    }

    pub fn body(mut self, body: &'a [u8]) -> Self {
        self.body = Some(body);
        self
    }
}

/// Encodes request heads and bodies.
#[derive(Debug, Clone, Copy)]
pub struct HttpEncoder {
    protocol: &'static str,
}

impl Default for HttpEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_PROTOCOL)
    }
}

impl HttpEncoder {
    pub fn new(protocol: &'static str) -> Self {
        Self { protocol }
    }

    pub fn protocol(&self) -> &'static str {
        self.protocol
    }

    /// Bytes `encode` will write for `request`.
    pub fn encoded_len(&self, request: &Request<'_>) -> usize {
        let mut len = request.method.as_str().len() + 1 + request.path.len() + 1;
        len += self.protocol.len() + CRLF.len();
        len += "Host: ".len() + request.host.len() + CRLF.len();
        len += "Connection: keep-alive".len() + CRLF.len();
        for (name, value) in request.headers {
            len += name.len() + HEADER_SEPARATOR.len() + value.len() + CRLF.len();
        }
        if let Some(body) = request.body {
            len += "Content-Length: ".len() + decimal_len(body.len()) + CRLF.len();
        }
        len += CRLF.len();
        len + request.body.map_or(0, <[u8]>::len)
    }

    /// Append `request` to `dest`. Nothing is written if it does not fit.
    pub fn encode(&self, request: &Request<'_>, dest: &mut ByteCursor) -> Result<usize> {
        let needed = self.encoded_len(request);
        if needed > dest.remaining() {
            return Err(Error::BufferOverflow {
                needed,
                capacity: dest.remaining(),
            });
        }
        dest.put_slice(request.method.as_str().as_bytes())?;
        dest.put_u8(b' ')?;
        dest.put_slice(request.path.as_bytes())?;
        dest.put_u8(b' ')?;
        dest.put_slice(self.protocol.as_bytes())?;
        dest.put_slice(CRLF)?;

        dest.put_slice(b"Host: ")?;
        dest.put_slice(request.host.as_bytes())?;
        dest.put_slice(CRLF)?;
        dest.put_slice(b"Connection: keep-alive")?;
        dest.put_slice(CRLF)?;

        for (name, value) in request.headers {
            dest.put_slice(name.as_bytes())?;
            dest.put_slice(HEADER_SEPARATOR)?;
            dest.put_slice(value.as_bytes())?;
            dest.put_slice(CRLF)?;
        }

        if let Some(body) = request.body {
            dest.put_slice(b"Content-Length: ")?;
            put_decimal(dest, body.len())?;
            dest.put_slice(CRLF)?;
        }
        dest.put_slice(CRLF)?;
        if let Some(body) = request.body {
            dest.put_slice(body)?;
        }
        Ok(needed)
    }
}

fn decimal_len(mut n: usize) -> usize {
    let mut len = 1;
    while n >= 10 {
        n /= 10;
        len += 1;
    }
    len
}

fn put_decimal(dest: &mut ByteCursor, n: usize) -> Result<()> {
    let mut digits = [0u8; 20];
    let len = decimal_len(n);
    let mut rest = n;
    for slot in digits[..len].iter_mut().rev() {
        *slot = b'0' + (rest % 10) as u8;
        rest /= 10;
    }
    dest.put_slice(&digits[..len])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(request: &Request<'_>) -> Vec<u8> {
        let mut buffer = ByteCursor::with_capacity(1024);
        let written = HttpEncoder::default().encode(request, &mut buffer).unwrap();
        buffer.flip();
        assert_eq!(written, buffer.remaining());
        buffer.readable().to_vec()
    }

    #[test]
    fn get_without_body() {
        let bytes = encode(&Request::new(Method::Get, "/api/v3/time", "api.example.com"));
        assert_eq!(
            bytes,
            b"GET /api/v3/time HTTP/1.1\r\nHost: api.example.com\r\nConnection: keep-alive\r\n\r\n"
        );
    }

    #[test]
    fn post_with_headers_and_body() {
        let headers = [("Content-Type", "application/json"), ("X-Key", "abc")];
        let bytes = encode(
            &Request::new(Method::Post, "/order", "localhost:8080")
                .headers(&headers)
                .body(b"{\"qty\":10}"),
        );
        assert_eq!(
            std::str::from_utf8(&bytes).unwrap(),
            "POST /order HTTP/1.1\r\nHost: localhost:8080\r\nConnection: keep-alive\r\n\
             Content-Type: application/json\r\nX-Key: abc\r\nContent-Length: 10\r\n\r\n{\"qty\":10}"
        );
    }

    #[test]
    fn empty_body_still_has_content_length() {
        let bytes = encode(&Request::new(Method::Put, "/", "h").body(b""));
        assert!(bytes.ends_with(b"Content-Length: 0\r\n\r\n"));
    }

    #[test]
    fn overflow_writes_nothing() {
        let mut buffer = ByteCursor::with_capacity(16);
        let result =
            HttpEncoder::default().encode(&Request::new(Method::Get, "/long/path", "host"), &mut buffer);
        assert!(matches!(result, Err(Error::BufferOverflow { capacity: 16, .. })));
        assert_eq!(buffer.position(), 0);
    }

    #[test]
    fn decimal_lengths() {
        for n in [0usize, 9, 10, 99, 100, 65535, usize::MAX] {
            assert_eq!(decimal_len(n), n.to_string().len());
            let mut buffer = ByteCursor::with_capacity(32);
            put_decimal(&mut buffer, n).unwrap();
            buffer.flip();
            assert_eq!(buffer.readable(), n.to_string().as_bytes());
        }
    }
}
