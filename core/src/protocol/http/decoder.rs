/*
 * decoder.rs
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

//! Incremental HTTP/1.1 response decoder.
//!
//! `wrap` rescans the buffered bytes from the start of the response each
//! time; offsets it reports are relative to that start. A response is only
//! complete once a Content-Length header has been seen and that many body
//! bytes are buffered. Chunked bodies are not supported.

use bytes::BufMut;

use crate::error::{Error, Result};

/// Status line, header scan and body location of one buffered response.
#[derive(Debug, Default, Clone)]
pub struct HttpDecoder {
    completed: bool,
    body_offset: Option<usize>,
    status: Option<u16>,
    content_length: Option<usize>,
}

impl HttpDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset and parse `bytes`, which begin at the status line.
    /// A status line not starting with "HTTP" is a protocol error.
    pub fn wrap(&mut self, bytes: &[u8]) -> Result<()> {
        *self = Self::default();
        let Some(at) = self.parse_status_line(bytes)? else {
            return Ok(());
        };
        let Some(body_offset) = self.parse_headers(bytes, at)? else {
            return Ok(());
        };
        self.body_offset = Some(body_offset);
        if let Some(content_length) = self.content_length {
            self.completed = bytes.len() - body_offset >= content_length;
        }
        Ok(())
    }

    /// Returns the offset after the status line, or None when it is not all buffered.
    fn parse_status_line(&mut self, bytes: &[u8]) -> Result<Option<usize>> {
        if bytes.len() < 4 {
            return Ok(None);
        }
        if &bytes[..4] != b"HTTP" {
            return Err(Error::protocol("HTTP response is not compliant"));
        }
        let Some(space) = find(bytes, 4, b' ') else {
            return Ok(None);
        };
        let digits = &bytes[space + 1..];
        let count = digits.iter().take_while(|b| b.is_ascii_digit()).count();
        if count == digits.len() {
            return Ok(None);
        }
        let status = parse_decimal(&digits[..count])
            .and_then(|n| u16::try_from(n).ok())
            .ok_or_else(|| Error::protocol("HTTP status code is not numeric"))?;
        let Some(newline) = find(bytes, space + 1 + count, b'\n') else {
            return Ok(None);
        };
        self.status = Some(status);
        Ok(Some(newline + 1))
    }

    /// Returns the body offset, or None when the blank line is not yet buffered.
    fn parse_headers(&mut self, bytes: &[u8], mut at: usize) -> Result<Option<usize>> {
        loop {
            let Some(eol) = find_crlf(bytes, at) else {
                return Ok(None);
            };
            let line = &bytes[at..eol];
            at = eol + 2;
            if line.is_empty() {
                return Ok(Some(at));
            }
            let Some(colon) = line.iter().position(|&b| b == b':') else {
                continue;
            };
            let name = &line[..colon];
            if name.eq_ignore_ascii_case(b"content-length") {
                let value = &line[colon + 1..];
                let value = value.strip_prefix(b" ").unwrap_or(value);
                let length = parse_decimal(value)
                    .ok_or_else(|| Error::protocol("invalid Content-Length"))?;
                self.content_length = Some(length);
            }
        }
    }

    pub fn is_complete(&self) -> bool {
        self.completed
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn content_length(&self) -> Option<usize> {
        self.content_length
    }

    pub fn body_offset(&self) -> Option<usize> {
        self.body_offset
    }

    /// Total response length: head plus body.
    pub fn length(&self) -> Option<usize> {
        Some(self.body_offset? + self.content_length?)
    }

    /// Body of a complete response within the same bytes passed to `wrap`.
    pub fn body<'a>(&self, bytes: &'a [u8]) -> Option<&'a [u8]> {
        if !self.completed {
            return None;
        }
        let start = self.body_offset?;
        bytes.get(start..start + self.content_length?)
    }

    /// Copy exactly `content_length` body bytes into `dest`.
    pub fn copy_body<B: BufMut>(&self, bytes: &[u8], dest: &mut B) -> Result<()> {
        let body = self
            .body(bytes)
            .ok_or_else(|| Error::protocol("HTTP response is incomplete"))?;
        if dest.remaining_mut() < body.len() {
            return Err(Error::BufferOverflow {
                needed: body.len(),
                capacity: dest.remaining_mut(),
            });
        }
        dest.put_slice(body);
        Ok(())
    }
}

fn find(bytes: &[u8], from: usize, byte: u8) -> Option<usize> {
    bytes
        .get(from..)?
        .iter()
        .position(|&b| b == byte)
        .map(|i| from + i)
}

fn find_crlf(bytes: &[u8], from: usize) -> Option<usize> {
    bytes
        .get(from..)?
        .windows(2)
        .position(|w| w == b"\r\n")
        .map(|i| from + i)
}

fn parse_decimal(digits: &[u8]) -> Option<usize> {
    if digits.is_empty() {
        return None;
    }
    digits.iter().try_fold(0usize, |n, &b| {
        if !b.is_ascii_digit() {
            return None;
        }
        n.checked_mul(10)?.checked_add((b - b'0') as usize)
    })
}
