/*
 * error.rs
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

//! Errors from the protocol layers.
//!
//! Transport code returns `io::Result`; the framing, handshake and client
//! layers return [`Result`] so that capacity and protocol violations stay
//! distinguishable from I/O faults.

use std::io;

use crate::protocol::websocket::HandshakeState;

/// Result alias for protocol-level operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the buffers, codecs and clients.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Malformed data from the peer.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("invalid opcode 0x{0:x}")]
    InvalidOpcode(u8),

    /// Fragmented WebSocket messages are not supported.
    #[error("unsupported feature: fragmented frame")]
    UnsupportedFragment,

    /// A frame announced a length the read buffer can never hold.
    #[error("frame of {needed} bytes exceeds buffer capacity {capacity}")]
    FrameTooLarge { needed: usize, capacity: usize },

    /// Encoding into a buffer without enough free space.
    #[error("buffer overflow: {needed} bytes needed, {capacity} available")]
    BufferOverflow { needed: usize, capacity: usize },

    #[error("handshake failed: {0}")]
    Handshake(HandshakeState),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("connection closed")]
    ConnectionClosed,
}

impl Error {
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }
}

impl From<rustls::Error> for Error {
    fn from(e: rustls::Error) -> Self {
        Self::Tls(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Config(e.to_string())
    }
}

impl From<Error> for io::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::Io(e) => e,
            Error::ConnectionClosed => io::Error::new(io::ErrorKind::ConnectionAborted, e),
            Error::BufferOverflow { .. } | Error::FrameTooLarge { .. } => {
                io::Error::new(io::ErrorKind::OutOfMemory, e)
            }
            Error::Config(_) => io::Error::new(io::ErrorKind::InvalidInput, e),
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_round_trips_kind() {
        let err = Error::from(io::Error::new(io::ErrorKind::BrokenPipe, "gone"));
        let back: io::Error = err.into();
        assert_eq!(back.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn protocol_error_becomes_invalid_data() {
        let back: io::Error = Error::protocol("bad status line").into();
        assert_eq!(back.kind(), io::ErrorKind::InvalidData);
        assert!(back.to_string().contains("bad status line"));
    }

    #[test]
    fn handshake_error_displays_description() {
        let err = Error::Handshake(HandshakeState::Timeout);
        assert_eq!(
            err.to_string(),
            "handshake failed: The handshake attempt expired"
        );
    }
}
