/*
 * mod.rs
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

//! Socket abstraction: raw byte transfer between a [`ByteCursor`] and a peer.
//!
//! A socket reads into the writable region of a buffer and writes from the
//! readable region, advancing the buffer position by the bytes transferred.
//! Would-block conditions surface as `ErrorKind::WouldBlock`; the socket
//! client normalizes them to zero-byte transfers.

mod plain;
mod tls;

pub use plain::{PlainSocket, PlainSocketFactory};
pub use tls::{TlsSocket, TlsSocketFactory};

use std::io;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::buffer::ByteCursor;

/// Outcome of one read or write call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transfer {
    /// Bytes moved; 0 means nothing could be transferred right now.
    Bytes(usize),
    /// The peer closed the connection.
    Closed,
}

impl Transfer {
    /// Bytes transferred, 0 when closed.
    pub fn bytes(self) -> usize {
        match self {
            Transfer::Bytes(n) => n,
            Transfer::Closed => 0,
        }
    }

    pub fn is_closed(self) -> bool {
        matches!(self, Transfer::Closed)
    }
}

/// Connection-oriented byte transport.
pub trait Socket {
    fn connect(&mut self) -> io::Result<()>;

    fn close(&mut self) -> io::Result<()>;

    fn is_connected(&self) -> bool;

    /// Read at most `len` bytes into `buffer.writable()`, advancing its position.
    fn read(&mut self, buffer: &mut ByteCursor, len: usize) -> io::Result<Transfer>;

    /// Write at most `len` bytes from `buffer.readable()`, advancing its position.
    fn write(&mut self, buffer: &mut ByteCursor, len: usize) -> io::Result<Transfer>;

    fn configure_blocking(&mut self, blocking: bool) -> io::Result<()>;

    fn set_tcp_no_delay(&mut self, _on: bool) -> io::Result<()> {
        Ok(())
    }

    fn set_keep_alive(&mut self, _on: bool) -> io::Result<()> {
        Ok(())
    }

    /// Bound blocking reads; `None` blocks indefinitely. A read that runs
    /// out of time reports zero bytes.
    fn set_read_timeout(&mut self, _timeout: Option<Duration>) -> io::Result<()> {
        Ok(())
    }
}

impl<S: Socket + ?Sized> Socket for Box<S> {
    fn connect(&mut self) -> io::Result<()> {
        (**self).connect()
    }

    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn read(&mut self, buffer: &mut ByteCursor, len: usize) -> io::Result<Transfer> {
        (**self).read(buffer, len)
    }

    fn write(&mut self, buffer: &mut ByteCursor, len: usize) -> io::Result<Transfer> {
        (**self).write(buffer, len)
    }

    fn configure_blocking(&mut self, blocking: bool) -> io::Result<()> {
        (**self).configure_blocking(blocking)
    }

    fn set_tcp_no_delay(&mut self, on: bool) -> io::Result<()> {
        (**self).set_tcp_no_delay(on)
    }

    fn set_keep_alive(&mut self, on: bool) -> io::Result<()> {
        (**self).set_keep_alive(on)
    }

    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        (**self).set_read_timeout(timeout)
    }
}

/// Boxed socket as stored by the clients.
pub type BoxSocket = Box<dyn Socket + Send>;

/// Creates unconnected sockets for a host and port.
pub trait SocketFactory: Send + Sync {
    fn create_socket(&self, host: &str, port: u16) -> io::Result<BoxSocket>;
}

/// Which transport a client uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Plain,
    Tls,
}

impl TransportKind {
    /// A fresh factory for this transport. TLS uses the default trust roots.
    pub fn factory(self) -> Arc<dyn SocketFactory> {
        match self {
            TransportKind::Plain => Arc::new(PlainSocketFactory),
            TransportKind::Tls => Arc::new(TlsSocketFactory::default()),
        }
    }
}

/// Map would-block style errors, expired read timeouts included, to a
/// zero-byte transfer.
pub fn normalize(result: io::Result<Transfer>) -> io::Result<Transfer> {
    match result {
        Err(e)
            if matches!(
                e.kind(),
                io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted | io::ErrorKind::TimedOut
            ) =>
        {
            Ok(Transfer::Bytes(0))
        }
        other => other,
    }
}

/// True for errors that mean the peer went away.
pub(crate) fn is_disconnect(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn would_block_normalizes_to_zero() {
        let r = normalize(Err(io::Error::from(io::ErrorKind::WouldBlock)));
        assert_eq!(r.unwrap(), Transfer::Bytes(0));
        let r = normalize(Err(io::Error::from(io::ErrorKind::Interrupted)));
        assert_eq!(r.unwrap(), Transfer::Bytes(0));
        let r = normalize(Err(io::Error::from(io::ErrorKind::TimedOut)));
        assert_eq!(r.unwrap(), Transfer::Bytes(0));
    }

    #[test]
    fn hard_errors_pass_through() {
        let r = normalize(Err(io::Error::from(io::ErrorKind::PermissionDenied)));
        assert_eq!(r.unwrap_err().kind(), io::ErrorKind::PermissionDenied);
        assert_eq!(normalize(Ok(Transfer::Closed)).unwrap(), Transfer::Closed);
    }

    #[test]
    fn transport_kind_deserializes_lowercase() {
        let kind: TransportKind = serde_json::from_str("\"tls\"").unwrap();
        assert_eq!(kind, TransportKind::Tls);
    }
}
