/*
 * plain.rs
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

//! Plain TCP socket over `std::net::TcpStream`.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

use tracing::debug;

use super::{is_disconnect, BoxSocket, Socket, SocketFactory, Transfer};
use crate::buffer::ByteCursor;

/// Unencrypted TCP socket.
#[derive(Debug)]
pub struct PlainSocket {
    host: String,
    port: u16,
    stream: Option<TcpStream>,
    blocking: bool,
    no_delay: bool,
    keep_alive: bool,
    read_timeout: Option<Duration>,
}

impl PlainSocket {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            stream: None,
            blocking: true,
            no_delay: false,
            keep_alive: false,
            read_timeout: None,
        }
    }

    /// Wrap an already connected stream (e.g. one accepted by a listener).
    pub fn from_stream(stream: TcpStream) -> io::Result<Self> {
        let peer = stream.peer_addr()?;
        Ok(Self {
            host: peer.ip().to_string(),
            port: peer.port(),
            stream: Some(stream),
            blocking: true,
            no_delay: false,
            keep_alive: false,
            read_timeout: None,
        })
    }

    fn stream(&mut self) -> io::Result<&mut TcpStream> {
        self.stream
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "socket not connected"))
    }
}

/// Open a TCP connection and apply the common options.
pub(super) fn connect_stream(host: &str, port: u16, no_delay: bool) -> io::Result<TcpStream> {
    let stream = TcpStream::connect((host, port))?;
    stream.set_nodelay(no_delay)?;
    debug!(host, port, "TCP connected");
    Ok(stream)
}

/// Read from a std stream into the writable region of `buffer`.
pub(super) fn read_stream<R: Read>(
    reader: &mut R,
    buffer: &mut ByteCursor,
    len: usize,
) -> io::Result<Transfer> {
    let len = len.min(buffer.remaining());
    if len == 0 {
        return Ok(Transfer::Bytes(0));
    }
    match reader.read(&mut buffer.writable()[..len]) {
        Ok(0) => Ok(Transfer::Closed),
        Ok(n) => {
            buffer.advance_position(n);
            Ok(Transfer::Bytes(n))
        }
        Err(e) if is_disconnect(&e) => Ok(Transfer::Closed),
        Err(e) => Err(e),
    }
}

/// Write from the readable region of `buffer` to a std stream.
pub(super) fn write_stream<W: Write>(
    writer: &mut W,
    buffer: &mut ByteCursor,
    len: usize,
) -> io::Result<Transfer> {
    let len = len.min(buffer.remaining());
    if len == 0 {
        return Ok(Transfer::Bytes(0));
    }
    match writer.write(&buffer.readable()[..len]) {
        Ok(n) => {
            buffer.advance_position(n);
            Ok(Transfer::Bytes(n))
        }
        Err(e) if is_disconnect(&e) => Ok(Transfer::Closed),
        Err(e) => Err(e),
    }
}

impl Socket for PlainSocket {
    fn connect(&mut self) -> io::Result<()> {
        let stream = connect_stream(&self.host, self.port, self.no_delay)?;
        apply_keep_alive(&stream, self.keep_alive)?;
        stream.set_read_timeout(self.read_timeout)?;
        stream.set_nonblocking(!self.blocking)?;
        self.stream = Some(stream);
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        if let Some(stream) = self.stream.take() {
            match stream.shutdown(Shutdown::Both) {
                Err(e) if e.kind() != io::ErrorKind::NotConnected => return Err(e),
                _ => {}
            }
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn read(&mut self, buffer: &mut ByteCursor, len: usize) -> io::Result<Transfer> {
        read_stream(self.stream()?, buffer, len)
    }

    fn write(&mut self, buffer: &mut ByteCursor, len: usize) -> io::Result<Transfer> {
        write_stream(self.stream()?, buffer, len)
    }

    fn configure_blocking(&mut self, blocking: bool) -> io::Result<()> {
        self.blocking = blocking;
        if let Some(stream) = &self.stream {
            stream.set_nonblocking(!blocking)?;
        }
        Ok(())
    }

    fn set_tcp_no_delay(&mut self, on: bool) -> io::Result<()> {
        self.no_delay = on;
        if let Some(stream) = &self.stream {
            stream.set_nodelay(on)?;
        }
        Ok(())
    }

    fn set_keep_alive(&mut self, on: bool) -> io::Result<()> {
        self.keep_alive = on;
        if let Some(stream) = &self.stream {
            apply_keep_alive(stream, on)?;
        }
        Ok(())
    }

    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.read_timeout = timeout;
        if let Some(stream) = &self.stream {
            stream.set_read_timeout(timeout)?;
        }
        Ok(())
    }
}

/// SO_KEEPALIVE through socket2; std has no setter for it.
pub(super) fn apply_keep_alive(stream: &TcpStream, on: bool) -> io::Result<()> {
    socket2::SockRef::from(stream).set_keepalive(on)
}

/// Creates [`PlainSocket`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainSocketFactory;

impl SocketFactory for PlainSocketFactory {
    fn create_socket(&self, host: &str, port: u16) -> io::Result<BoxSocket> {
        Ok(Box::new(PlainSocket::new(host, port)))
    }
}
