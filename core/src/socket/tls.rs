/*
 * tls.rs
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

//! TLS client socket: rustls `ClientConnection` over a std `TcpStream`.
//!
//! The TCP connect and the TLS handshake are performed in blocking mode; the
//! configured blocking flag is applied once the session is established.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::Arc;
use std::time::Duration;

use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ClientConnection};
use tracing::{debug, warn};

use super::plain::{apply_keep_alive, connect_stream};
use super::{is_disconnect, BoxSocket, Socket, SocketFactory, Transfer};
use crate::buffer::ByteCursor;
use crate::net::default_client_config;

/// TLS-encrypted TCP socket.
pub struct TlsSocket {
    host: String,
    port: u16,
    config: Arc<ClientConfig>,
    session: Option<(ClientConnection, TcpStream)>,
    blocking: bool,
    no_delay: bool,
    keep_alive: bool,
    read_timeout: Option<Duration>,
}

impl TlsSocket {
    pub fn new(host: impl Into<String>, port: u16, config: Arc<ClientConfig>) -> Self {
        Self {
            host: host.into(),
            port,
            config,
            session: None,
            blocking: true,
            no_delay: false,
            keep_alive: false,
            read_timeout: None,
        }
    }

    fn session(&mut self) -> io::Result<(&mut ClientConnection, &mut TcpStream)> {
        match self.session.as_mut() {
            Some((conn, stream)) => Ok((conn, stream)),
            None => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "socket not connected",
            )),
        }
    }
}

/// Push queued TLS records to the stream; stops quietly when the stream would block.
fn flush_tls(conn: &mut ClientConnection, stream: &mut TcpStream) -> io::Result<()> {
    while conn.wants_write() {
        match conn.write_tls(stream) {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

impl Socket for TlsSocket {
    fn connect(&mut self) -> io::Result<()> {
        let mut stream = connect_stream(&self.host, self.port, self.no_delay)?;
        apply_keep_alive(&stream, self.keep_alive)?;
        let server_name = ServerName::try_from(self.host.clone())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "invalid host name"))?;
        let mut conn = ClientConnection::new(self.config.clone(), server_name)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        while conn.is_handshaking() {
            conn.complete_io(&mut stream)
                .map_err(|e| io::Error::new(io::ErrorKind::ConnectionRefused, e))?;
        }
        stream.set_read_timeout(self.read_timeout)?;
        stream.set_nonblocking(!self.blocking)?;
        debug!(host = %self.host, port = self.port, "TLS session established");
        self.session = Some((conn, stream));
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        if let Some((mut conn, mut stream)) = self.session.take() {
            conn.send_close_notify();
            if let Err(e) = flush_tls(&mut conn, &mut stream) {
                warn!("failed to send close_notify: {}", e);
            }
            match stream.shutdown(Shutdown::Both) {
                Err(e) if e.kind() != io::ErrorKind::NotConnected => return Err(e),
                _ => {}
            }
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    fn read(&mut self, buffer: &mut ByteCursor, len: usize) -> io::Result<Transfer> {
        let (conn, stream) = self.session()?;
        let len = len.min(buffer.remaining());
        if len == 0 {
            return Ok(Transfer::Bytes(0));
        }
        loop {
            match conn.reader().read(&mut buffer.writable()[..len]) {
                Ok(0) => return Ok(Transfer::Closed),
                Ok(n) => {
                    buffer.advance_position(n);
                    return Ok(Transfer::Bytes(n));
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) if is_disconnect(&e) => return Ok(Transfer::Closed),
                Err(e) => return Err(e),
            }
            // No plaintext buffered: pull more records from the stream.
            match conn.read_tls(stream) {
                Ok(0) => return Ok(Transfer::Closed),
                Ok(_) => {
                    conn.process_new_packets()
                        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                    flush_tls(conn, stream)?;
                }
                Err(e) if is_disconnect(&e) => return Ok(Transfer::Closed),
                Err(e) => return Err(e),
            }
        }
    }

    fn write(&mut self, buffer: &mut ByteCursor, len: usize) -> io::Result<Transfer> {
        let (conn, stream) = self.session()?;
        let len = len.min(buffer.remaining());
        // Pending ciphertext from an earlier call goes out first.
        if let Err(e) = flush_tls(conn, stream) {
            return if is_disconnect(&e) {
                Ok(Transfer::Closed)
            } else {
                Err(e)
            };
        }
        if len == 0 {
            return Ok(Transfer::Bytes(0));
        }
        let n = conn.writer().write(&buffer.readable()[..len])?;
        buffer.advance_position(n);
        match flush_tls(conn, stream) {
            Ok(()) => Ok(Transfer::Bytes(n)),
            Err(e) if is_disconnect(&e) => Ok(Transfer::Closed),
            Err(e) => Err(e),
        }
    }

    fn configure_blocking(&mut self, blocking: bool) -> io::Result<()> {
        self.blocking = blocking;
        if let Some((_, stream)) = &self.session {
            stream.set_nonblocking(!blocking)?;
        }
        Ok(())
    }

    fn set_tcp_no_delay(&mut self, on: bool) -> io::Result<()> {
        self.no_delay = on;
        if let Some((_, stream)) = &self.session {
            stream.set_nodelay(on)?;
        }
        Ok(())
    }

    fn set_keep_alive(&mut self, on: bool) -> io::Result<()> {
        self.keep_alive = on;
        if let Some((_, stream)) = &self.session {
            apply_keep_alive(stream, on)?;
        }
        Ok(())
    }

    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.read_timeout = timeout;
        if let Some((_, stream)) = &self.session {
            stream.set_read_timeout(timeout)?;
        }
        Ok(())
    }
}

/// Creates [`TlsSocket`]s sharing one client configuration.
#[derive(Clone)]
pub struct TlsSocketFactory {
    config: Arc<ClientConfig>,
}

impl TlsSocketFactory {
    pub fn new(config: Arc<ClientConfig>) -> Self {
        Self { config }
    }
}

impl Default for TlsSocketFactory {
    fn default() -> Self {
        Self::new(default_client_config())
    }
}

impl SocketFactory for TlsSocketFactory {
    fn create_socket(&self, host: &str, port: u16) -> io::Result<BoxSocket> {
        Ok(Box::new(TlsSocket::new(host, port, self.config.clone())))
    }
}
