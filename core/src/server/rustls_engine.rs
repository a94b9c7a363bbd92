/*
 * rustls_engine.rs
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

//! [`TlsEngine`] over a rustls server connection. rustls runs its crypto
//! inline, so it never hands out delegated tasks.

use std::io::{self, Read, Write};
use std::sync::Arc;

use rustls::ServerConnection;

use super::engine::{
    DelegatedTask, EngineFactory, EngineResult, EngineStatus, HandshakeStatus, TlsEngine,
};
use crate::buffer::ByteCursor;
use crate::config::ServerTlsConfig;
use crate::error::{Error, Result};

/// Largest plaintext fragment of one TLS record.
const MAX_FRAGMENT: usize = 16 * 1024;
/// Largest TLS record on the wire, with header, padding and MAC.
const MAX_PACKET: usize = 16_709;

pub struct RustlsEngine {
    conn: ServerConnection,
    inbound_done: bool,
    outbound_closed: bool,
    /// close_notify received.
    peer_closed: bool,
}

impl RustlsEngine {
    pub fn new(config: Arc<rustls::ServerConfig>) -> Result<Self> {
        Ok(Self {
            conn: ServerConnection::new(config)?,
            inbound_done: false,
            outbound_closed: false,
            peer_closed: false,
        })
    }

    pub fn connection(&self) -> &ServerConnection {
        &self.conn
    }

    fn drain_plaintext(&mut self, dst: &mut ByteCursor) -> Result<usize> {
        let mut produced = 0;
        while dst.has_remaining() && !self.peer_closed {
            match self.conn.reader().read(dst.writable()) {
                Ok(0) => self.peer_closed = true,
                Ok(n) => {
                    dst.advance_position(n);
                    produced += n;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(produced)
    }

    fn result(
        &self,
        status: EngineStatus,
        was_handshaking: bool,
        consumed: usize,
        produced: usize,
    ) -> EngineResult {
        let mut handshake_status = self.handshake_status();
        if was_handshaking && handshake_status == HandshakeStatus::NotHandshaking {
            handshake_status = HandshakeStatus::Finished;
        }
        EngineResult {
            status,
            handshake_status,
            bytes_consumed: consumed,
            bytes_produced: produced,
        }
    }
}

impl TlsEngine for RustlsEngine {
    fn begin_handshake(&mut self) -> Result<()> {
        Ok(())
    }

    fn handshake_status(&self) -> HandshakeStatus {
        if self.conn.wants_write() {
            HandshakeStatus::NeedWrap
        } else if !self.outbound_closed && self.conn.is_handshaking() {
            HandshakeStatus::NeedUnwrap
        } else {
            HandshakeStatus::NotHandshaking
        }
    }

    fn wrap(&mut self, src: &mut ByteCursor, dst: &mut ByteCursor) -> Result<EngineResult> {
        let was_handshaking = self.conn.is_handshaking();
        if dst.remaining() < MAX_PACKET {
            return Ok(self.result(EngineStatus::BufferOverflow, was_handshaking, 0, 0));
        }
        let mut consumed = 0;
        if !was_handshaking && !self.outbound_closed && src.has_remaining() {
            let len = src.remaining().min(MAX_FRAGMENT);
            consumed = self.conn.writer().write(&src.readable()[..len])?;
            src.advance_position(consumed);
        }
        let mut produced = 0;
        while self.conn.wants_write() && dst.has_remaining() {
            let n = self.conn.write_tls(&mut dst.writable())?;
            if n == 0 {
                break;
            }
            dst.advance_position(n);
            produced += n;
        }
        let status = if self.outbound_closed && !self.conn.wants_write() {
            EngineStatus::Closed
        } else {
            EngineStatus::Ok
        };
        Ok(self.result(status, was_handshaking, consumed, produced))
    }

    fn unwrap(&mut self, src: &mut ByteCursor, dst: &mut ByteCursor) -> Result<EngineResult> {
        let was_handshaking = self.conn.is_handshaking();
        if self.inbound_done {
            return Ok(self.result(EngineStatus::Closed, was_handshaking, 0, 0));
        }
        let mut produced = self.drain_plaintext(dst)?;
        let mut consumed = 0;
        // An empty slice would read as EOF.
        if dst.has_remaining() && src.has_remaining() && !self.peer_closed {
            consumed = self.conn.read_tls(&mut src.readable())?;
            src.advance_position(consumed);
            self.conn.process_new_packets()?;
            produced += self.drain_plaintext(dst)?;
        }
        let status = if self.peer_closed && produced == 0 {
            self.inbound_done = true;
            EngineStatus::Closed
        } else if consumed == 0 && produced == 0 {
            if dst.has_remaining() {
                EngineStatus::BufferUnderflow
            } else {
                EngineStatus::BufferOverflow
            }
        } else {
            EngineStatus::Ok
        };
        Ok(self.result(status, was_handshaking, consumed, produced))
    }

    fn delegated_task(&mut self) -> Option<DelegatedTask> {
        None
    }

    fn close_inbound(&mut self) -> Result<()> {
        self.inbound_done = true;
        if self.peer_closed {
            Ok(())
        } else {
            Err(Error::Tls(
                "inbound closed before receiving close_notify".into(),
            ))
        }
    }

    fn close_outbound(&mut self) {
        if !self.outbound_closed {
            self.conn.send_close_notify();
            self.outbound_closed = true;
        }
    }

    fn is_inbound_done(&self) -> bool {
        self.inbound_done
    }

    fn is_outbound_done(&self) -> bool {
        self.outbound_closed && !self.conn.wants_write()
    }

    fn application_buffer_size(&self) -> usize {
        MAX_FRAGMENT
    }

    fn packet_buffer_size(&self) -> usize {
        MAX_PACKET
    }
}

/// Creates a [`RustlsEngine`] per connection from a shared server config.
#[derive(Clone)]
pub struct RustlsAcceptor {
    config: Arc<rustls::ServerConfig>,
}

impl RustlsAcceptor {
    pub fn new(config: Arc<rustls::ServerConfig>) -> Self {
        Self { config }
    }

    /// Load the certificate chain and key named in `tls`.
    pub fn from_config(tls: &ServerTlsConfig) -> Result<Self> {
        Ok(Self::new(tls.load()?))
    }
}

impl EngineFactory for RustlsAcceptor {
    type Engine = RustlsEngine;

    fn create_engine(&self) -> Result<RustlsEngine> {
        RustlsEngine::new(self.config.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net;
    use rustls::pki_types::ServerName;
    use rustls::{ClientConnection, RootCertStore};
    use std::path::{Path, PathBuf};

    fn fixture(name: &str) -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
    }

    fn acceptor() -> RustlsAcceptor {
        RustlsAcceptor::from_config(&ServerTlsConfig {
            cert_path: fixture("cert.pem"),
            key_path: fixture("key.pem"),
        })
        .unwrap()
    }

    fn client() -> ClientConnection {
        let mut roots = RootCertStore::empty();
        for cert in net::load_certificates(&fixture("ca.pem")).unwrap() {
            roots.add(cert).unwrap();
        }
        let name = ServerName::try_from("localhost").unwrap();
        ClientConnection::new(net::client_config(roots), name).unwrap()
    }

    /// Feed everything the client has queued to the server; returns the plaintext.
    fn client_to_server(client: &mut ClientConnection, server: &mut RustlsEngine) -> Vec<u8> {
        let mut wire = Vec::new();
        while client.wants_write() {
            client.write_tls(&mut wire).unwrap();
        }
        let mut src = ByteCursor::from_slice(&wire);
        let mut dst = ByteCursor::with_capacity(server.application_buffer_size());
        while src.has_remaining() {
            let result = server.unwrap(&mut src, &mut dst).unwrap();
            assert_eq!(result.status, EngineStatus::Ok);
        }
        dst.flip();
        dst.readable().to_vec()
    }

    /// Wrap `plaintext` plus anything queued and hand it to the client.
    fn server_to_client(server: &mut RustlsEngine, client: &mut ClientConnection, plaintext: &[u8]) {
        let mut src = ByteCursor::from_slice(plaintext);
        loop {
            let mut dst = ByteCursor::with_capacity(server.packet_buffer_size());
            server.wrap(&mut src, &mut dst).unwrap();
            dst.flip();
            let mut bytes = dst.readable();
            while !bytes.is_empty() {
                client.read_tls(&mut bytes).unwrap();
                client.process_new_packets().unwrap();
            }
            if !src.has_remaining() && server.handshake_status() != HandshakeStatus::NeedWrap {
                break;
            }
        }
    }

    fn handshake(server: &mut RustlsEngine, client: &mut ClientConnection) {
        for _ in 0..8 {
            client_to_server(client, server);
            server_to_client(server, client, b"");
            if !client.is_handshaking() && server.handshake_status() == HandshakeStatus::NotHandshaking {
                return;
            }
        }
        panic!("handshake did not complete");
    }

    #[test]
    fn sizes_fit_one_record() {
        let engine = acceptor().create_engine().unwrap();
        assert_eq!(engine.application_buffer_size(), 16384);
        assert_eq!(engine.packet_buffer_size(), 16709);
    }

    #[test]
    fn fresh_engine_waits_for_client_hello() {
        let mut engine = acceptor().create_engine().unwrap();
        assert_eq!(engine.handshake_status(), HandshakeStatus::NeedUnwrap);
        let mut src = ByteCursor::with_capacity(0);
        let mut dst = ByteCursor::with_capacity(MAX_FRAGMENT);
        let result = engine.unwrap(&mut src, &mut dst).unwrap();
        assert_eq!(result.status, EngineStatus::BufferUnderflow);
        assert!(engine.delegated_task().is_none());
    }

    #[test]
    fn handshake_and_application_data() {
        let mut server = acceptor().create_engine().unwrap();
        let mut client = client();
        handshake(&mut server, &mut client);

        client.writer().write_all(b"hello").unwrap();
        assert_eq!(client_to_server(&mut client, &mut server), b"hello");

        server_to_client(&mut server, &mut client, b"world");
        let mut received = [0u8; 5];
        client.reader().read_exact(&mut received).unwrap();
        assert_eq!(&received, b"world");
    }

    #[test]
    fn small_destination_overflows() {
        let mut server = acceptor().create_engine().unwrap();
        let mut src = ByteCursor::with_capacity(0);
        let mut dst = ByteCursor::with_capacity(100);
        let result = server.wrap(&mut src, &mut dst).unwrap();
        assert_eq!(result.status, EngineStatus::BufferOverflow);
    }

    #[test]
    fn wrap_takes_one_record_of_plaintext() {
        let mut server = acceptor().create_engine().unwrap();
        let mut client = client();
        handshake(&mut server, &mut client);

        let message = vec![0x5a; 40_000];
        let mut src = ByteCursor::from_slice(&message);
        let mut dst = ByteCursor::with_capacity(MAX_PACKET);
        let result = server.wrap(&mut src, &mut dst).unwrap();
        assert_eq!(result.status, EngineStatus::Ok);
        assert_eq!(result.bytes_consumed, MAX_FRAGMENT);
        assert!(result.bytes_produced > MAX_FRAGMENT);
        assert_eq!(src.remaining(), 40_000 - MAX_FRAGMENT);

        dst.flip();
        let mut bytes = dst.readable();
        while !bytes.is_empty() {
            client.read_tls(&mut bytes).unwrap();
            client.process_new_packets().unwrap();
        }
        let mut received = vec![0u8; MAX_FRAGMENT];
        client.reader().read_exact(&mut received).unwrap();
        assert_eq!(received, &message[..MAX_FRAGMENT]);
    }

    #[test]
    fn close_notify_both_ways() {
        let mut server = acceptor().create_engine().unwrap();
        let mut client = client();
        handshake(&mut server, &mut client);

        server.close_outbound();
        assert!(!server.is_outbound_done());
        let mut src = ByteCursor::with_capacity(0);
        let mut dst = ByteCursor::with_capacity(MAX_PACKET);
        let result = server.wrap(&mut src, &mut dst).unwrap();
        assert_eq!(result.status, EngineStatus::Closed);
        assert!(server.is_outbound_done());
        dst.flip();
        client.read_tls(&mut dst.readable()).unwrap();
        let state = client.process_new_packets().unwrap();
        assert!(state.peer_has_closed());

        client.send_close_notify();
        assert!(client_to_server_closed(&mut client, &mut server));
        assert!(server.close_inbound().is_ok());
    }

    fn client_to_server_closed(client: &mut ClientConnection, server: &mut RustlsEngine) -> bool {
        let mut wire = Vec::new();
        while client.wants_write() {
            client.write_tls(&mut wire).unwrap();
        }
        let mut src = ByteCursor::from_slice(&wire);
        let mut dst = ByteCursor::with_capacity(MAX_FRAGMENT);
        let first = server.unwrap(&mut src, &mut dst).unwrap();
        let second = server.unwrap(&mut src, &mut dst).unwrap();
        first.status == EngineStatus::Closed || second.status == EngineStatus::Closed
    }

    #[test]
    fn close_inbound_without_close_notify_is_error() {
        let mut server = acceptor().create_engine().unwrap();
        assert!(server.close_inbound().is_err());
        assert!(server.is_inbound_done());
    }

    #[test]
    fn garbage_is_tls_error() {
        let mut server = acceptor().create_engine().unwrap();
        let mut src = ByteCursor::from_slice(b"GET / HTTP/1.1\r\n\r\n");
        let mut dst = ByteCursor::with_capacity(MAX_FRAGMENT);
        assert!(matches!(
            server.unwrap(&mut src, &mut dst),
            Err(Error::Tls(_))
        ));
    }
}
