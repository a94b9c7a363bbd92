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

//! Socket client: one read buffer, one write buffer, and the buffer-cycling
//! discipline that lets partial reads and writes resume without losing bytes.
//!
//! At rest the read buffer is in readable layout (position..limit holds
//! unconsumed bytes) and the write buffer in writable layout (0..position
//! holds bytes not yet sent).

pub mod message;

pub use message::{MessageClient, MessageFraming, MessageStatus};

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::buffer::ByteCursor;
use crate::config::ClientConfig;
use crate::socket::{normalize, BoxSocket, Socket, SocketFactory, Transfer};

pub const DEFAULT_READ_BUFFER_SIZE: usize = 8 * 1024;
pub const DEFAULT_WRITE_BUFFER_SIZE: usize = 2 * 1024;

/// Read from `socket` into `buffer`, preserving unconsumed bytes.
///
/// `buffer` is expected in readable layout. After the call it is readable
/// again and holds the previously unconsumed bytes followed by the new ones.
/// Returns the number of readable bytes, or `Closed`.
pub fn cycle_read<S: Socket + ?Sized>(
    socket: &mut S,
    buffer: &mut ByteCursor,
    len: usize,
) -> io::Result<Transfer> {
    if buffer.position() > 0 {
        if buffer.has_remaining() {
            buffer.compact();
        } else {
            buffer.clear();
        }
    } else {
        // position 0: append after whatever is still unread
        buffer.reverse_flip();
    }
    let len = len.min(buffer.remaining());
    let result = normalize(socket.read(buffer, len));
    // Readable again on every outcome, close and error included.
    buffer.flip();
    match result? {
        Transfer::Closed => Ok(Transfer::Closed),
        Transfer::Bytes(_) => Ok(Transfer::Bytes(buffer.remaining())),
    }
}

/// Write pending bytes of `buffer` to `socket`.
///
/// `buffer` is expected in writable layout with the bytes to send in
/// `0..position`. Unsent bytes are kept at the front so that the caller can
/// keep appending. Returns the bytes written by this call, or `Closed`.
pub fn cycle_write<S: Socket + ?Sized>(
    socket: &mut S,
    buffer: &mut ByteCursor,
    len: usize,
) -> io::Result<Transfer> {
    buffer.flip();
    let len = len.min(buffer.remaining());
    let result = normalize(socket.write(buffer, len));
    match result {
        Ok(Transfer::Bytes(n)) if n > 0 => {
            if buffer.has_remaining() {
                buffer.compact();
            } else {
                buffer.clear();
            }
        }
        _ => buffer.reverse_flip(),
    }
    result
}

/// Buffered client over a [`Socket`].
pub struct SocketClient {
    socket: BoxSocket,
    read_buffer: ByteCursor,
    write_buffer: ByteCursor,
}

impl SocketClient {
    pub fn new(socket: BoxSocket, read_buffer_size: usize, write_buffer_size: usize) -> Self {
        let mut client = Self {
            socket,
            read_buffer: ByteCursor::with_capacity(read_buffer_size),
            write_buffer: ByteCursor::with_capacity(write_buffer_size),
        };
        client.clear_buffers();
        client
    }

    pub fn builder() -> SocketClientBuilder {
        SocketClientBuilder::default()
    }

    pub fn connect(&mut self) -> io::Result<()> {
        self.socket.connect()
    }

    pub fn close(&mut self) -> io::Result<()> {
        self.socket.close()
    }

    /// Close, clear both buffers and connect again.
    pub fn reconnect(&mut self) -> io::Result<()> {
        if let Err(e) = self.socket.close() {
            debug!("close before reconnect failed: {}", e);
        }
        self.clear_buffers();
        self.socket.connect()
    }

    pub fn is_connected(&self) -> bool {
        self.socket.is_connected()
    }

    pub fn configure_blocking(&mut self, blocking: bool) -> io::Result<()> {
        self.socket.configure_blocking(blocking)
    }

    pub fn set_tcp_no_delay(&mut self, on: bool) -> io::Result<()> {
        self.socket.set_tcp_no_delay(on)
    }

    pub fn set_keep_alive(&mut self, on: bool) -> io::Result<()> {
        self.socket.set_keep_alive(on)
    }

    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.socket.set_read_timeout(timeout)
    }

    /// Read as much as fits into the read buffer.
    pub fn read(&mut self) -> io::Result<Transfer> {
        self.read_len(usize::MAX)
    }

    /// Read at most `len` new bytes into the read buffer.
    pub fn read_len(&mut self, len: usize) -> io::Result<Transfer> {
        cycle_read(&mut self.socket, &mut self.read_buffer, len)
    }

    /// Read into a caller-owned buffer with the same discipline.
    pub fn read_into(&mut self, buffer: &mut ByteCursor, len: usize) -> io::Result<Transfer> {
        cycle_read(&mut self.socket, buffer, len)
    }

    /// Write as much of the write buffer as the socket accepts.
    pub fn write(&mut self) -> io::Result<Transfer> {
        self.write_len(usize::MAX)
    }

    /// Write at most `len` bytes of the write buffer.
    pub fn write_len(&mut self, len: usize) -> io::Result<Transfer> {
        cycle_write(&mut self.socket, &mut self.write_buffer, len)
    }

    /// Write from a caller-owned buffer with the same discipline.
    pub fn write_from(&mut self, buffer: &mut ByteCursor, len: usize) -> io::Result<Transfer> {
        cycle_write(&mut self.socket, buffer, len)
    }

    /// Write until the write buffer is drained. Returns false if the peer closed.
    pub fn flush(&mut self) -> io::Result<bool> {
        while self.write_buffer.position() > 0 {
            if self.write()?.is_closed() {
                return Ok(false);
            }
            std::thread::yield_now();
        }
        Ok(true)
    }

    /// Read buffer empty and readable, write buffer empty and writable.
    pub fn clear_buffers(&mut self) {
        self.read_buffer.clear();
        self.read_buffer.set_limit(0);
        self.write_buffer.clear();
    }

    pub fn read_buffer(&self) -> &ByteCursor {
        &self.read_buffer
    }

    pub fn read_buffer_mut(&mut self) -> &mut ByteCursor {
        &mut self.read_buffer
    }

    pub fn write_buffer(&self) -> &ByteCursor {
        &self.write_buffer
    }

    pub fn write_buffer_mut(&mut self) -> &mut ByteCursor {
        &mut self.write_buffer
    }

    pub fn read_buffer_size(&self) -> usize {
        self.read_buffer.capacity()
    }

    pub fn write_buffer_size(&self) -> usize {
        self.write_buffer.capacity()
    }
}

impl std::fmt::Debug for SocketClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketClient")
            .field("connected", &self.is_connected())
            .field("read_buffer", &self.read_buffer)
            .field("write_buffer", &self.write_buffer)
            .finish()
    }
}

/// Builder for [`SocketClient`].
#[derive(Default)]
pub struct SocketClientBuilder {
    host: Option<String>,
    port: Option<u16>,
    factory: Option<Arc<dyn SocketFactory>>,
    config: ClientConfig,
}

impl SocketClientBuilder {
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Socket factory; defaults to the one for the configured transport.
    pub fn socket_factory(mut self, factory: Arc<dyn SocketFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.config.read_buffer_size = size;
        self
    }

    pub fn write_buffer_size(mut self, size: usize) -> Self {
        self.config.write_buffer_size = size;
        self
    }

    /// Create the socket and apply the socket options. Does not connect.
    pub fn build(self) -> crate::Result<SocketClient> {
        let host = self
            .host
            .ok_or_else(|| crate::Error::Config("socket client requires a host".into()))?;
        let port = self
            .port
            .ok_or_else(|| crate::Error::Config("socket client requires a port".into()))?;
        let factory = self
            .factory
            .unwrap_or_else(|| self.config.transport.factory());
        let mut socket = factory.create_socket(&host, port)?;
        socket.set_tcp_no_delay(self.config.tcp_no_delay)?;
        socket.set_keep_alive(self.config.keep_alive)?;
        Ok(SocketClient::new(
            socket,
            self.config.read_buffer_size,
            self.config.write_buffer_size,
        ))
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedSocket;
    use super::*;
    use proptest::prelude::*;

    fn client(socket: &ScriptedSocket, read: usize, write: usize) -> SocketClient {
        SocketClient::new(Box::new(socket.clone()), read, write)
    }

    #[test]
    fn initial_layout() {
        let socket = ScriptedSocket::new();
        let c = client(&socket, DEFAULT_READ_BUFFER_SIZE, DEFAULT_WRITE_BUFFER_SIZE);
        assert_eq!(c.read_buffer().position(), 0);
        assert_eq!(c.read_buffer().limit(), 0);
        assert_eq!(c.write_buffer().position(), 0);
        assert_eq!(c.write_buffer().limit(), DEFAULT_WRITE_BUFFER_SIZE);
    }

    #[test]
    fn read_flips_new_bytes() {
        let socket = ScriptedSocket::new();
        let mut c = client(&socket, 64, 64);
        socket.push_inbound(b"hello");
        assert_eq!(c.read().unwrap(), Transfer::Bytes(5));
        assert_eq!(c.read_buffer().readable(), b"hello");
    }

    #[test]
    fn read_with_nothing_available_leaves_empty_buffer() {
        let socket = ScriptedSocket::new();
        let mut c = client(&socket, 64, 64);
        assert_eq!(c.read().unwrap(), Transfer::Bytes(0));
        assert_eq!(c.read_buffer().limit(), 0);
    }

    #[test]
    fn unconsumed_bytes_survive_next_read() {
        let socket = ScriptedSocket::new();
        let mut c = client(&socket, 64, 64);
        socket.push_inbound(b"abc");
        c.read().unwrap();
        // consume one byte, leave two
        c.read_buffer_mut().advance_position(1);
        socket.push_inbound(b"def");
        assert_eq!(c.read().unwrap(), Transfer::Bytes(5));
        assert_eq!(c.read_buffer().readable(), b"bcdef");
        assert_eq!(c.read_buffer().position(), 0);
    }

    #[test]
    fn unread_bytes_at_position_zero_are_appended_to() {
        let socket = ScriptedSocket::new();
        let mut c = client(&socket, 64, 64);
        socket.push_inbound(b"abc");
        c.read().unwrap();
        socket.push_inbound(b"de");
        assert_eq!(c.read().unwrap(), Transfer::Bytes(5));
        assert_eq!(c.read_buffer().readable(), b"abcde");
    }

    #[test]
    fn fully_consumed_buffer_is_cleared() {
        let socket = ScriptedSocket::new();
        let mut c = client(&socket, 8, 8);
        socket.push_inbound(b"abcdefgh");
        c.read().unwrap();
        c.read_buffer_mut().advance_position(8);
        socket.push_inbound(b"ijklmnop");
        assert_eq!(c.read().unwrap(), Transfer::Bytes(8));
        assert_eq!(c.read_buffer().readable(), b"ijklmnop");
    }

    #[test]
    fn full_unread_buffer_is_not_overwritten() {
        let socket = ScriptedSocket::new();
        let mut c = client(&socket, 4, 4);
        socket.push_inbound(b"wxyz");
        c.read().unwrap();
        socket.push_inbound(b"more");
        assert_eq!(c.read().unwrap(), Transfer::Bytes(4));
        assert_eq!(c.read_buffer().readable(), b"wxyz");
    }

    #[test]
    fn read_reports_peer_close() {
        let socket = ScriptedSocket::new();
        let mut c = client(&socket, 16, 16);
        socket.wire.lock().unwrap().closed_by_peer = true;
        assert_eq!(c.read().unwrap(), Transfer::Closed);
    }

    #[test]
    fn unread_bytes_stay_readable_after_close() {
        let socket = ScriptedSocket::new();
        let mut c = client(&socket, 16, 16);
        socket.push_inbound(&[0x81, 0x05, b'h']);
        assert_eq!(c.read().unwrap(), Transfer::Bytes(3));
        socket.wire.lock().unwrap().read_eof = true;
        for _ in 0..3 {
            assert_eq!(c.read().unwrap(), Transfer::Closed);
            assert_eq!(c.read_buffer().position(), 0);
            assert_eq!(c.read_buffer().readable(), &[0x81, 0x05, b'h']);
        }
    }

    #[test]
    fn close_on_empty_buffer_leaves_nothing_readable() {
        let socket = ScriptedSocket::new();
        let mut c = client(&socket, 16, 16);
        socket.wire.lock().unwrap().read_eof = true;
        assert_eq!(c.read().unwrap(), Transfer::Closed);
        assert_eq!(c.read().unwrap(), Transfer::Closed);
        assert_eq!(c.read_buffer().limit(), 0);
        assert!(!c.read_buffer().has_remaining());
    }

    #[test]
    fn partial_write_keeps_remainder_at_front() {
        let mut socket = ScriptedSocket::new();
        socket.write_chunk = 50;
        let mut c = client(&socket, 16, DEFAULT_WRITE_BUFFER_SIZE);
        c.write_buffer_mut().put_slice(&[7u8; 100]).unwrap();
        assert_eq!(c.write().unwrap(), Transfer::Bytes(50));
        assert_eq!(c.write_buffer().position(), 50);
        assert_eq!(c.write_buffer().remaining(), DEFAULT_WRITE_BUFFER_SIZE - 50);
    }

    #[test]
    fn zero_byte_write_allows_appending() {
        let mut socket = ScriptedSocket::new();
        socket.write_chunk = 0;
        let mut c = client(&socket, 16, 32);
        c.write_buffer_mut().put_slice(b"abc").unwrap();
        assert_eq!(c.write().unwrap(), Transfer::Bytes(0));
        assert_eq!(c.write_buffer().position(), 3);
        assert_eq!(c.write_buffer().limit(), 32);
        c.write_buffer_mut().put_slice(b"de").unwrap();
        assert_eq!(c.write_buffer().position(), 5);
    }

    #[test]
    fn drained_write_clears_buffer() {
        let socket = ScriptedSocket::new();
        let mut c = client(&socket, 16, 32);
        c.write_buffer_mut().put_slice(b"ping").unwrap();
        assert_eq!(c.write().unwrap(), Transfer::Bytes(4));
        assert_eq!(c.write_buffer().position(), 0);
        assert_eq!(socket.outbound(), b"ping");
    }

    #[test]
    fn read_into_external_buffer() {
        let socket = ScriptedSocket::new();
        let mut c = client(&socket, 16, 16);
        let mut external = ByteCursor::with_capacity(8);
        external.set_limit(0);
        socket.push_inbound(b"xyz");
        assert_eq!(c.read_into(&mut external, 2).unwrap(), Transfer::Bytes(2));
        assert_eq!(external.readable(), b"xy");
    }

    #[test]
    fn reconnect_clears_buffers() {
        let socket = ScriptedSocket::new();
        let mut c = client(&socket, 16, 16);
        socket.push_inbound(b"stale");
        c.read().unwrap();
        c.write_buffer_mut().put_slice(b"pending").unwrap();
        c.reconnect().unwrap();
        assert!(c.is_connected());
        assert_eq!(c.read_buffer().remaining(), 0);
        assert_eq!(c.write_buffer().position(), 0);
    }

    #[test]
    fn builder_requires_host() {
        let err = SocketClient::builder().port(80).build().unwrap_err();
        assert!(matches!(err, crate::Error::Config(_)));
    }

    proptest! {
        #[test]
        fn writes_drain_in_ceil_n_over_k_calls(
            data in proptest::collection::vec(any::<u8>(), 1..2048),
            k in 1usize..300,
        ) {
            let mut socket = ScriptedSocket::new();
            socket.write_chunk = k;
            let mut c = client(&socket, 16, 2048);
            c.write_buffer_mut().put_slice(&data).unwrap();
            while c.write_buffer().position() > 0 {
                c.write().unwrap();
            }
            let wire = socket.wire.lock().unwrap();
            prop_assert_eq!(wire.write_calls, (data.len() + k - 1) / k);
            prop_assert_eq!(&wire.outbound, &data);
        }

        #[test]
        fn interleaved_appends_and_partial_writes_preserve_order(
            chunks in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..64), 1..20),
            k in 0usize..40,
        ) {
            let mut socket = ScriptedSocket::new();
            socket.write_chunk = k;
            let mut c = client(&socket, 16, 4096);
            let mut expected = Vec::new();
            for chunk in &chunks {
                c.write_buffer_mut().put_slice(chunk).unwrap();
                expected.extend_from_slice(chunk);
                c.write().unwrap();
            }
            let pending = c.write_buffer().filled()[..c.write_buffer().position()].to_vec();
            let mut rebuilt = socket.outbound();
            rebuilt.extend_from_slice(&pending);
            prop_assert_eq!(rebuilt, expected);
        }

        #[test]
        fn chunked_reads_reassemble_stream(
            data in proptest::collection::vec(any::<u8>(), 0..1024),
            cuts in proptest::collection::vec(1usize..64, 1..64),
            consume in 1usize..64,
        ) {
            let socket = ScriptedSocket::new();
            let mut offset = 0;
            for cut in cuts.iter().cycle() {
                if offset >= data.len() { break; }
                let end = (offset + cut).min(data.len());
                socket.push_inbound(&data[offset..end]);
                offset = end;
            }
            socket.wire.lock().unwrap().read_eof = true;
            let mut c = client(&socket, 128, 16);
            let mut received = Vec::new();
            for _ in 0..(data.len() * 2 + 4) {
                let before = c.read_buffer().remaining();
                if c.read().unwrap().is_closed() {
                    prop_assert_eq!(c.read_buffer().remaining(), before);
                }
                let take = consume.min(c.read_buffer().remaining());
                received.extend_from_slice(&c.read_buffer().readable()[..take]);
                c.read_buffer_mut().advance_position(take);
            }
            received.extend_from_slice(c.read_buffer().readable());
            prop_assert_eq!(received, data);
        }
    }
}
