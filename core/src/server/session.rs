/*
 * session.rs
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

//! Per-connection TLS driving loops over a [`TlsEngine`] and a non-blocking
//! [`Socket`].
//!
//! Four buffers: `my_app`/`my_net` for the outbound direction and
//! `peer_net`/`peer_app` for the inbound one. `peer_net` and `peer_app` stay
//! in writable layout between calls so ciphertext of a partial record and
//! plaintext produced during the handshake are kept. Buffers only grow.

use std::io;

use bytes::BytesMut;
use tracing::{debug, trace, warn};

use super::buffers::{enlarge, grow_for_underflow};
use super::engine::{DelegatedTask, EngineStatus, HandshakeStatus, TlsEngine};
use super::worker::{DelegatedTaskWorker, Submission, TaskTicket};
use crate::buffer::ByteCursor;
use crate::socket::{is_disconnect, normalize, Socket, Transfer};

/// Result of one [`TlsSession::handshake`] call.
#[derive(Debug)]
pub enum HandshakeProgress {
    /// Ready for application data.
    Finished,
    /// Call again once the socket is readable.
    WantRead,
    /// Call again once the ticket completes.
    AwaitingTasks(TaskTicket),
    /// The worker queue is full; call again after giving other work a turn.
    QueueFull,
    /// The connection must be closed.
    Failed,
}

/// Result of one [`TlsSession::read`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Still open; wait for the next readiness notification.
    Open,
    /// The peer closed the connection or the engine failed.
    Closed,
}

/// TLS state and buffers of one accepted connection.
pub struct TlsSession<E> {
    engine: E,
    my_app: ByteCursor,
    my_net: ByteCursor,
    peer_app: ByteCursor,
    peer_net: ByteCursor,
    /// Status to act on next; None means ask the engine.
    status: Option<HandshakeStatus>,
    /// Tasks the worker could not queue yet.
    pending_tasks: Vec<DelegatedTask>,
}

impl<E: TlsEngine> TlsSession<E> {
    pub fn new(engine: E) -> Self {
        let app = engine.application_buffer_size();
        let packet = engine.packet_buffer_size();
        let mut my_app = ByteCursor::with_capacity(app);
        my_app.set_limit(0);
        Self {
            engine,
            my_app,
            my_net: ByteCursor::with_capacity(packet),
            peer_app: ByteCursor::with_capacity(app),
            peer_net: ByteCursor::with_capacity(packet),
            status: None,
            pending_tasks: Vec::new(),
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn begin_handshake(&mut self) -> crate::Result<()> {
        self.engine.begin_handshake()?;
        self.status = None;
        Ok(())
    }

    /// Capacities of my_app, my_net, peer_app and peer_net.
    pub fn buffer_capacities(&self) -> [usize; 4] {
        [
            self.my_app.capacity(),
            self.my_net.capacity(),
            self.peer_app.capacity(),
            self.peer_net.capacity(),
        ]
    }

    /// Drive the handshake as far as the socket allows.
    pub fn handshake<S: Socket + ?Sized>(
        &mut self,
        socket: &mut S,
        worker: &DelegatedTaskWorker,
    ) -> io::Result<HandshakeProgress> {
        loop {
            let status = match self.status.take() {
                Some(status) => status,
                None => self.engine.handshake_status(),
            };
            trace!(?status, "handshake step");
            match status {
                HandshakeStatus::Finished | HandshakeStatus::NotHandshaking => {
                    return Ok(if self.engine.is_outbound_done() {
                        HandshakeProgress::Failed
                    } else {
                        HandshakeProgress::Finished
                    });
                }
                HandshakeStatus::NeedUnwrap => {
                    if let Some(progress) = self.handshake_unwrap(socket)? {
                        return Ok(progress);
                    }
                }
                HandshakeStatus::NeedWrap => {
                    if let Some(progress) = self.handshake_wrap(socket)? {
                        return Ok(progress);
                    }
                }
                HandshakeStatus::NeedTask => {
                    let mut tasks = std::mem::take(&mut self.pending_tasks);
                    while let Some(task) = self.engine.delegated_task() {
                        tasks.push(task);
                    }
                    if tasks.is_empty() {
                        continue;
                    }
                    debug!(count = tasks.len(), "submitting delegated tasks");
                    match worker.submit(tasks).map_err(io::Error::from)? {
                        Submission::Queued(ticket) => {
                            return Ok(HandshakeProgress::AwaitingTasks(ticket));
                        }
                        Submission::Full(tasks) => {
                            debug!(count = tasks.len(), "delegated task queue full");
                            self.pending_tasks = tasks;
                            self.status = Some(HandshakeStatus::NeedTask);
                            return Ok(HandshakeProgress::QueueFull);
                        }
                    }
                }
            }
        }
    }

    fn handshake_unwrap<S: Socket + ?Sized>(
        &mut self,
        socket: &mut S,
    ) -> io::Result<Option<HandshakeProgress>> {
        let read = match read_socket(socket, &mut self.peer_net)? {
            Transfer::Bytes(n) => n,
            Transfer::Closed => {
                if self.engine.is_inbound_done() && self.engine.is_outbound_done() {
                    return Ok(Some(HandshakeProgress::Failed));
                }
                if let Err(e) = self.engine.close_inbound() {
                    debug!("peer closed during handshake: {}", e);
                }
                self.engine.close_outbound();
                return Ok(None);
            }
        };
        self.peer_net.flip();
        let result = self.engine.unwrap(&mut self.peer_net, &mut self.peer_app);
        self.peer_net.compact();
        let result = match result {
            Ok(result) => result,
            Err(e) => {
                warn!("TLS engine failed during handshake unwrap: {}", e);
                self.engine.close_outbound();
                return Ok(None);
            }
        };
        self.status = Some(result.handshake_status);
        match result.status {
            EngineStatus::Ok => {}
            EngineStatus::BufferOverflow => {
                let size = self.engine.application_buffer_size();
                self.peer_app = enlarge(std::mem::take(&mut self.peer_app), size);
            }
            EngineStatus::BufferUnderflow => {
                let size = self.engine.packet_buffer_size();
                self.peer_net = grow_for_underflow(std::mem::take(&mut self.peer_net), size);
                if read == 0 {
                    return Ok(Some(HandshakeProgress::WantRead));
                }
            }
            EngineStatus::Closed => {
                if self.engine.is_outbound_done() {
                    return Ok(Some(HandshakeProgress::Failed));
                }
                self.engine.close_outbound();
                self.status = None;
            }
        }
        Ok(None)
    }

    fn handshake_wrap<S: Socket + ?Sized>(
        &mut self,
        socket: &mut S,
    ) -> io::Result<Option<HandshakeProgress>> {
        self.my_net.clear();
        let result = match self.engine.wrap(&mut self.my_app, &mut self.my_net) {
            Ok(result) => result,
            Err(e) => {
                warn!("TLS engine failed during handshake wrap: {}", e);
                self.engine.close_outbound();
                return Ok(None);
            }
        };
        self.status = Some(result.handshake_status);
        match result.status {
            EngineStatus::Ok => {
                self.my_net.flip();
                if !flush_all(socket, &mut self.my_net)? {
                    return Ok(Some(HandshakeProgress::Failed));
                }
            }
            EngineStatus::BufferOverflow => {
                let size = self.engine.packet_buffer_size();
                self.my_net = enlarge(std::mem::take(&mut self.my_net), size);
            }
            EngineStatus::BufferUnderflow => {
                warn!("TLS engine reported underflow after wrap");
                return Ok(Some(HandshakeProgress::Failed));
            }
            EngineStatus::Closed => {
                self.my_net.flip();
                match flush_all(socket, &mut self.my_net) {
                    Ok(true) => self.peer_net.clear(),
                    Ok(false) | Err(_) => {
                        debug!("could not send close_notify");
                        return Ok(Some(HandshakeProgress::Failed));
                    }
                }
            }
        }
        Ok(None)
    }

    /// Read available ciphertext and append the decrypted bytes to `sink`.
    pub fn read<S: Socket + ?Sized>(
        &mut self,
        socket: &mut S,
        sink: &mut BytesMut,
    ) -> io::Result<ReadOutcome> {
        self.deliver(sink);
        let mut read = match read_socket(socket, &mut self.peer_net)? {
            Transfer::Closed => return Ok(ReadOutcome::Closed),
            Transfer::Bytes(n) => n,
        };
        self.peer_net.flip();
        loop {
            let result = match self.engine.unwrap(&mut self.peer_net, &mut self.peer_app) {
                Ok(result) => result,
                Err(e) => {
                    warn!("TLS engine failed during unwrap: {}", e);
                    self.peer_net.compact();
                    return Ok(ReadOutcome::Closed);
                }
            };
            match result.status {
                EngineStatus::Ok => {
                    self.deliver(sink);
                    if !self.peer_net.has_remaining() && result.bytes_produced == 0 {
                        break;
                    }
                }
                EngineStatus::BufferOverflow => {
                    self.deliver(sink);
                    let size = self.engine.application_buffer_size();
                    self.peer_app = enlarge(std::mem::take(&mut self.peer_app), size);
                }
                EngineStatus::BufferUnderflow => {
                    self.peer_net.compact();
                    let size = self.engine.packet_buffer_size();
                    self.peer_net = grow_for_underflow(std::mem::take(&mut self.peer_net), size);
                    if read == 0 {
                        return Ok(ReadOutcome::Open);
                    }
                    match read_socket(socket, &mut self.peer_net)? {
                        Transfer::Closed => return Ok(ReadOutcome::Closed),
                        Transfer::Bytes(0) => return Ok(ReadOutcome::Open),
                        Transfer::Bytes(n) => read = n,
                    }
                    self.peer_net.flip();
                }
                EngineStatus::Closed => {
                    self.peer_net.compact();
                    return Ok(ReadOutcome::Closed);
                }
            }
        }
        self.peer_net.compact();
        Ok(ReadOutcome::Open)
    }

    /// Encrypt `message` and write all of it. Returns false if the
    /// connection closed.
    pub fn write<S: Socket + ?Sized>(&mut self, socket: &mut S, message: &[u8]) -> io::Result<bool> {
        for chunk in message.chunks(self.my_app.capacity().max(1)) {
            self.my_app.clear();
            self.my_app.put_slice(chunk).map_err(io::Error::from)?;
            self.my_app.flip();
            while self.my_app.has_remaining() {
                self.my_net.clear();
                let result = self
                    .engine
                    .wrap(&mut self.my_app, &mut self.my_net)
                    .map_err(io::Error::from)?;
                match result.status {
                    EngineStatus::Ok => {
                        self.my_net.flip();
                        if !flush_all(socket, &mut self.my_net)? {
                            return Ok(false);
                        }
                    }
                    EngineStatus::BufferOverflow => {
                        let size = self.engine.packet_buffer_size();
                        self.my_net = enlarge(std::mem::take(&mut self.my_net), size);
                    }
                    EngineStatus::BufferUnderflow => {
                        return Err(io::Error::new(
                            io::ErrorKind::InvalidData,
                            "TLS engine reported underflow after wrap",
                        ));
                    }
                    EngineStatus::Closed => {
                        socket.close()?;
                        return Ok(false);
                    }
                }
            }
        }
        Ok(true)
    }

    /// Send close_notify if possible, then close the socket.
    pub fn close<S: Socket + ?Sized>(&mut self, socket: &mut S) {
        self.engine.close_outbound();
        self.my_app.clear();
        self.my_app.set_limit(0);
        while !self.engine.is_outbound_done() {
            self.my_net.clear();
            match self.engine.wrap(&mut self.my_app, &mut self.my_net) {
                Ok(result) if result.status != EngineStatus::BufferOverflow => {
                    self.my_net.flip();
                    if !matches!(flush_all(socket, &mut self.my_net), Ok(true)) {
                        break;
                    }
                    if result.status == EngineStatus::Closed || result.bytes_produced == 0 {
                        break;
                    }
                }
                Ok(_) => {
                    let size = self.engine.packet_buffer_size();
                    self.my_net = enlarge(std::mem::take(&mut self.my_net), size);
                }
                Err(e) => {
                    debug!("close_notify not produced: {}", e);
                    break;
                }
            }
        }
        if let Err(e) = socket.close() {
            debug!("close failed: {}", e);
        }
    }

    fn deliver(&mut self, sink: &mut BytesMut) {
        if self.peer_app.position() > 0 {
            self.peer_app.flip();
            sink.extend_from_slice(self.peer_app.readable());
            self.peer_app.clear();
        }
    }
}

/// One read into `buffer` (writable layout), would-block as zero bytes.
fn read_socket<S: Socket + ?Sized>(socket: &mut S, buffer: &mut ByteCursor) -> io::Result<Transfer> {
    let len = buffer.remaining();
    match normalize(socket.read(buffer, len)) {
        Err(e) if is_disconnect(&e) => Ok(Transfer::Closed),
        other => other,
    }
}

/// Write until `buffer` (readable layout) is drained. Returns false if the peer closed.
fn flush_all<S: Socket + ?Sized>(socket: &mut S, buffer: &mut ByteCursor) -> io::Result<bool> {
    while buffer.has_remaining() {
        let len = buffer.remaining();
        match normalize(socket.write(buffer, len)) {
            Ok(Transfer::Closed) => return Ok(false),
            Ok(Transfer::Bytes(0)) => std::thread::yield_now(),
            Ok(Transfer::Bytes(_)) => {}
            Err(e) if is_disconnect(&e) => return Ok(false),
            Err(e) => return Err(e),
        }
    }
    Ok(true)
}
