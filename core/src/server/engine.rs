/*
 * engine.rs
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

//! TLS engine abstraction: a record-layer state machine that turns plaintext
//! into ciphertext (`wrap`) and back (`unwrap`) without doing any I/O itself.
//!
//! Buffer layout: the source is read from its readable region
//! (`position..limit`) and the destination is written at its position, so
//! callers pass the source flipped and the destination writable.

use crate::buffer::ByteCursor;
use crate::error::Result;

/// Outcome of one `wrap` or `unwrap`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStatus {
    Ok,
    /// The destination has too little room for the output.
    BufferOverflow,
    /// The source does not hold a complete record.
    BufferUnderflow,
    /// The engine is closed in this direction.
    Closed,
}

/// What the engine needs next to make handshake progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeStatus {
    NeedUnwrap,
    NeedWrap,
    NeedTask,
    /// The operation that returned this status completed the handshake.
    Finished,
    NotHandshaking,
}

impl HandshakeStatus {
    pub fn is_done(self) -> bool {
        matches!(self, HandshakeStatus::Finished | HandshakeStatus::NotHandshaking)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineResult {
    pub status: EngineStatus,
    pub handshake_status: HandshakeStatus,
    pub bytes_consumed: usize,
    pub bytes_produced: usize,
}

impl EngineResult {
    pub fn new(status: EngineStatus, handshake_status: HandshakeStatus) -> Self {
        Self {
            status,
            handshake_status,
            bytes_consumed: 0,
            bytes_produced: 0,
        }
    }
}

/// Work the engine wants run off the I/O thread.
pub type DelegatedTask = Box<dyn FnOnce() + Send + 'static>;

/// Server-side TLS record engine.
pub trait TlsEngine {
    fn begin_handshake(&mut self) -> Result<()>;

    fn handshake_status(&self) -> HandshakeStatus;

    /// Encrypt from `src` (readable) into `dst` (writable).
    fn wrap(&mut self, src: &mut ByteCursor, dst: &mut ByteCursor) -> Result<EngineResult>;

    /// Decrypt from `src` (readable) into `dst` (writable).
    fn unwrap(&mut self, src: &mut ByteCursor, dst: &mut ByteCursor) -> Result<EngineResult>;

    /// Next pending delegated task; call until None.
    fn delegated_task(&mut self) -> Option<DelegatedTask>;

    /// No more inbound data will be supplied. Errors if the peer never sent close_notify.
    fn close_inbound(&mut self) -> Result<()>;

    /// Queue close_notify; subsequent wraps produce it and then report `Closed`.
    fn close_outbound(&mut self);

    fn is_inbound_done(&self) -> bool;

    fn is_outbound_done(&self) -> bool;

    /// Largest plaintext one record can carry.
    fn application_buffer_size(&self) -> usize;

    /// Largest ciphertext record the engine produces or accepts.
    fn packet_buffer_size(&self) -> usize;
}

/// Creates one engine per accepted connection.
pub trait EngineFactory: Send + Sync + 'static {
    type Engine: TlsEngine + 'static;

    fn create_engine(&self) -> Result<Self::Engine>;
}
