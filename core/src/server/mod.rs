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

//! Event-loop TLS server driven by a pluggable record engine.

mod buffers;
pub mod engine;
mod event_loop;
mod rustls_engine;
mod session;
mod worker;

pub use engine::{
    DelegatedTask, EngineFactory, EngineResult, EngineStatus, HandshakeStatus, TlsEngine,
};
pub use event_loop::{ConnectionSocket, ServerHandle, TlsSocketServer};
pub use rustls_engine::{RustlsAcceptor, RustlsEngine};
pub use session::{HandshakeProgress, ReadOutcome, TlsSession};
pub use worker::{DelegatedTaskWorker, Submission, TaskTicket};
