/*
 * mod.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Spoletta, a low-allocation socket toolkit.
 *
 * This file is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This file is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this file.  If not, see <http://www.gnu.org/licenses/>.
 */

//! WebSocket client (RFC 6455): frame codec, opening handshake and a
//! single-frame message client.

pub mod client;
pub mod frame;
pub mod handshake;
pub mod status;

pub use client::{
    FrameFraming, WebSocketClient, WebSocketClientBuilder, WebSocketResponse, WebSocketUrl,
};
pub use frame::{DataFrame, Opcode};
pub use handshake::{HandshakeHandler, HandshakeState};
pub use status::StatusCode;
