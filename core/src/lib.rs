/*
 * lib.rs
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

//! Spoletta: buffer-cycling socket clients, a WebSocket client, a keep-alive
//! HTTP/1.1 client and a TLS echo server driven through an engine abstraction.

pub mod buffer;
pub mod client;
pub mod config;
pub mod error;
pub mod net;
pub mod pool;
pub mod protocol;
pub mod server;
pub mod socket;

pub use buffer::ByteCursor;
pub use error::{Error, Result};
