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

//! HTTP/1.1 client side.
//!
//! - `HttpEncoder` writes requests straight into a client's write buffer.
//! - `HttpDecoder` rescans the read buffer until the response head and its
//!   Content-Length body are present; chunked bodies are not supported.
//! - `HttpClient` keeps one blocking keep-alive connection per host in a
//!   [`ConnectionPool`](crate::pool::ConnectionPool) and retries once on a
//!   connection found closed.

mod client;
mod decoder;
mod encoder;
mod request;

pub use client::{
    HttpClient, HttpFraming, HttpMessageClient, HttpResponse, DEFAULT_HTTP_READ_BUFFER_SIZE,
};
pub use decoder::HttpDecoder;
pub use encoder::{HttpEncoder, Request, DEFAULT_PROTOCOL};
pub use request::{split_host_port, HttpProtocol, Method};
