/*
 * request.rs
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

//! Request method and URL scheme.

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::socket::TransportKind;

/// HTTP request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Head,
    Options,
    Patch,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
            Method::Patch => "PATCH",
        }
    }
}

/// Scheme of the target: decides the default port and the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpProtocol {
    #[default]
    Http,
    Https,
}

impl HttpProtocol {
    pub fn scheme(self) -> &'static str {
        match self {
            HttpProtocol::Http => "http",
            HttpProtocol::Https => "https",
        }
    }

    pub fn default_port(self) -> u16 {
        match self {
            HttpProtocol::Http => 80,
            HttpProtocol::Https => 443,
        }
    }

    pub fn transport(self) -> TransportKind {
        match self {
            HttpProtocol::Http => TransportKind::Plain,
            HttpProtocol::Https => TransportKind::Tls,
        }
    }
}

/// Split "host" or "host:port" (IPv6 literals in brackets) into name and port.
pub fn split_host_port(host: &str, default_port: u16) -> Result<(&str, u16)> {
    let invalid = || Error::Config(format!("invalid host '{}'", host));
    if let Some(inner) = host.strip_prefix('[') {
        let end = inner.find(']').ok_or_else(invalid)?;
        let port = match inner[end + 1..].strip_prefix(':') {
            Some(p) => p.parse().map_err(|_| invalid())?,
            None if end + 1 == inner.len() => default_port,
            None => return Err(invalid()),
        };
        return Ok((&inner[..end], port));
    }
    let (name, port) = match host.rsplit_once(':') {
        Some((name, p)) => (name, p.parse().map_err(|_| invalid())?),
        None => (host, default_port),
    };
    if name.is_empty() {
        return Err(invalid());
    }
    Ok((name, port))
}
