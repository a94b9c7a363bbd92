/*
 * config.rs
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

//! Client and server configuration. Every struct deserializes from JSON with
//! missing fields taking their defaults.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::client::{DEFAULT_READ_BUFFER_SIZE, DEFAULT_WRITE_BUFFER_SIZE};
use crate::error::{Error, Result};
use crate::socket::TransportKind;

/// Buffer sizes, socket options and transport for one client.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub read_buffer_size: usize,
    pub write_buffer_size: usize,
    pub tcp_no_delay: bool,
    pub keep_alive: bool,
    pub transport: TransportKind,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            write_buffer_size: DEFAULT_WRITE_BUFFER_SIZE,
            tcp_no_delay: true,
            keep_alive: false,
            transport: TransportKind::Plain,
        }
    }
}

/// WebSocket client settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebSocketConfig {
    pub client: ClientConfig,
    /// Opening handshake deadline in milliseconds.
    pub handshake_timeout_ms: u64,
}

impl WebSocketConfig {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            client: ClientConfig::default(),
            handshake_timeout_ms: 30_000,
        }
    }
}

/// Certificate chain and private key for the TLS server, both PEM.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerTlsConfig {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

impl ServerTlsConfig {
    /// Load the PEM files into a rustls server configuration.
    pub fn load(&self) -> Result<Arc<rustls::ServerConfig>> {
        crate::net::server_config(&self.cert_path, &self.key_path)
    }
}

/// TLS socket server settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub address: IpAddr,
    pub port: u16,
    /// Capacity of the delegated-task queue feeding the worker thread.
    pub delegated_task_queue: usize,
    pub tls: Option<ServerTlsConfig>,
}

impl ServerConfig {
    pub fn new(address: IpAddr, port: u16) -> Self {
        Self {
            address,
            port,
            ..Self::default()
        }
    }

    /// Parse from a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        if config.delegated_task_queue == 0 {
            return Err(Error::Config(
                "delegated_task_queue must be at least 1".into(),
            ));
        }
        Ok(config)
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            delegated_task_queue: 64,
            tls: None,
        }
    }
}
