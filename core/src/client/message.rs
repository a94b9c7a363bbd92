/*
 * message.rs
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

//! Message-oriented client: a socket client plus a framing rule that says
//! whether the read buffer holds a complete message.

use std::io;

use super::SocketClient;
use crate::buffer::ByteCursor;
use crate::error::Result;
use crate::socket::Transfer;

/// Completeness rule for one protocol.
pub trait MessageFraming {
    /// Inspect `buffer.readable()`. When a complete message starts at the
    /// current position, advance the position past it and return true.
    /// Leave the position alone otherwise.
    fn is_complete_message(&mut self, buffer: &mut ByteCursor) -> Result<bool>;
}

/// Outcome of [`MessageClient::read_message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageStatus {
    /// A complete message is available through [`MessageClient::message`].
    Ready,
    /// Not enough bytes yet.
    Pending,
    /// The peer closed the connection.
    Closed,
}

/// [`SocketClient`] that reads whole messages.
#[derive(Debug)]
pub struct MessageClient<F> {
    client: SocketClient,
    framing: F,
    message_start: usize,
    message_end: usize,
}

impl<F: MessageFraming> MessageClient<F> {
    pub fn new(client: SocketClient, framing: F) -> Self {
        Self {
            client,
            framing,
            message_start: 0,
            message_end: 0,
        }
    }

    /// Return a buffered message if there is one, otherwise read once and check again.
    pub fn read_message(&mut self) -> Result<MessageStatus> {
        if self.check_message()? {
            return Ok(MessageStatus::Ready);
        }
        if let Transfer::Closed = self.client.read()? {
            return Ok(MessageStatus::Closed);
        }
        Ok(if self.check_message()? {
            MessageStatus::Ready
        } else {
            MessageStatus::Pending
        })
    }

    fn check_message(&mut self) -> Result<bool> {
        let buffer = self.client.read_buffer_mut();
        let start = buffer.position();
        buffer.mark();
        match self.framing.is_complete_message(buffer) {
            Ok(true) => {
                self.message_start = start;
                self.message_end = buffer.position();
                Ok(true)
            }
            other => {
                buffer.reset();
                other
            }
        }
    }

    /// Bytes of the message returned by the last `Ready`; valid until the next read.
    pub fn message(&self) -> &[u8] {
        let end = self.message_end.min(self.client.read_buffer().limit());
        let start = self.message_start.min(end);
        &self.client.read_buffer().filled()[start..end]
    }

    pub fn framing(&self) -> &F {
        &self.framing
    }

    pub fn framing_mut(&mut self) -> &mut F {
        &mut self.framing
    }

    pub fn client(&self) -> &SocketClient {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut SocketClient {
        &mut self.client
    }

    pub fn connect(&mut self) -> io::Result<()> {
        self.client.connect()
    }

    pub fn close(&mut self) -> io::Result<()> {
        self.client.close()
    }

    pub fn reconnect(&mut self) -> io::Result<()> {
        self.message_start = 0;
        self.message_end = 0;
        self.client.reconnect()
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_connected()
    }
}
