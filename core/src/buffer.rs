/*
 * buffer.rs
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

//! Fixed-capacity cursor buffer with position/limit semantics.
//!
//! A `ByteCursor` is either *writable* (position..limit is free space) or
//! *readable* (position..limit is unconsumed data). `flip`, `compact`,
//! `clear` and `reverse_flip` move between the two layouts without copying
//! more than the unconsumed bytes.

use std::fmt;

use bytes::Buf;

use crate::error::{Error, Result};

/// Fixed-capacity byte buffer with `position <= limit <= capacity`.
pub struct ByteCursor {
    data: Box<[u8]>,
    position: usize,
    limit: usize,
    mark: Option<usize>,
}

impl ByteCursor {
    /// New buffer in writable layout (position 0, limit = capacity).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            position: 0,
            limit: capacity,
            mark: None,
        }
    }

    /// New buffer holding a copy of `bytes`, in readable layout.
    pub fn from_slice(bytes: &[u8]) -> Self {
        Self {
            data: bytes.to_vec().into_boxed_slice(),
            position: 0,
            limit: bytes.len(),
            mark: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Set the position. Panics if `position > limit`.
    pub fn set_position(&mut self, position: usize) {
        assert!(
            position <= self.limit,
            "position {} beyond limit {}",
            position,
            self.limit
        );
        self.position = position;
        if matches!(self.mark, Some(m) if m > position) {
            self.mark = None;
        }
    }

    /// Set the limit, pulling the position back if needed. Panics if `limit > capacity`.
    pub fn set_limit(&mut self, limit: usize) {
        assert!(
            limit <= self.capacity(),
            "limit {} beyond capacity {}",
            limit,
            self.capacity()
        );
        self.limit = limit;
        if self.position > limit {
            self.position = limit;
        }
        if matches!(self.mark, Some(m) if m > limit) {
            self.mark = None;
        }
    }

    /// Bytes between position and limit.
    pub fn remaining(&self) -> usize {
        self.limit - self.position
    }

    pub fn has_remaining(&self) -> bool {
        self.position < self.limit
    }

    /// Writable layout over the whole buffer.
    pub fn clear(&mut self) {
        self.position = 0;
        self.limit = self.capacity();
        self.mark = None;
    }

    /// Switch from writing to reading: limit = position, position = 0.
    pub fn flip(&mut self) {
        self.limit = self.position;
        self.position = 0;
        self.mark = None;
    }

    /// Move the unconsumed bytes to index 0 and switch to writable layout
    /// positioned right after them.
    pub fn compact(&mut self) {
        let unread = self.remaining();
        self.data.copy_within(self.position..self.limit, 0);
        self.position = unread;
        self.limit = self.capacity();
        self.mark = None;
    }

    /// Undo a flip: position = limit, limit = capacity. New bytes are
    /// appended after the data that was flipped for reading.
    pub fn reverse_flip(&mut self) {
        self.position = self.limit;
        self.limit = self.capacity();
        self.mark = None;
    }

    pub fn mark(&mut self) {
        self.mark = Some(self.position);
    }

    /// Return to the marked position; a no-op when no mark is set.
    pub fn reset(&mut self) {
        if let Some(mark) = self.mark {
            self.position = mark;
        }
    }

    /// Move the position forward by `count`. Panics past the limit.
    pub fn advance_position(&mut self, count: usize) {
        let position = self.position + count;
        self.set_position(position);
    }

    /// Bytes between position and limit.
    pub fn readable(&self) -> &[u8] {
        &self.data[self.position..self.limit]
    }

    /// Mutable view of the bytes between position and limit.
    pub fn writable(&mut self) -> &mut [u8] {
        &mut self.data[self.position..self.limit]
    }

    /// Bytes from index 0 up to the limit.
    pub fn filled(&self) -> &[u8] {
        &self.data[..self.limit]
    }

    /// Relative put of a single byte.
    pub fn put_u8(&mut self, byte: u8) -> Result<()> {
        self.put_slice(&[byte])
    }

    /// Relative bulk put. Nothing is written when `src` does not fit.
    pub fn put_slice(&mut self, src: &[u8]) -> Result<()> {
        if src.len() > self.remaining() {
            return Err(Error::BufferOverflow {
                needed: src.len(),
                capacity: self.remaining(),
            });
        }
        let end = self.position + src.len();
        self.data[self.position..end].copy_from_slice(src);
        self.position = end;
        Ok(())
    }

    /// Relative get; `None` when nothing remains.
    pub fn get_u8(&mut self) -> Option<u8> {
        if self.has_remaining() {
            let byte = self.data[self.position];
            self.position += 1;
            Some(byte)
        } else {
            None
        }
    }

    /// Absolute get. Panics when `index >= limit`.
    pub fn get(&self, index: usize) -> u8 {
        self.filled()[index]
    }

    /// Absolute set. Panics when `index >= limit`.
    pub fn set(&mut self, index: usize, byte: u8) {
        let limit = self.limit;
        self.data[..limit][index] = byte;
    }
}

impl Buf for ByteCursor {
    fn remaining(&self) -> usize {
        ByteCursor::remaining(self)
    }

    fn chunk(&self) -> &[u8] {
        self.readable()
    }

    fn advance(&mut self, cnt: usize) {
        self.advance_position(cnt);
    }
}

/// Zero-capacity buffer.
impl Default for ByteCursor {
    fn default() -> Self {
        Self::with_capacity(0)
    }
}

impl fmt::Debug for ByteCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteCursor")
            .field("position", &self.position)
            .field("limit", &self.limit)
            .field("capacity", &self.capacity())
            .finish()
    }
}
