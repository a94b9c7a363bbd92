/*
 * buffers.rs
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

//! Growth of session buffers. Buffers here are in writable layout: bytes
//! `0..position` are pending and survive the move to a larger buffer.

use tracing::debug;

use crate::buffer::ByteCursor;

/// Capacity after growth: `proposed` if larger than the current capacity, else double.
pub fn grown_capacity(capacity: usize, proposed: usize) -> usize {
    if proposed > capacity {
        proposed
    } else {
        capacity.saturating_mul(2).max(1)
    }
}

/// Replace `buffer` with a larger one holding the same pending bytes.
pub fn enlarge(buffer: ByteCursor, proposed: usize) -> ByteCursor {
    let capacity = grown_capacity(buffer.capacity(), proposed);
    debug!(from = buffer.capacity(), to = capacity, "enlarging TLS buffer");
    let mut larger = ByteCursor::with_capacity(capacity);
    let pending = &buffer.filled()[..buffer.position()];
    larger.writable()[..pending.len()].copy_from_slice(pending);
    larger.advance_position(pending.len());
    larger
}

/// After an underflow: keep `buffer` if a full record already fits, else enlarge it.
pub fn grow_for_underflow(buffer: ByteCursor, packet_size: usize) -> ByteCursor {
    if packet_size < buffer.capacity() {
        buffer
    } else {
        enlarge(buffer, packet_size)
    }
}
