/*
 * frame.rs
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

//! WebSocket frame format (RFC 6455 §5): a borrowed view for receive, an
//! encoder for send (always masked, client to server).
//!
//! ```text
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
//! |N|V|V|V|       |S|             |   (if payload len==126/127)   |
//! +-+-+-+-+-------+-+-------------+ - - - - - - - - - - - - - - - +
//! |     Masking-key, if MASK set to 1 (4)   |    Payload Data     |
//! +-----------------------------------------+---------------------+
//! ```

use bytes::BufMut;

use crate::buffer::ByteCursor;
use crate::error::{Error, Result};

const FIN: u8 = 0x80;
const MASK: u8 = 0x80;
const OPCODE_BITS: u8 = 0x0f;
const LENGTH_BITS: u8 = 0x7f;
const LENGTH_16: u8 = 126;
const LENGTH_64: u8 = 127;

/// Largest payload a control frame may carry.
pub const MAX_CONTROL_PAYLOAD: usize = 125;

/// Frame opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Continuous,
    Text,
    Binary,
    Closing,
    Ping,
    Pong,
}

impl Opcode {
    pub fn from_u8(code: u8) -> Result<Self> {
        match code {
            0x0 => Ok(Opcode::Continuous),
            0x1 => Ok(Opcode::Text),
            0x2 => Ok(Opcode::Binary),
            0x8 => Ok(Opcode::Closing),
            0x9 => Ok(Opcode::Ping),
            0xA => Ok(Opcode::Pong),
            other => Err(Error::InvalidOpcode(other)),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Opcode::Continuous => 0x0,
            Opcode::Text => 0x1,
            Opcode::Binary => 0x2,
            Opcode::Closing => 0x8,
            Opcode::Ping => 0x9,
            Opcode::Pong => 0xA,
        }
    }

    /// Close, ping and pong.
    pub fn is_control(self) -> bool {
        self.code() & 0x8 != 0
    }
}

/// Read-only view of a frame at `offset` in a byte slice, with `limit`
/// bytes available from there. Every attribute is computed from the bytes.
#[derive(Debug, Clone, Copy)]
pub struct DataFrame<'a> {
    bytes: &'a [u8],
    offset: usize,
    limit: usize,
}

impl<'a> DataFrame<'a> {
    /// View `limit` bytes of `bytes` starting at `offset` (clamped to the slice).
    pub fn wrap(bytes: &'a [u8], offset: usize, limit: usize) -> Self {
        let offset = offset.min(bytes.len());
        let limit = limit.min(bytes.len() - offset);
        Self {
            bytes,
            offset,
            limit,
        }
    }

    /// View the whole slice.
    pub fn from_slice(bytes: &'a [u8]) -> Self {
        Self::wrap(bytes, 0, bytes.len())
    }

    fn byte(&self, index: usize) -> u8 {
        self.bytes[self.offset + index]
    }

    pub fn available(&self) -> usize {
        self.limit
    }

    /// FIN bit clear: more frames of this message follow.
    pub fn is_fragment(&self) -> bool {
        self.byte(0) & FIN == 0
    }

    pub fn opcode(&self) -> Result<Opcode> {
        Opcode::from_u8(self.byte(0) & OPCODE_BITS)
    }

    pub fn is_masked(&self) -> bool {
        self.byte(1) & MASK != 0
    }

    /// Bytes taken by byte 1 plus any extended length: 1, 3 or 9.
    fn length_octets(&self) -> usize {
        match self.byte(1) & LENGTH_BITS {
            LENGTH_16 => 3,
            LENGTH_64 => 9,
            _ => 1,
        }
    }

    /// Declared payload length; lengths beyond `usize` saturate.
    pub fn payload_length(&self) -> usize {
        match self.byte(1) & LENGTH_BITS {
            LENGTH_16 => u16::from_be_bytes([self.byte(2), self.byte(3)]) as usize,
            LENGTH_64 => {
                let mut raw = [0u8; 8];
                for (i, b) in raw.iter_mut().enumerate() {
                    *b = self.byte(2 + i);
                }
                usize::try_from(u64::from_be_bytes(raw)).unwrap_or(usize::MAX)
            }
            len => len as usize,
        }
    }

    fn mask_octets(&self) -> usize {
        if self.is_masked() {
            4
        } else {
            0
        }
    }

    /// Bytes before the payload.
    pub fn header_length(&self) -> usize {
        1 + self.length_octets() + self.mask_octets()
    }

    pub fn masking_key(&self) -> Option<[u8; 4]> {
        if !self.is_masked() {
            return None;
        }
        let at = 1 + self.length_octets();
        Some([
            self.byte(at),
            self.byte(at + 1),
            self.byte(at + 2),
            self.byte(at + 3),
        ])
    }

    /// True while the available bytes fall short of the whole frame.
    pub fn is_incomplete(&self) -> bool {
        if self.limit <= 1 {
            return true;
        }
        let mut required = 1 + self.length_octets();
        if self.limit < required {
            return true;
        }
        required += self.mask_octets();
        if self.limit < required {
            return true;
        }
        required = required.saturating_add(self.payload_length());
        self.limit < required
    }

    /// True once byte 0, the length fields and the masking key are available.
    pub fn has_complete_header(&self) -> bool {
        if self.limit <= 1 {
            return false;
        }
        let required = 1 + self.length_octets();
        if self.limit < required {
            return false;
        }
        self.limit >= required + self.mask_octets()
    }

    /// Total frame size. Only meaningful once `has_complete_header()`.
    pub fn length(&self) -> usize {
        self.header_length().saturating_add(self.payload_length())
    }

    /// Raw payload bytes, still masked if the frame is masked.
    pub fn payload(&self) -> Result<&'a [u8]> {
        if self.is_incomplete() {
            return Err(Error::protocol("frame is incomplete"));
        }
        let start = self.offset + self.header_length();
        Ok(&self.bytes[start..start + self.payload_length()])
    }

    /// Append the unmasked payload to `dest`.
    pub fn copy_payload_data<B: BufMut>(&self, dest: &mut B) -> Result<()> {
        let payload = self.payload()?;
        if dest.remaining_mut() < payload.len() {
            return Err(Error::BufferOverflow {
                needed: payload.len(),
                capacity: dest.remaining_mut(),
            });
        }
        match self.masking_key() {
            None => dest.put_slice(payload),
            Some(key) => {
                for (i, b) in payload.iter().enumerate() {
                    dest.put_u8(b ^ key[i % 4]);
                }
            }
        }
        Ok(())
    }
}

/// XOR `data` with the 4-byte key; applying it twice restores the input.
pub fn mask_in_place(data: &mut [u8], key: [u8; 4]) {
    for (i, b) in data.iter_mut().enumerate() {
        *b ^= key[i % 4];
    }
}

/// Size of a masked frame carrying `payload_len` bytes.
pub fn encoded_len(payload_len: usize) -> usize {
    let length_field = if payload_len <= MAX_CONTROL_PAYLOAD {
        1
    } else if payload_len <= u16::MAX as usize {
        3
    } else {
        9
    };
    1 + length_field + 4 + payload_len
}

/// Encode a final, masked frame into `dest`. Nothing is written when the
/// frame does not fit. Returns the number of bytes written.
pub fn encode(
    opcode: Opcode,
    payload: &[u8],
    mask_key: [u8; 4],
    dest: &mut ByteCursor,
) -> Result<usize> {
    let total = encoded_len(payload.len());
    if total > dest.remaining() {
        return Err(Error::BufferOverflow {
            needed: total,
            capacity: dest.remaining(),
        });
    }
    let out = dest.writable();
    out[0] = FIN | opcode.code();
    let mut at = 2;
    if payload.len() <= MAX_CONTROL_PAYLOAD {
        out[1] = MASK | payload.len() as u8;
    } else if payload.len() <= u16::MAX as usize {
        out[1] = MASK | LENGTH_16;
        out[2..4].copy_from_slice(&(payload.len() as u16).to_be_bytes());
        at = 4;
    } else {
        out[1] = MASK | LENGTH_64;
        out[2..10].copy_from_slice(&(payload.len() as u64).to_be_bytes());
        at = 10;
    }
    out[at..at + 4].copy_from_slice(&mask_key);
    at += 4;
    for (i, b) in payload.iter().enumerate() {
        out[at + i] = b ^ mask_key[i % 4];
    }
    dest.advance_position(total);
    Ok(total)
}
