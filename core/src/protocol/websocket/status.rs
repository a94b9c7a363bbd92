/*
 * status.rs
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

//! Close status codes (RFC 6455 §7.4.1).

/// Status code carried in the first two bytes of a close frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    NormalClosure,
    GoingAway,
    ProtocolError,
    Refuse,
    NoStatus,
    AbnormalClose,
    InconsistentData,
    PolicyViolation,
    MessageTooBig,
    Extension,
    Unexpected,
    InvalidTlsHandshake,
}

impl StatusCode {
    pub fn code(self) -> u16 {
        match self {
            StatusCode::NormalClosure => 1000,
            StatusCode::GoingAway => 1001,
            StatusCode::ProtocolError => 1002,
            StatusCode::Refuse => 1003,
            StatusCode::NoStatus => 1005,
            StatusCode::AbnormalClose => 1006,
            StatusCode::InconsistentData => 1007,
            StatusCode::PolicyViolation => 1008,
            StatusCode::MessageTooBig => 1009,
            StatusCode::Extension => 1010,
            StatusCode::Unexpected => 1011,
            StatusCode::InvalidTlsHandshake => 1015,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        Some(match code {
            1000 => StatusCode::NormalClosure,
            1001 => StatusCode::GoingAway,
            1002 => StatusCode::ProtocolError,
            1003 => StatusCode::Refuse,
            1005 => StatusCode::NoStatus,
            1006 => StatusCode::AbnormalClose,
            1007 => StatusCode::InconsistentData,
            1008 => StatusCode::PolicyViolation,
            1009 => StatusCode::MessageTooBig,
            1010 => StatusCode::Extension,
            1011 => StatusCode::Unexpected,
            1015 => StatusCode::InvalidTlsHandshake,
            _ => return None,
        })
    }

    /// 1005, 1006 and 1015 are reserved for reporting and never sent on the wire.
    pub fn may_be_sent(self) -> bool {
        !matches!(
            self,
            StatusCode::NoStatus | StatusCode::AbnormalClose | StatusCode::InvalidTlsHandshake
        )
    }

    /// Status from a close frame payload; `NoStatus` when the payload is empty.
    pub fn from_close_payload(payload: &[u8]) -> Option<Self> {
        match payload {
            [] => Some(StatusCode::NoStatus),
            [hi, lo, ..] => Self::from_code(u16::from_be_bytes([*hi, *lo])),
            [_] => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip() {
        for code in [1000, 1001, 1002, 1003, 1005, 1006, 1007, 1008, 1009, 1010, 1011, 1015] {
            assert_eq!(StatusCode::from_code(code).unwrap().code(), code);
        }
        assert_eq!(StatusCode::from_code(1004), None);
    }

    #[test]
    fn close_payload_parsing() {
        assert_eq!(
            StatusCode::from_close_payload(&[0x03, 0xe8, b'b', b'y', b'e']),
            Some(StatusCode::NormalClosure)
        );
        assert_eq!(StatusCode::from_close_payload(&[]), Some(StatusCode::NoStatus));
        assert_eq!(StatusCode::from_close_payload(&[0x03]), None);
    }

    #[test]
    fn reserved_codes_are_not_sent() {
        assert!(!StatusCode::AbnormalClose.may_be_sent());
        assert!(StatusCode::GoingAway.may_be_sent());
    }
}
