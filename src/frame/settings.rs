//! SETTINGS frame (RFC 7540 §6.5) plus the two private settings this muxer
//! defines.
//
// SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later

use super::{flags, FrameHeader, FrameType};
use crate::error::ProtocolError;
use bytes::{Buf, Bytes, BytesMut};

/// Identifies the endpoint's role at handshake.
pub const SETTING_MUXER_MAGIC: u16 = 0x42DB;
/// Encodes the offered compression parameters.
pub const SETTING_COMPRESSION: u16 = 0xFF20;

/// Magic constants distinguishing the two handshake roles.
pub const MAGIC_CLIENT: u32 = 0x5045_4E47; // "PENG"
pub const MAGIC_SERVER: u32 = 0x4D55_5821; // "MUX!"

#[derive(Debug)]
pub struct Settings {
    pub ack: bool,
    pub values: Vec<(u16, u32)>,
}

impl Settings {
    #[must_use]
    pub fn new(values: Vec<(u16, u32)>) -> Self {
        Self { ack: false, values }
    }

    #[must_use]
    pub fn ack() -> Self {
        Self {
            ack: true,
            values: Vec::new(),
        }
    }

    #[must_use]
    pub fn get(&self, id: u16) -> Option<u32> {
        self.values.iter().find(|(k, _)| *k == id).map(|(_, v)| *v)
    }

    pub(super) fn decode(header: FrameHeader, mut payload: Bytes) -> Result<Self, ProtocolError> {
        if header.stream_id != 0 {
            return Err(ProtocolError::ZeroStreamId);
        }
        let ack = header.flags & flags::ACK != 0;
        if ack {
            if !payload.is_empty() {
                return Err(ProtocolError::Malformed("SETTINGS ACK with payload"));
            }
            return Ok(Self {
                ack: true,
                values: Vec::new(),
            });
        }
        if payload.len() % 6 != 0 {
            return Err(ProtocolError::Malformed("SETTINGS"));
        }
        let mut values = Vec::with_capacity(payload.len() / 6);
        while payload.has_remaining() {
            let id = payload.get_u16();
            let value = payload.get_u32();
            values.push((id, value));
        }
        Ok(Self { ack: false, values })
    }

    pub(super) fn encode(&self, dst: &mut BytesMut) {
        let length = if self.ack { 0 } else { self.values.len() as u32 * 6 };
        let header = FrameHeader {
            length,
            frame_type: FrameType::Settings,
            flags: if self.ack { flags::ACK } else { 0 },
            stream_id: 0,
        };
        header.encode(dst);
        if !self.ack {
            for (id, value) in &self.values {
                dst.extend_from_slice(&id.to_be_bytes());
                dst.extend_from_slice(&value.to_be_bytes());
            }
        }
    }
}

/// The decoded form of the `SETTING_COMPRESSION` 32-bit word: version,
/// format, `log2(dictionary size)`, dictionary count, one byte each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionSetting {
    pub version: u8,
    pub format: u8,
    pub log_dict_size: u8,
    pub dict_count: u8,
}

/// The version/format this implementation speaks.
pub const COMPRESSION_VERSION: u8 = 1;
pub const COMPRESSION_FORMAT_ZSTD: u8 = 1;

impl CompressionSetting {
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            version: COMPRESSION_VERSION,
            format: COMPRESSION_FORMAT_ZSTD,
            log_dict_size: 0,
            dict_count: 0,
        }
    }

    #[must_use]
    pub fn is_enabled(self) -> bool {
        self.log_dict_size > 0 && self.dict_count > 0
    }

    #[must_use]
    pub fn dict_size(self) -> usize {
        1usize << self.log_dict_size
    }

    #[must_use]
    pub fn encode(self) -> u32 {
        u32::from_be_bytes([self.version, self.format, self.log_dict_size, self.dict_count])
    }

    #[must_use]
    pub fn decode(word: u32) -> Self {
        let bytes = word.to_be_bytes();
        Self {
            version: bytes[0],
            format: bytes[1],
            log_dict_size: bytes[2],
            dict_count: bytes[3],
        }
    }

    /// The effective compression parameters are the element-wise minimum
    /// of the two peers' offered `(log_size, count)` pair; if either side
    /// offers zero, compression is disabled.
    #[must_use]
    pub fn negotiate(self, other: Self) -> Self {
        let log_dict_size = self.log_dict_size.min(other.log_dict_size);
        let dict_count = self.dict_count.min(other.dict_count);
        if log_dict_size == 0 || dict_count == 0 {
            return Self::disabled();
        }
        Self {
            version: self.version,
            format: self.format,
            log_dict_size,
            dict_count,
        }
    }
}
