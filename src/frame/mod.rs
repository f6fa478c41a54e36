//! Wire framing.
//
// SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later
//
// HTTP/2-compatible framing (RFC 7540 §4.1): a 9-octet header followed by a
// payload of the indicated length. Three private frame types extend the
// protocol for dictionary-based compression. Unknown frame types are parsed
// into [`Frame::Unknown`] and dispatched by type afterwards rather than
// rejected outright, so a private framing library can grow new frame types
// without breaking older peers.

pub mod data;
pub mod dictionary;
pub mod goaway;
pub mod headers;
pub mod ping;
pub mod rst_stream;
pub mod settings;
pub mod window_update;

use crate::error::ProtocolError;
use crate::stream::StreamId;
use bytes::{Buf, BufMut, Bytes, BytesMut};

pub use data::Data;
pub use dictionary::{DictionaryEntry, SetDictionary, UseDictionary};
pub use goaway::GoAway;
pub use headers::{Continuation, Headers};
pub use ping::Ping;
pub use rst_stream::RstStream;
pub use settings::{Settings, SETTING_COMPRESSION, SETTING_MUXER_MAGIC};
pub use window_update::WindowUpdate;

/// Length of the fixed frame header, in bytes.
pub const FRAME_HEADER_LEN: usize = 9;

/// Largest frame length we will parse without a peer-negotiated
/// `SETTINGS_MAX_FRAME_SIZE` override (RFC 7540 §4.2 default).
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 16_384;

/// Standard and private frame type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Data,
    Headers,
    RstStream,
    Settings,
    Ping,
    GoAway,
    WindowUpdate,
    Continuation,
    /// Reserved; not currently written.
    SetCompressionContext,
    UseDictionary,
    SetDictionary,
    Unknown(u8),
}

impl FrameType {
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::Data => 0x0,
            Self::Headers => 0x1,
            Self::RstStream => 0x3,
            Self::Settings => 0x4,
            Self::Ping => 0x6,
            Self::GoAway => 0x7,
            Self::WindowUpdate => 0x8,
            Self::Continuation => 0x9,
            Self::SetCompressionContext => 0xF0,
            Self::UseDictionary => 0xF1,
            Self::SetDictionary => 0xF2,
            Self::Unknown(code) => code,
        }
    }

    #[must_use]
    pub fn from_code(code: u8) -> Self {
        match code {
            0x0 => Self::Data,
            0x1 => Self::Headers,
            0x3 => Self::RstStream,
            0x4 => Self::Settings,
            0x6 => Self::Ping,
            0x7 => Self::GoAway,
            0x8 => Self::WindowUpdate,
            0x9 => Self::Continuation,
            0xF0 => Self::SetCompressionContext,
            0xF1 => Self::UseDictionary,
            0xF2 => Self::SetDictionary,
            other => Self::Unknown(other),
        }
    }
}

pub mod flags {
    pub const END_STREAM: u8 = 0x1;
    pub const ACK: u8 = 0x1;
    pub const END_HEADERS: u8 = 0x4;
    pub const APPEND: u8 = 0x1;
    pub const OFFSET: u8 = 0x2;
}

/// The fixed 9-octet frame header.
#[derive(Debug, Clone, Copy)]
pub struct FrameHeader {
    pub length: u32,
    pub frame_type: FrameType,
    pub flags: u8,
    pub stream_id: u32,
}

impl FrameHeader {
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.put_u8((self.length >> 16) as u8);
        dst.put_u8((self.length >> 8) as u8);
        dst.put_u8(self.length as u8);
        dst.put_u8(self.frame_type.code());
        dst.put_u8(self.flags);
        dst.put_u32(self.stream_id & !(1 << 31));
    }

    pub fn decode(src: &mut impl Buf) -> Self {
        let length = (u32::from(src.get_u8()) << 16)
            | (u32::from(src.get_u8()) << 8)
            | u32::from(src.get_u8());
        let frame_type = FrameType::from_code(src.get_u8());
        let flags = src.get_u8();
        let stream_id = src.get_u32() & !(1 << 31);
        Self {
            length,
            frame_type,
            flags,
            stream_id,
        }
    }
}

/// A fully parsed frame, dispatched by [`FrameType`].
#[derive(Debug)]
pub enum Frame {
    Data(Data),
    Headers(Headers),
    Continuation(Continuation),
    RstStream(RstStream),
    Settings(Settings),
    Ping(Ping),
    GoAway(GoAway),
    WindowUpdate(WindowUpdate),
    UseDictionary(UseDictionary),
    SetDictionary(SetDictionary),
    /// An unrecognized frame type: carried through so the caller can decide
    /// connection-error semantics.
    Unknown { frame_type: u8, flags: u8, stream_id: u32, payload: Bytes },
}

impl Frame {
    /// Parse a complete frame (header + payload) from `src`, which must
    /// contain at least `FRAME_HEADER_LEN + header.length` bytes.
    pub fn decode(header: FrameHeader, payload: Bytes) -> Result<Self, ProtocolError> {
        Ok(match header.frame_type {
            FrameType::Data => Frame::Data(Data::decode(header, payload)?),
            FrameType::Headers => Frame::Headers(Headers::decode(header, payload)?),
            FrameType::Continuation => Frame::Continuation(Continuation::decode(header, payload)?),
            FrameType::RstStream => Frame::RstStream(RstStream::decode(header, payload)?),
            FrameType::Settings => Frame::Settings(Settings::decode(header, payload)?),
            FrameType::Ping => Frame::Ping(Ping::decode(header, payload)?),
            FrameType::GoAway => Frame::GoAway(GoAway::decode(header, payload)?),
            FrameType::WindowUpdate => Frame::WindowUpdate(WindowUpdate::decode(header, payload)?),
            FrameType::UseDictionary => Frame::UseDictionary(UseDictionary::decode(header, payload)?),
            FrameType::SetDictionary => Frame::SetDictionary(SetDictionary::decode(header, payload)?),
            FrameType::SetCompressionContext => Frame::Unknown {
                frame_type: header.frame_type.code(),
                flags: header.flags,
                stream_id: header.stream_id,
                payload,
            },
            FrameType::Unknown(code) => {
                return Err(ProtocolError::UnknownFrameType(code));
            }
        })
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        match self {
            Frame::Data(f) => f.encode(dst),
            Frame::Headers(f) => f.encode(dst),
            Frame::Continuation(f) => f.encode(dst),
            Frame::RstStream(f) => f.encode(dst),
            Frame::Settings(f) => f.encode(dst),
            Frame::Ping(f) => f.encode(dst),
            Frame::GoAway(f) => f.encode(dst),
            Frame::WindowUpdate(f) => f.encode(dst),
            Frame::UseDictionary(f) => f.encode(dst),
            Frame::SetDictionary(f) => f.encode(dst),
            Frame::Unknown { .. } => unreachable!("unknown frames are never constructed for sending"),
        }
    }
}

/// Encode an unsigned LEB128-style 7-bit variable-length integer, as used by
/// `FRAME_SET_DICTIONARY` entry sizes.
pub fn encode_varint(mut value: u32, dst: &mut BytesMut) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            dst.put_u8(byte);
            break;
        }
        dst.put_u8(byte | 0x80);
    }
}

/// Decode a 7-bit variable-length integer, erroring on overflow past 32
/// bits.
pub fn decode_varint(src: &mut impl Buf) -> Result<u32, ProtocolError> {
    let mut value: u32 = 0;
    let mut shift = 0u32;
    loop {
        if !src.has_remaining() {
            return Err(ProtocolError::Malformed("dictionary entry"));
        }
        let byte = src.get_u8();
        if shift >= 32 {
            return Err(ProtocolError::VarIntOverflow);
        }
        value |= u32::from(byte & 0x7f)
            .checked_shl(shift)
            .ok_or(ProtocolError::VarIntOverflow)?;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
    }
}

pub(crate) fn stream_id_nonzero(raw: u32) -> Result<StreamId, ProtocolError> {
    StreamId::from_wire(raw)
}
