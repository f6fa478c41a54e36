//! Private dictionary frames: `FRAME_SET_DICTIONARY` (0xF2) pushes
//! compression dictionary bytes, `FRAME_USE_DICTIONARY` (0xF1) binds a
//! stream to a previously pushed dictionary.
//
// SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later
//
// `FRAME_USE_DICTIONARY`'s payload is the single byte naming the dictionary
// (spec §4.1): the dictionary count is itself capped at a `u8` by the
// `SETTING_COMPRESSION` word, so a dictionary id always fits in one octet.
// `FRAME_SET_DICTIONARY` carries a *sequence* of dictionary-entry records —
// dictionary content can arrive larger than one frame, and one frame can
// describe updates to more than one dictionary slot — so each record is
// self-delimiting: a one-byte dictionary id, a 7-bit varint size prefix,
// an optional offset (present on every record in the frame iff the OFFSET
// flag is set) for out-of-order chunk placement, then that many bytes of
// data. APPEND is a frame-wide flag: it says whether every record in this
// frame extends its dictionary's existing bytes or replaces them.

use super::{decode_varint, encode_varint, flags, FrameHeader, FrameType};
use crate::error::ProtocolError;
use bytes::{Buf, Bytes, BytesMut};

/// A chunk of dictionary content destined for dictionary `dict_id`.
#[derive(Debug, Clone)]
pub struct DictionaryEntry {
    pub dict_id: u32,
    pub data: Bytes,
    /// Explicit placement offset for out-of-order chunks; `None` means
    /// "wherever the current length is".
    pub offset: Option<u32>,
}

#[derive(Debug)]
pub struct SetDictionary {
    pub entries: Vec<DictionaryEntry>,
    /// When set, each entry's `data` is appended to its dictionary's
    /// existing bytes rather than replacing them.
    pub append: bool,
}

impl SetDictionary {
    /// A single-entry frame that replaces `dict_id`'s contents outright.
    #[must_use]
    pub fn whole(dict_id: u32, data: Bytes) -> Self {
        Self {
            entries: vec![DictionaryEntry { dict_id, data, offset: None }],
            append: false,
        }
    }

    /// A single-entry frame folding `data` onto the end of a dictionary
    /// already seeded by a prior `whole` frame.
    #[must_use]
    pub fn append(dict_id: u32, data: Bytes) -> Self {
        Self {
            entries: vec![DictionaryEntry { dict_id, data, offset: None }],
            append: true,
        }
    }

    pub(super) fn decode(header: FrameHeader, mut payload: Bytes) -> Result<Self, ProtocolError> {
        if header.stream_id != 0 {
            return Err(ProtocolError::ZeroStreamId);
        }
        let append = header.flags & flags::APPEND != 0;
        let has_offset = header.flags & flags::OFFSET != 0;
        let mut entries = Vec::new();
        while payload.has_remaining() {
            if payload.remaining() < 1 {
                return Err(ProtocolError::Malformed("SET_DICTIONARY"));
            }
            let dict_id = u32::from(payload.get_u8());
            let offset = if has_offset {
                Some(decode_varint(&mut payload)?)
            } else {
                None
            };
            let size = decode_varint(&mut payload)? as usize;
            if payload.remaining() < size {
                return Err(ProtocolError::Malformed("SET_DICTIONARY"));
            }
            let data = payload.split_to(size);
            entries.push(DictionaryEntry { dict_id, data, offset });
        }
        if entries.is_empty() {
            return Err(ProtocolError::Malformed("SET_DICTIONARY"));
        }
        Ok(Self { entries, append })
    }

    pub(super) fn encode(&self, dst: &mut BytesMut) {
        let has_offset = self.entries.iter().any(|e| e.offset.is_some());
        let mut frame_flags = 0;
        if self.append {
            frame_flags |= flags::APPEND;
        }
        if has_offset {
            frame_flags |= flags::OFFSET;
        }

        let mut body = BytesMut::new();
        for entry in &self.entries {
            body.extend_from_slice(&(entry.dict_id as u8).to_be_bytes());
            if has_offset {
                encode_varint(entry.offset.unwrap_or(0), &mut body);
            }
            encode_varint(entry.data.len() as u32, &mut body);
            body.extend_from_slice(&entry.data);
        }

        let header = FrameHeader {
            length: body.len() as u32,
            frame_type: FrameType::SetDictionary,
            flags: frame_flags,
            stream_id: 0,
        };
        header.encode(dst);
        dst.extend_from_slice(&body);
    }
}

#[derive(Debug)]
pub struct UseDictionary {
    pub stream_id: u32,
    pub dict_id: u32,
}

impl UseDictionary {
    #[must_use]
    pub fn new(stream_id: u32, dict_id: u32) -> Self {
        Self { stream_id, dict_id }
    }

    pub(super) fn decode(header: FrameHeader, mut payload: Bytes) -> Result<Self, ProtocolError> {
        if header.stream_id == 0 {
            return Err(ProtocolError::ZeroStreamId);
        }
        if payload.len() < 1 {
            return Err(ProtocolError::Malformed("USE_DICTIONARY"));
        }
        Ok(Self {
            stream_id: header.stream_id,
            dict_id: u32::from(payload.get_u8()),
        })
    }

    pub(super) fn encode(&self, dst: &mut BytesMut) {
        let header = FrameHeader {
            length: 1,
            frame_type: FrameType::UseDictionary,
            flags: 0,
            stream_id: self.stream_id,
        };
        header.encode(dst);
        dst.extend_from_slice(&(self.dict_id as u8).to_be_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_dictionary_roundtrip_without_offset() {
        let mut buf = BytesMut::new();
        let frame = SetDictionary::whole(7, Bytes::from_static(b"dictionary bytes"));
        frame.encode(&mut buf);
        let mut header_buf = buf.split_to(9);
        let header = FrameHeader::decode(&mut header_buf);
        let decoded = SetDictionary::decode(header, buf.freeze()).unwrap();
        assert_eq!(decoded.entries.len(), 1);
        assert_eq!(decoded.entries[0].dict_id, 7);
        assert_eq!(&decoded.entries[0].data[..], b"dictionary bytes");
        assert!(!decoded.append);
        assert!(decoded.entries[0].offset.is_none());
    }

    #[test]
    fn set_dictionary_roundtrip_with_offset_and_append() {
        let mut buf = BytesMut::new();
        let frame = SetDictionary {
            entries: vec![DictionaryEntry {
                dict_id: 3,
                data: Bytes::from_static(b"more"),
                offset: Some(128),
            }],
            append: true,
        };
        frame.encode(&mut buf);
        let mut header_buf = buf.split_to(9);
        let header = FrameHeader::decode(&mut header_buf);
        let decoded = SetDictionary::decode(header, buf.freeze()).unwrap();
        assert!(decoded.append);
        assert_eq!(decoded.entries[0].offset, Some(128));
        assert_eq!(&decoded.entries[0].data[..], b"more");
    }

    #[test]
    fn set_dictionary_roundtrip_multiple_entries_in_one_frame() {
        let mut buf = BytesMut::new();
        let frame = SetDictionary {
            entries: vec![
                DictionaryEntry { dict_id: 0, data: Bytes::from_static(b"first"), offset: None },
                DictionaryEntry { dict_id: 1, data: Bytes::from_static(b"second, longer"), offset: None },
            ],
            append: false,
        };
        frame.encode(&mut buf);
        let mut header_buf = buf.split_to(9);
        let header = FrameHeader::decode(&mut header_buf);
        let decoded = SetDictionary::decode(header, buf.freeze()).unwrap();
        assert_eq!(decoded.entries.len(), 2);
        assert_eq!(decoded.entries[0].dict_id, 0);
        assert_eq!(&decoded.entries[0].data[..], b"first");
        assert_eq!(decoded.entries[1].dict_id, 1);
        assert_eq!(&decoded.entries[1].data[..], b"second, longer");
    }

    #[test]
    fn use_dictionary_roundtrip() {
        let mut buf = BytesMut::new();
        UseDictionary::new(5, 42).encode(&mut buf);
        let mut header_buf = buf.split_to(9);
        let header = FrameHeader::decode(&mut header_buf);
        let decoded = UseDictionary::decode(header, buf.freeze()).unwrap();
        assert_eq!(decoded.stream_id, 5);
        assert_eq!(decoded.dict_id, 42);
    }
}
