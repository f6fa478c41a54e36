//! DATA frame (RFC 7540 §6.1).
//
// SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later

use super::{flags, FrameHeader, FrameType};
use crate::error::ProtocolError;
use bytes::{Bytes, BytesMut};

#[derive(Debug)]
pub struct Data {
    pub stream_id: u32,
    pub end_stream: bool,
    pub payload: Bytes,
}

impl Data {
    #[must_use]
    pub fn new(stream_id: u32, payload: Bytes, end_stream: bool) -> Self {
        Self {
            stream_id,
            end_stream,
            payload,
        }
    }

    pub(super) fn decode(header: FrameHeader, payload: Bytes) -> Result<Self, ProtocolError> {
        if header.stream_id == 0 {
            return Err(ProtocolError::ZeroStreamId);
        }
        Ok(Self {
            stream_id: header.stream_id,
            end_stream: header.flags & flags::END_STREAM != 0,
            payload,
        })
    }

    pub(super) fn encode(&self, dst: &mut BytesMut) {
        let header = FrameHeader {
            length: self.payload.len() as u32,
            frame_type: FrameType::Data,
            flags: if self.end_stream { flags::END_STREAM } else { 0 },
            stream_id: self.stream_id,
        };
        header.encode(dst);
        dst.extend_from_slice(&self.payload);
    }
}
