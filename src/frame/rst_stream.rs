//! RST_STREAM frame (RFC 7540 §6.4).
//
// SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later

use super::{FrameHeader, FrameType};
use crate::error::{ProtocolError, Reason};
use bytes::{Buf, Bytes, BytesMut};

#[derive(Debug)]
pub struct RstStream {
    pub stream_id: u32,
    pub error: Reason,
}

impl RstStream {
    #[must_use]
    pub fn new(stream_id: u32, error: Reason) -> Self {
        Self { stream_id, error }
    }

    pub(super) fn decode(header: FrameHeader, mut payload: Bytes) -> Result<Self, ProtocolError> {
        if header.stream_id == 0 {
            return Err(ProtocolError::ZeroStreamId);
        }
        if payload.len() < 4 {
            return Err(ProtocolError::Malformed("RST_STREAM"));
        }
        Ok(Self {
            stream_id: header.stream_id,
            error: Reason::from_wire(payload.get_u32()),
        })
    }

    pub(super) fn encode(&self, dst: &mut BytesMut) {
        let header = FrameHeader {
            length: 4,
            frame_type: FrameType::RstStream,
            flags: 0,
            stream_id: self.stream_id,
        };
        header.encode(dst);
        dst.extend_from_slice(&self.error.into_wire().to_be_bytes());
    }
}
