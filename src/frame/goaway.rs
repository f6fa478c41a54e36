//! GOAWAY frame (RFC 7540 §6.8).
//
// SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later

use super::{FrameHeader, FrameType};
use crate::error::{ProtocolError, Reason};
use bytes::{Buf, Bytes, BytesMut};

#[derive(Debug)]
pub struct GoAway {
    pub last_stream_id: u32,
    pub error: Reason,
}

impl GoAway {
    #[must_use]
    pub fn new(last_stream_id: u32, error: Reason) -> Self {
        Self {
            last_stream_id,
            error,
        }
    }

    pub(super) fn decode(_header: FrameHeader, mut payload: Bytes) -> Result<Self, ProtocolError> {
        if payload.len() < 8 {
            return Err(ProtocolError::Malformed("GOAWAY"));
        }
        let last_stream_id = payload.get_u32() & !(1 << 31);
        let error = Reason::from_wire(payload.get_u32());
        Ok(Self {
            last_stream_id,
            error,
        })
    }

    pub(super) fn encode(&self, dst: &mut BytesMut) {
        let header = FrameHeader {
            length: 8,
            frame_type: FrameType::GoAway,
            flags: 0,
            stream_id: 0,
        };
        header.encode(dst);
        dst.extend_from_slice(&self.last_stream_id.to_be_bytes());
        dst.extend_from_slice(&self.error.into_wire().to_be_bytes());
    }
}
