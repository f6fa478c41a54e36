//! WINDOW_UPDATE frame (RFC 7540 §6.9).
//
// SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later

use super::{FrameHeader, FrameType};
use crate::error::ProtocolError;
use bytes::{Buf, Bytes, BytesMut};

#[derive(Debug)]
pub struct WindowUpdate {
    /// `0` means the connection-level window, which this muxer leaves
    /// unused in favor of per-stream windows.
    pub stream_id: u32,
    pub increment: u32,
}

impl WindowUpdate {
    #[must_use]
    pub fn new(stream_id: u32, increment: u32) -> Self {
        Self { stream_id, increment }
    }

    pub(super) fn decode(header: FrameHeader, mut payload: Bytes) -> Result<Self, ProtocolError> {
        if payload.len() < 4 {
            return Err(ProtocolError::Malformed("WINDOW_UPDATE"));
        }
        let increment = payload.get_u32() & !(1 << 31);
        Ok(Self {
            stream_id: header.stream_id,
            increment,
        })
    }

    pub(super) fn encode(&self, dst: &mut BytesMut) {
        let header = FrameHeader {
            length: 4,
            frame_type: FrameType::WindowUpdate,
            flags: 0,
            stream_id: self.stream_id,
        };
        header.encode(dst);
        dst.extend_from_slice(&self.increment.to_be_bytes());
    }
}
