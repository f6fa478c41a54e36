//! PING frame (RFC 7540 §6.7).
//
// SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later
//
// The 8-byte payload is interpreted as a little-endian signed nanosecond
// timestamp when ACKed, unlike RFC 7540's opaque-octets treatment; we
// still carry it as a raw `[u8; 8]` here and let callers interpret it.

use super::{flags, FrameHeader, FrameType};
use crate::error::ProtocolError;
use bytes::{Buf, Bytes, BytesMut};

#[derive(Debug)]
pub struct Ping {
    pub ack: bool,
    pub payload: [u8; 8],
}

impl Ping {
    #[must_use]
    pub fn new(payload: i64, ack: bool) -> Self {
        Self {
            ack,
            payload: payload.to_le_bytes(),
        }
    }

    #[must_use]
    pub fn payload_as_i64(&self) -> i64 {
        i64::from_le_bytes(self.payload)
    }

    pub(super) fn decode(header: FrameHeader, mut payload: Bytes) -> Result<Self, ProtocolError> {
        if header.stream_id != 0 {
            return Err(ProtocolError::ZeroStreamId);
        }
        if payload.len() < 8 {
            return Err(ProtocolError::Malformed("PING"));
        }
        let mut buf = [0u8; 8];
        payload.copy_to_slice(&mut buf);
        Ok(Self {
            ack: header.flags & flags::ACK != 0,
            payload: buf,
        })
    }

    pub(super) fn encode(&self, dst: &mut BytesMut) {
        let header = FrameHeader {
            length: 8,
            frame_type: FrameType::Ping,
            flags: if self.ack { flags::ACK } else { 0 },
            stream_id: 0,
        };
        header.encode(dst);
        dst.extend_from_slice(&self.payload);
    }
}
