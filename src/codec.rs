//! `tokio_util::codec` pair driving [`Frame`] over a framed byte stream.
//
// SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later

use crate::error::ProtocolError;
use crate::frame::{Frame, FrameHeader, FRAME_HEADER_LEN};
use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Frame codec bounded by a negotiated max frame size (applies to incoming
/// frames only; outgoing emission already respects the peer's limit at the
/// call site).
#[derive(Debug)]
pub struct FrameCodec {
    max_frame_size: u32,
}

impl FrameCodec {
    #[must_use]
    pub fn new(max_frame_size: u32) -> Self {
        Self { max_frame_size }
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, ProtocolError> {
        if src.len() < FRAME_HEADER_LEN {
            src.reserve(FRAME_HEADER_LEN - src.len());
            return Ok(None);
        }
        let header = FrameHeader::decode(&mut &src[..FRAME_HEADER_LEN]);
        if header.length > self.max_frame_size {
            return Err(ProtocolError::Malformed("frame exceeds negotiated max size"));
        }
        let total = FRAME_HEADER_LEN + header.length as usize;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }
        src.advance(FRAME_HEADER_LEN);
        let payload = src.split_to(header.length as usize).freeze();
        Ok(Some(Frame::decode(header, payload)?))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        item.encode(dst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Ping;

    #[test]
    fn encode_then_decode_roundtrip() {
        let mut codec = FrameCodec::new(16_384);
        let mut buf = BytesMut::new();
        codec.encode(Frame::Ping(Ping::new(42, false)), &mut buf).unwrap();
        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        match decoded {
            Frame::Ping(p) => assert_eq!(p.payload_as_i64(), 42),
            _ => panic!("expected Ping"),
        }
    }

    #[test]
    fn decode_waits_for_full_header() {
        let mut codec = FrameCodec::new(16_384);
        let mut buf = BytesMut::from(&b"\x00\x00"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn decode_rejects_oversized_frame() {
        let mut codec = FrameCodec::new(4);
        let mut buf = BytesMut::new();
        FrameCodec::new(16_384)
            .encode(Frame::Ping(crate::frame::Ping::new(1, false)), &mut buf)
            .unwrap();
        assert!(codec.decode(&mut buf).is_err());
    }
}
