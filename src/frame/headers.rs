//! HEADERS / CONTINUATION frames and HPACK coding (RFC 7540 §6.2, §6.10;
//! RFC 7541).
//
// SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later
//
// HPACK is delegated to the `hpack` crate (the same dependency
// `waieez-solicit` and the pack's other HTTP/2 reference implementations
// use for RFC 7541 compliance) so this module only has to own framing: when
// an encoded header block exceeds the peer's max frame size it is split
// across HEADERS + N·CONTINUATION, the last carrying END_HEADERS.

use super::{flags, Frame, FrameHeader, FrameType};
use crate::error::ProtocolError;
use bytes::{Bytes, BytesMut};

/// An ordered sequence of header name/value pairs.
pub type HeaderList = Vec<(String, String)>;

#[derive(Debug)]
pub struct Headers {
    pub stream_id: u32,
    pub end_stream: bool,
    pub end_headers: bool,
    /// Raw HPACK-encoded bytes for this fragment; callers must accumulate
    /// fragments across CONTINUATION frames until `end_headers` before
    /// decoding (see [`HpackDecoder::decode`]).
    pub header_block_fragment: Bytes,
}

impl Headers {
    pub(super) fn decode(header: FrameHeader, payload: Bytes) -> Result<Self, ProtocolError> {
        if header.stream_id == 0 {
            return Err(ProtocolError::ZeroStreamId);
        }
        Ok(Self {
            stream_id: header.stream_id,
            end_stream: header.flags & flags::END_STREAM != 0,
            end_headers: header.flags & flags::END_HEADERS != 0,
            header_block_fragment: payload,
        })
    }

    pub(super) fn encode(&self, dst: &mut BytesMut) {
        let mut frame_flags = 0;
        if self.end_stream {
            frame_flags |= flags::END_STREAM;
        }
        if self.end_headers {
            frame_flags |= flags::END_HEADERS;
        }
        let header = FrameHeader {
            length: self.header_block_fragment.len() as u32,
            frame_type: FrameType::Headers,
            flags: frame_flags,
            stream_id: self.stream_id,
        };
        header.encode(dst);
        dst.extend_from_slice(&self.header_block_fragment);
    }
}

#[derive(Debug)]
pub struct Continuation {
    pub stream_id: u32,
    pub end_headers: bool,
    pub header_block_fragment: Bytes,
}

impl Continuation {
    pub(super) fn decode(header: FrameHeader, payload: Bytes) -> Result<Self, ProtocolError> {
        if header.stream_id == 0 {
            return Err(ProtocolError::ZeroStreamId);
        }
        Ok(Self {
            stream_id: header.stream_id,
            end_headers: header.flags & flags::END_HEADERS != 0,
            header_block_fragment: payload,
        })
    }

    pub(super) fn encode(&self, dst: &mut BytesMut) {
        let frame_flags = if self.end_headers { flags::END_HEADERS } else { 0 };
        let header = FrameHeader {
            length: self.header_block_fragment.len() as u32,
            frame_type: FrameType::Continuation,
            flags: frame_flags,
            stream_id: self.stream_id,
        };
        header.encode(dst);
        dst.extend_from_slice(&self.header_block_fragment);
    }
}

/// Split an already HPACK-encoded header block into HEADERS + zero or more
/// CONTINUATION frames, sized to `max_frame_size`: a block whose encoding
/// exceeds the peer's max frame size is emitted as HEADERS + N·CONTINUATION,
/// the last one carrying END_HEADERS.
#[must_use]
pub fn split_into_frames(
    stream_id: u32,
    block: Bytes,
    end_stream: bool,
    max_frame_size: u32,
) -> Vec<Frame> {
    let max = max_frame_size.max(1) as usize;
    if block.len() <= max {
        return vec![Frame::Headers(Headers {
            stream_id,
            end_stream,
            end_headers: true,
            header_block_fragment: block,
        })];
    }
    let mut frames = Vec::new();
    let mut rest = block;
    let first = rest.split_to(max);
    frames.push(Frame::Headers(Headers {
        stream_id,
        end_stream,
        end_headers: false,
        header_block_fragment: first,
    }));
    while !rest.is_empty() {
        let take = rest.len().min(max);
        let chunk = rest.split_to(take);
        let end_headers = rest.is_empty();
        frames.push(Frame::Continuation(Continuation {
            stream_id,
            end_headers,
            header_block_fragment: chunk,
        }));
    }
    frames
}

/// Per-connection HPACK encoder. Owns the dynamic table, so there is
/// exactly one per connection (writer side), shared across all streams.
pub struct HpackEncoder {
    inner: hpack::Encoder<'static>,
}

impl std::fmt::Debug for HpackEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HpackEncoder").finish_non_exhaustive()
    }
}

impl Default for HpackEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl HpackEncoder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: hpack::Encoder::new(),
        }
    }

    pub fn encode(&mut self, headers: &HeaderList) -> Bytes {
        let pairs: Vec<(&[u8], &[u8])> = headers
            .iter()
            .map(|(k, v)| (k.as_bytes(), v.as_bytes()))
            .collect();
        Bytes::from(self.inner.encode(pairs))
    }
}

/// Per-connection HPACK decoder (reader side).
pub struct HpackDecoder {
    inner: hpack::Decoder<'static>,
}

impl std::fmt::Debug for HpackDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HpackDecoder").finish_non_exhaustive()
    }
}

impl Default for HpackDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl HpackDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: hpack::Decoder::new(),
        }
    }

    pub fn decode(&mut self, block: &[u8]) -> Result<HeaderList, ProtocolError> {
        self.inner
            .decode(block)
            .map(|pairs| {
                pairs
                    .into_iter()
                    .map(|(k, v)| {
                        (
                            String::from_utf8_lossy(&k).into_owned(),
                            String::from_utf8_lossy(&v).into_owned(),
                        )
                    })
                    .collect()
            })
            .map_err(|e| ProtocolError::Hpack(format!("{e:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hpack_roundtrip() {
        let mut enc = HpackEncoder::new();
        let mut dec = HpackDecoder::new();
        let headers: HeaderList = vec![
            (":method".into(), "GET".into()),
            (":path".into(), "/hello".into()),
            ("x-test".into(), "value".into()),
        ];
        let encoded = enc.encode(&headers);
        let decoded = dec.decode(&encoded).unwrap();
        assert_eq!(decoded, headers);
    }

    #[test]
    fn split_into_frames_single_when_small() {
        let block = Bytes::from_static(b"short");
        let frames = split_into_frames(1, block, true, 100);
        assert_eq!(frames.len(), 1);
        match &frames[0] {
            Frame::Headers(h) => {
                assert!(h.end_headers);
                assert!(h.end_stream);
            }
            _ => panic!("expected Headers"),
        }
    }

    #[test]
    fn split_into_frames_continuation_when_large() {
        let block = Bytes::from(vec![0u8; 25]);
        let frames = split_into_frames(1, block, false, 10);
        assert_eq!(frames.len(), 3);
        assert!(matches!(frames[0], Frame::Headers(_)));
        assert!(matches!(frames[1], Frame::Continuation(_)));
        match &frames[2] {
            Frame::Continuation(c) => assert!(c.end_headers),
            _ => panic!("expected Continuation"),
        }
    }
}
