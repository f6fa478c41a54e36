//! The reader task: decode frames off the wire and dispatch by type.
//
// SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later
//
// One `FramedRead` drives every inbound frame through a single dispatch
// match. HEADERS/CONTINUATION accumulate into a per-connection staging area
// (headers can arrive for only one stream at a time on the wire, same as
// HTTP/2 §6.2) before being HPACK-decoded once END_HEADERS lands.

use crate::codec::FrameCodec;
use crate::dictionary::StreamDictionaryState;
use crate::error::{MuxError, ProtocolError, Reason, Result, StreamError};
use crate::frame::headers::HpackDecoder;
use crate::frame::Frame;
use crate::mux::Shared;
use crate::stream::{MuxedStream, StreamId};
use futures_util::StreamExt;
use std::sync::Arc;
use tokio::io::AsyncRead;
use tokio_util::codec::FramedRead;
use tracing::{debug, trace, warn};

/// Accumulates a HEADERS frame plus zero or more CONTINUATION frames for the
/// stream currently "open" on the wire, until END_HEADERS arrives.
struct HeaderAssembly {
    stream_id: u32,
    end_stream: bool,
    buffer: Vec<u8>,
}

pub struct Reader<R> {
    framed: FramedRead<R, FrameCodec>,
    shared: Arc<Shared>,
    hpack: HpackDecoder,
    assembling: Option<HeaderAssembly>,
    bytes_since_tick: u64,
}

impl<R> Reader<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(read_half: R, shared: Arc<Shared>) -> Self {
        let codec = FrameCodec::new(shared.max_frame_size);
        Self {
            framed: FramedRead::new(read_half, codec),
            shared,
            hpack: HpackDecoder::new(),
            assembling: None,
            bytes_since_tick: 0,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        loop {
            let next = tokio::select! {
                frame = self.framed.next() => frame,
                () = self.shared.abort.cancelled() => return Ok(()),
            };
            let Some(frame) = next else {
                return Ok(());
            };
            let frame = match frame {
                Ok(frame) => frame,
                Err(err) => return Err(self.connection_error(err)),
            };
            self.shared.activity.notify();
            if let Err(err) = self.dispatch(frame).await {
                return Err(self.connection_error(err));
            }
        }
    }

    fn connection_error(&self, err: ProtocolError) -> MuxError {
        warn!(reason = %err, "connection-level protocol error");
        MuxError::Protocol(err)
    }

    /// Dispatches one frame. Awaits `SetDictionary` updates inline (rather
    /// than spawning them) so a dictionary update is always applied before
    /// any later DATA frame on the same wire that depends on it — frames
    /// arrive in one ordered byte stream, so in-order processing is the
    /// whole correctness argument.
    async fn dispatch(&mut self, frame: Frame) -> std::result::Result<(), ProtocolError> {
        match frame {
            Frame::Data(data) => self.on_data(data.stream_id, data.end_stream, &data.payload),
            Frame::Headers(headers) => {
                if self.assembling.is_some() {
                    return Err(ProtocolError::Malformed("HEADERS while another assembly in flight"));
                }
                self.assembling = Some(HeaderAssembly {
                    stream_id: headers.stream_id,
                    end_stream: headers.end_stream,
                    buffer: headers.header_block_fragment.to_vec(),
                });
                if headers.end_headers {
                    self.finish_headers()?;
                }
                Ok(())
            }
            Frame::Continuation(cont) => {
                let assembly = self
                    .assembling
                    .as_mut()
                    .ok_or(ProtocolError::Malformed("CONTINUATION with no HEADERS in flight"))?;
                if assembly.stream_id != cont.stream_id {
                    return Err(ProtocolError::Malformed("CONTINUATION stream id mismatch"));
                }
                assembly.buffer.extend_from_slice(&cont.header_block_fragment);
                if cont.end_headers {
                    self.finish_headers()?;
                }
                Ok(())
            }
            Frame::RstStream(rst) => {
                self.on_rst_stream(rst.stream_id);
                Ok(())
            }
            Frame::Settings(_) => {
                // Only exchanged during the handshake; a mid-connection
                // SETTINGS is simply logged and ignored rather than treated
                // as a connection error, since this muxer never renegotiates.
                trace!("ignoring mid-connection SETTINGS");
                Ok(())
            }
            Frame::Ping(ping) => {
                self.on_ping(ping.ack, ping.payload_as_i64());
                Ok(())
            }
            Frame::GoAway(goaway) => {
                self.on_goaway(goaway.last_stream_id, goaway.error);
                Ok(())
            }
            Frame::WindowUpdate(wu) => {
                self.on_window_update(wu.stream_id, wu.increment);
                Ok(())
            }
            Frame::UseDictionary(use_dict) => self.on_use_dictionary(use_dict.stream_id, use_dict.dict_id),
            Frame::SetDictionary(set_dict) => {
                for entry in &set_dict.entries {
                    self.on_set_dictionary(entry.dict_id, &entry.data).await;
                }
                Ok(())
            }
            Frame::Unknown { frame_type, .. } => Err(ProtocolError::UnknownFrameType(frame_type)),
        }
    }

    fn finish_headers(&mut self) -> std::result::Result<(), ProtocolError> {
        let assembly = self.assembling.take().expect("checked by caller");
        let headers = self
            .hpack
            .decode(&assembly.buffer)
            .map_err(|err| ProtocolError::Hpack(err.to_string()))?;
        self.on_headers(assembly.stream_id, headers, assembly.end_stream);
        Ok(())
    }

    fn stream_id(&self, raw: u32) -> std::result::Result<StreamId, ProtocolError> {
        StreamId::from_wire(raw)
    }

    fn on_data(&mut self, raw_id: u32, end_stream: bool, payload: &[u8]) -> std::result::Result<(), ProtocolError> {
        let id = self.stream_id(raw_id)?;
        self.bytes_since_tick += payload.len() as u64;
        if self.bytes_since_tick >= 1 << 16 {
            self.shared.metrics.record_received(self.bytes_since_tick);
            self.bytes_since_tick = 0;
        }
        let Some(stream) = self.shared.streams.get(id) else {
            // Traffic for an unknown/already-closed stream: the RFC 7540
            // §6.1 answer is to ignore it unless it is egregious; we raise a
            // per-stream error only when the stream is still tracked.
            return Ok(());
        };
        if let Err(err) = stream.consume_receive_window(payload.len() as u32) {
            self.shared.errors.raise(id, err);
            return Ok(());
        }
        if let Some(dict_id) = stream.dictionary_in_use() {
            if let Some(dict) = self.shared.dictionaries.read_dict(dict_id) {
                let dict_bytes = dict.snapshot();
                if let Err(e) = stream.feed_compressed(payload, &dict_bytes) {
                    return Err(ProtocolError::Internal(e.to_string()));
                }
            } else {
                stream.feed_plain(payload);
            }
        } else {
            stream.feed_plain(payload);
        }
        if end_stream {
            stream.set_received_eof();
            if stream.both_sides_closed() {
                self.shared.streams.delete(id);
            }
        }
        Ok(())
    }

    fn on_headers(&mut self, raw_id: u32, headers: Vec<(String, String)>, end_stream: bool) {
        let Ok(id) = self.stream_id(raw_id) else {
            return;
        };
        if let Some(existing) = self.shared.streams.get(id) {
            existing.attach_inbound_headers(headers, end_stream);
            if end_stream && existing.both_sides_closed() {
                self.shared.streams.delete(id);
            }
            return;
        }
        if self.shared.streams.acquire_peer_id(id).is_err() {
            self.shared.errors.raise(id, StreamError::StreamClosed);
            return;
        }
        let headers = strip_accept_encoding_if_compressing(headers, &self.shared);
        let stream = MuxedStream::new(
            id,
            self.shared.initial_window,
            self.shared.max_window,
            self.shared.max_write_buffer,
            self.shared.ready.dupe(),
        );
        stream.attach_inbound_headers(headers, end_stream);
        if self.shared.streams.set(stream.dupe()).is_err() {
            // Lost the race with a shutdown that landed between
            // `acquire_peer_id` and here; the stream is simply dropped.
            return;
        }
        let handler = Arc::clone(&self.shared.handler);
        tokio::spawn(async move {
            handler.call(stream.dupe()).await;
            stream.close_write();
            // The handler may return before reading the peer's END_STREAM
            // (it errored, or simply didn't care about the rest of the
            // body); abandon_read lets the writer notice on its next pass
            // over this stream and force a RST_STREAM rather than leaving
            // the peer believing we're still listening.
            stream.abandon_read();
        });
    }

    fn on_rst_stream(&mut self, raw_id: u32) {
        let Ok(id) = self.stream_id(raw_id) else {
            return;
        };
        if let Some(stream) = self.shared.streams.get(id) {
            stream.abort();
            self.shared.streams.delete(id);
        }
    }

    fn on_ping(&mut self, ack: bool, payload: i64) {
        if ack {
            if let Some(rtt) = self.shared.ping.record_ack(payload) {
                self.shared.metrics.record_rtt(rtt);
                debug!(?rtt, "measured round trip");
            }
        } else {
            self.shared.pong.record_ping(payload);
        }
    }

    fn on_goaway(&mut self, last_stream_id: u32, reason: Reason) {
        debug!(last_stream_id, %reason, "received GOAWAY");
        let (_, _) = self.shared.streams.shutdown();
        self.shared.streams.abort_local_streams_after(last_stream_id, self.shared.role);
    }

    fn on_window_update(&mut self, raw_id: u32, increment: u32) {
        if raw_id == 0 {
            // Connection-level flow control is out of scope (see design
            // notes); a peer sending one is harmless to ignore.
            return;
        }
        let Ok(id) = self.stream_id(raw_id) else {
            return;
        };
        if let Some(stream) = self.shared.streams.get(id) {
            stream.credit_send_window(increment);
        }
    }

    fn on_use_dictionary(&mut self, raw_id: u32, dict_id: u32) -> std::result::Result<(), ProtocolError> {
        let id = self.stream_id(raw_id)?;
        let Some(stream) = self.shared.streams.get(id) else {
            return Ok(());
        };
        if self.shared.dictionaries.read_dict(dict_id).is_none() {
            return Err(ProtocolError::Malformed("UseDictionary references unknown dictionary"));
        }
        if stream.dictionary_in_use().is_some() {
            return Err(ProtocolError::Malformed("UseDictionary sent twice for the same stream"));
        }
        stream.set_dictionary(StreamDictionaryState::new(dict_id));
        Ok(())
    }

    async fn on_set_dictionary(&mut self, dict_id: u32, data: &[u8]) {
        if let Some(dict) = self.shared.dictionaries.read_dict(dict_id) {
            dict.apply_update(data).await;
        }
    }
}

fn strip_accept_encoding_if_compressing(
    headers: Vec<(String, String)>,
    shared: &Shared,
) -> Vec<(String, String)> {
    if !shared.dictionaries.is_enabled() {
        return headers;
    }
    headers
        .into_iter()
        .filter(|(name, _)| name != "accept-encoding")
        .collect()
}

use crate::dupe::Dupe;
