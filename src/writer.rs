//! The writer task: the single place frames are emitted onto the wire.
//
// SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later
//
// Exactly one task ever touches the write half, so everything that needs to
// put bytes on the wire — application writes, flow control credits,
// heartbeats, RST_STREAM, GOAWAY — funnels through this `select!` loop
// instead of contending on a shared writer lock the way a naive design
// might. This mirrors the teacher's single-writer-task idiom, generalized
// from one frame queue to the several distinct event sources spec'd here.

use crate::codec::FrameCodec;
use crate::dictionary::RequestMeta;
use crate::error::{MuxError, Reason, Result};
use crate::frame::headers::{split_into_frames, HeaderList, HpackEncoder};
use crate::frame::{Data, Frame, GoAway, Ping, RstStream, SetDictionary, UseDictionary, WindowUpdate};
use crate::idle::IdleTimer;
use crate::mux::{OpenStreamRequest, Shared};
use crate::stream::{MuxedStream, StreamId};
use crate::sync::Fuse;
use bytes::{BufMut, Bytes, BytesMut};
use futures_util::SinkExt;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::codec::FramedWrite;
use tracing::{trace, warn};

pub struct Writer<W> {
    framed: FramedWrite<W, FrameCodec>,
    shared: Arc<Shared>,
    open_rx: mpsc::UnboundedReceiver<OpenStreamRequest>,
    goaway_rx: mpsc::UnboundedReceiver<Reason>,
    hpack: HpackEncoder,
    idle: IdleTimer,
    bytes_since_tick: u64,
    goaway_sent: Fuse,
    /// Which write-side dictionary slot each stream has been bound to, once
    /// a compressible response starts: the writer, not [`MuxedStream`], owns
    /// this since only the writer ever picks or uses it.
    outbound_dicts: HashMap<StreamId, u32>,
    /// Whether the first `SetDictionary` for a given slot has gone out yet
    /// (whole vs. append).
    dict_seeded: HashMap<u32, bool>,
}

impl<W> Writer<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(
        write_half: W,
        shared: Arc<Shared>,
        open_rx: mpsc::UnboundedReceiver<OpenStreamRequest>,
        goaway_rx: mpsc::UnboundedReceiver<Reason>,
    ) -> Self {
        let codec = FrameCodec::new(shared.max_frame_size);
        let idle = IdleTimer::with_counter(
            shared.heartbeat_interval,
            shared.max_heartbeats,
            shared.idle_retries.clone(),
        );
        Self {
            framed: FramedWrite::new(write_half, codec),
            shared,
            open_rx,
            goaway_rx,
            hpack: HpackEncoder::new(),
            idle,
            bytes_since_tick: 0,
            goaway_sent: Fuse::new(),
            outbound_dicts: HashMap::new(),
            dict_seeded: HashMap::new(),
        }
    }

    pub async fn run(mut self) -> Result<()> {
        loop {
            tokio::select! {
                biased;

                () = self.shared.abort.cancelled() => {
                    let _ = self.framed.get_mut().shutdown().await;
                    return Ok(());
                }

                Some(reason) = self.goaway_rx.recv() => {
                    self.send_goaway(reason).await?;
                }

                () = self.shared.pong.changed() => {
                    if let Some(payload) = self.shared.pong.take_pending() {
                        self.emit(Frame::Ping(Ping::new(payload, true))).await?;
                    }
                }

                _ = self.idle.tick() => {
                    if !self.idle.consume_retry() {
                        warn!("idle timeout exhausted; declaring connection dropped");
                        return Err(MuxError::ConnectionDropped("no activity within the heartbeat budget"));
                    }
                    let payload = self.shared.ping.start_ping();
                    self.emit(Frame::Ping(Ping::new(payload, false))).await?;
                    self.idle.reset();
                }

                () = self.shared.activity.notified() => {
                    self.idle.reset_retries();
                }

                () = self.shared.errors.changed() => {
                    let drained = self.shared.errors.drain();
                    for (id, err) in drained {
                        self.emit(Frame::RstStream(RstStream::new(id.as_u32(), err.reason()))).await?;
                        if let Some(stream) = self.shared.streams.get(id) {
                            stream.abort();
                        }
                        self.shared.streams.delete(id);
                    }
                }

                Some(request) = self.open_rx.recv() => {
                    self.open_stream(request).await?;
                }

                Some(id) = self.shared.ready.next() => {
                    self.drain_stream(id).await?;
                }

                else => return Ok(()),
            }
        }
    }

    async fn emit(&mut self, frame: Frame) -> Result<()> {
        trace!(?frame, "emit");
        self.framed.send(frame).await.map_err(MuxError::Protocol)
    }

    async fn send_goaway(&mut self, reason: Reason) -> Result<()> {
        if !self.goaway_sent.set(true) {
            return Ok(());
        }
        let last = self.shared.streams.largest_peer_id();
        self.emit(Frame::GoAway(GoAway::new(last, reason))).await
    }

    /// Handle a locally-initiated `open_stream` request: allocate an ID,
    /// queue headers, emit whatever is immediately ready, and spawn the body
    /// forwarder if one was supplied.
    async fn open_stream(&mut self, request: OpenStreamRequest) -> Result<()> {
        let OpenStreamRequest {
            headers,
            body,
            responder,
        } = request;

        if self.shared.streams.is_shutdown() {
            let _ = responder.send(Err(MuxError::LostShutdownRace));
            return Ok(());
        }

        let id = self.shared.streams.acquire_local_id();
        let stream = MuxedStream::new(
            id,
            self.shared.initial_window,
            self.shared.max_window,
            self.shared.max_write_buffer,
            self.shared.ready.dupe(),
        );
        stream.write_headers(headers);

        if self.shared.streams.set(stream.dupe()).is_err() {
            let _ = responder.send(Err(MuxError::LostShutdownRace));
            return Ok(());
        }

        if let Some(mut body) = body {
            let forwarded = stream.dupe();
            tokio::spawn(async move {
                let mut buf = [0u8; 16 * 1024];
                loop {
                    match tokio::io::AsyncReadExt::read(&mut body, &mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => forwarded.write_bytes(&buf[..n]),
                    }
                }
                forwarded.close_write();
            });
        }

        let _ = responder.send(Ok(stream.dupe()));
        self.drain_stream(id).await
    }

    /// Drain whatever a ready stream has pending and emit the corresponding
    /// frames. Removes the stream once both sides have signalled EOF.
    async fn drain_stream(&mut self, id: StreamId) -> Result<()> {
        let Some(stream) = self.shared.streams.get(id) else {
            return Ok(());
        };

        let chunk = stream.get_chunk(self.shared.max_frame_size as usize);

        if let Some(headers) = chunk.headers {
            self.emit_headers(id, headers, &stream).await?;
        }

        if chunk.window_update > 0 {
            self.emit(Frame::WindowUpdate(WindowUpdate::new(id.as_u32(), chunk.window_update)))
                .await?;
        }

        if !chunk.data.is_empty() || chunk.end_stream {
            let (payload, dict_growth) = self.maybe_compress(id, chunk.data.clone()).await?;
            self.bytes_since_tick += payload.len() as u64;
            if self.bytes_since_tick >= 1 << 16 {
                self.shared.metrics.record_sent(self.bytes_since_tick);
                self.bytes_since_tick = 0;
            }
            self.emit(Frame::Data(Data::new(id.as_u32(), payload.into(), chunk.end_stream)))
                .await?;

            // The SetDictionary describing this chunk's growth travels after
            // the DATA frame that was compressed against the dictionary's
            // *prior* content, so the peer only folds the growth in once it
            // has decoded the chunk the old content was needed for.
            if let Some((dict_id, plain)) = dict_growth {
                self.emit_dictionary_growth(dict_id, plain).await?;
            }

            // We just sent our own END_STREAM. If the local read side was
            // abandoned before the peer sent its own EOF, the peer would
            // otherwise be left believing this stream is still half-open;
            // force it closed instead of waiting for a RST that may never
            // come.
            if chunk.end_stream && stream.read_abandoned_without_peer_eof() {
                self.emit(Frame::RstStream(RstStream::new(id.as_u32(), Reason::NoError)))
                    .await?;
                stream.note_forced_close();
            }
        }

        if stream.both_sides_closed() {
            self.outbound_dicts.remove(&id);
            let still_used: std::collections::HashSet<u32> = self.outbound_dicts.values().copied().collect();
            self.dict_seeded.retain(|slot, _| still_used.contains(slot));
            self.shared.streams.delete(id);
        } else if stream.has_pending_work() {
            // `get_chunk` caps each visit at one `max_frame_size` DATA frame;
            // re-signal so a write buffer larger than that drains over
            // several passes through this loop instead of waiting for a
            // WINDOW_UPDATE or another wakeup that may never come.
            self.shared.ready.signal(id);
        }

        Ok(())
    }

    async fn emit_headers(&mut self, id: StreamId, headers: HeaderList, stream: &Arc<MuxedStream>) -> Result<()> {
        if self.shared.dictionaries.is_enabled() {
            let meta: RequestMeta = stream.request_meta();
            if meta.is_compressible() {
                if let Some(dict_id) = self.shared.dictionaries.select_for_write(&meta) {
                    self.outbound_dicts.insert(id, dict_id);
                    self.emit(Frame::UseDictionary(UseDictionary::new(id.as_u32(), dict_id)))
                        .await?;
                }
            }
        }
        let block = self.hpack.encode(&headers);
        for frame in split_into_frames(id.as_u32(), block, false, self.shared.max_frame_size) {
            self.emit(frame).await?;
        }
        Ok(())
    }

    /// Compress `plain` against this stream's assigned write dictionary, if
    /// any. Compression always happens against the dictionary's content as
    /// it stands *before* this chunk; the growth that chunk contributes is
    /// returned to the caller rather than announced here, so it can be
    /// emitted only after the `DATA` frame that was compressed against the
    /// old content — both frames travel the same ordered byte stream, so
    /// that ordering is the entire correctness argument.
    async fn maybe_compress(&mut self, id: StreamId, plain: Bytes) -> Result<(Vec<u8>, Option<(u32, Bytes)>)> {
        let Some(&dict_id) = self.outbound_dicts.get(&id) else {
            return Ok((plain.to_vec(), None));
        };
        let Some(dict) = self.shared.dictionaries.write_dict(dict_id) else {
            return Ok((plain.to_vec(), None));
        };
        let dict_bytes = dict.snapshot();
        let compressed = crate::dictionary::compress(self.shared.compression_level, &dict_bytes, &plain)
            .map_err(MuxError::Io)?;

        let mut record = BytesMut::with_capacity(8 + compressed.len());
        record.put_u32_le(compressed.len() as u32);
        record.put_u32_le(plain.len() as u32);
        record.extend_from_slice(&compressed);

        let growth = if plain.is_empty() { None } else { Some((dict_id, plain)) };

        Ok((record.to_vec(), growth))
    }

    /// Fold a chunk's plaintext into its dictionary's tracked content and
    /// emit the `SetDictionary` announcing that growth to the peer. Called
    /// only after the `DATA` frame the growth pertains to has gone out.
    async fn emit_dictionary_growth(&mut self, dict_id: u32, plain: Bytes) -> Result<()> {
        let Some(dict) = self.shared.dictionaries.write_dict(dict_id) else {
            return Ok(());
        };
        dict.apply_update(&plain).await;
        let seeded = self.dict_seeded.insert(dict_id, true).unwrap_or(false);
        let frame = if seeded {
            SetDictionary::append(dict_id, plain)
        } else {
            SetDictionary::whole(dict_id, plain)
        };
        self.emit(Frame::SetDictionary(frame)).await
    }
}

use crate::dupe::Dupe;
