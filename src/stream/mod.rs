//! One logical multiplexed stream: read buffer, write buffer, windows, and
//! half-close bookkeeping.
//
// SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later
//
// The read buffer (`buf::ReadPipe`) has its own internal synchronization;
// one mutex here covers the write buffer's bookkeeping, both flow-control
// windows, the headers-sent flag, and the EOF flags, since the reader
// briefly takes this same lock when crediting the receive window.

pub mod id;
pub use id::{LocalIdAllocator, Role, StreamId};

use crate::buf::{read_pipe, ReadPipeReader, ReadPipeWriter, WriteBuf};
use crate::dictionary::{RequestMeta, StreamDictionaryState};
use crate::error::StreamError;
use crate::frame::headers::HeaderList;
use crate::ready::ReadyList;
use crate::sync::Signal;
use bytes::Bytes;
use parking_lot::Mutex;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Send windows never exceed this, per RFC 7540 §6.9.
const SEND_WINDOW_CEILING: u32 = (1u32 << 31) - 1;

#[derive(Debug)]
struct ReceiveWindow {
    available: u32,
    current_max: u32,
    ceiling: u32,
    pending_update: u32,
}

impl ReceiveWindow {
    fn new(initial: u32, ceiling: u32) -> Self {
        Self {
            available: initial,
            current_max: initial,
            ceiling,
            pending_update: 0,
        }
    }

    /// Debit `n` bytes consumed into the read buffer. Doubles `current_max`
    /// (capped at `ceiling`) once `available` drops below half of it,
    /// crediting the delta back into both `available` and the pending
    /// WINDOW_UPDATE increment.
    fn consume(&mut self, n: u32) -> Result<(), StreamError> {
        if n > self.available {
            return Err(StreamError::FlowControl);
        }
        self.available -= n;
        if self.available < self.current_max / 2 && self.current_max < self.ceiling {
            let new_max = self.current_max.saturating_mul(2).min(self.ceiling);
            let delta = new_max - self.current_max;
            self.current_max = new_max;
            self.available += delta;
            self.pending_update += delta;
        }
        Ok(())
    }

    fn take_pending_update(&mut self) -> u32 {
        std::mem::take(&mut self.pending_update)
    }
}

#[derive(Debug)]
struct SendWindow(u32);

impl SendWindow {
    fn new(initial: u32) -> Self {
        Self(initial)
    }

    fn credit(&mut self, delta: u32) {
        self.0 = self.0.saturating_add(delta).min(SEND_WINDOW_CEILING);
    }

    fn available(&self) -> u32 {
        self.0
    }

    fn debit(&mut self, n: u32) {
        self.0 -= n;
    }
}

struct Inner {
    send_window: SendWindow,
    receive_window: ReceiveWindow,
    pending_headers: Option<HeaderList>,
    headers_sent: bool,
    write_closed: bool,
    sent_eof: bool,
    received_eof: bool,
    dictionary: Option<StreamDictionaryState>,
}

/// What the writer extracts from a stream in one atomic visit.
pub struct Chunk {
    pub headers: Option<HeaderList>,
    pub window_update: u32,
    pub data: Bytes,
    pub end_stream: bool,
}

/// One multiplexed logical stream.
pub struct MuxedStream {
    pub id: StreamId,
    inner: Mutex<Inner>,
    write_buf: WriteBuf,
    read_writer: ReadPipeWriter,
    read_reader: ReadPipeReader,
    inbound_headers: Mutex<Option<HeaderList>>,
    inbound_signal: Signal,
    meta: Mutex<RequestMeta>,
    ready: Arc<ReadyList>,
}

impl std::fmt::Debug for MuxedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MuxedStream").field("id", &self.id).finish_non_exhaustive()
    }
}

impl MuxedStream {
    #[must_use]
    pub fn new(
        id: StreamId,
        initial_window: u32,
        max_window: u32,
        write_soft_cap: usize,
        ready: Arc<ReadyList>,
    ) -> Arc<Self> {
        let (read_writer, read_reader) = read_pipe();
        Arc::new(Self {
            id,
            inner: Mutex::new(Inner {
                send_window: SendWindow::new(initial_window),
                receive_window: ReceiveWindow::new(initial_window, max_window),
                pending_headers: None,
                headers_sent: false,
                write_closed: false,
                sent_eof: false,
                received_eof: false,
                dictionary: None,
            }),
            write_buf: WriteBuf::new(write_soft_cap),
            read_writer,
            read_reader,
            inbound_headers: Mutex::new(None),
            inbound_signal: Signal::new(),
            meta: Mutex::new(RequestMeta::default()),
            ready,
        })
    }

    fn signal_ready(&self) {
        self.ready.signal(self.id);
    }

    // --- outbound (application → writer) ---------------------------------

    /// Queue headers to be emitted; ignored (per "once sent not re-sent") if
    /// headers have already gone out.
    pub fn write_headers(&self, headers: HeaderList) {
        {
            let mut inner = self.inner.lock();
            if inner.headers_sent {
                return;
            }
            let mut meta = self.meta.lock();
            capture_meta(&headers, &mut meta);
            inner.pending_headers = Some(headers);
        }
        self.signal_ready();
    }

    /// Append application bytes to the write buffer.
    pub fn write_bytes(&self, bytes: &[u8]) {
        self.write_buf.push(bytes);
        self.signal_ready();
    }

    pub async fn write_has_space(&self) {
        self.write_buf.has_space_notified().await;
    }

    #[must_use]
    pub fn write_remaining_capacity(&self) -> usize {
        self.write_buf.remaining_capacity()
    }

    /// Mark the write side closed; once the buffer drains, the writer will
    /// emit END_STREAM.
    pub fn close_write(&self) {
        {
            let mut inner = self.inner.lock();
            inner.write_closed = true;
        }
        self.signal_ready();
    }

    #[must_use]
    pub fn request_meta(&self) -> RequestMeta {
        self.meta.lock().clone()
    }

    pub fn set_dictionary(&self, state: StreamDictionaryState) {
        self.inner.lock().dictionary = Some(state);
    }

    pub fn dictionary_in_use(&self) -> Option<u32> {
        self.inner.lock().dictionary.as_ref().map(|d| d.dict_id)
    }

    /// Atomically extract everything the writer needs to emit for this
    /// stream right now.
    pub fn get_chunk(&self, max_bytes: usize) -> Chunk {
        let mut inner = self.inner.lock();
        let headers = if inner.headers_sent {
            None
        } else {
            inner.headers_sent = true;
            inner.pending_headers.take()
        };
        let window_update = inner.receive_window.take_pending_update();
        let cap = max_bytes.min(inner.send_window.available() as usize);
        let data = self.write_buf.drain(cap);
        inner.send_window.debit(data.len() as u32);
        let end_stream = inner.write_closed && self.write_buf.is_empty() && !inner.sent_eof;
        if end_stream {
            inner.sent_eof = true;
        }
        Chunk {
            headers,
            window_update,
            data: Bytes::from(data),
            end_stream,
        }
    }

    #[must_use]
    pub fn has_pending_work(&self) -> bool {
        let inner = self.inner.lock();
        (!inner.headers_sent && inner.pending_headers.is_some())
            || inner.receive_window.pending_update > 0
            || !self.write_buf.is_empty()
            || (inner.write_closed && !inner.sent_eof)
    }

    #[must_use]
    pub fn both_sides_closed(&self) -> bool {
        let inner = self.inner.lock();
        inner.sent_eof && inner.received_eof
    }

    // --- inbound (reader → application) -----------------------------------

    /// Raw bytes arrived for this stream with no dictionary in play.
    pub fn feed_plain(&self, bytes: &[u8]) {
        self.read_writer.push(bytes);
    }

    /// Compressed bytes arrived for a dictionary-bound stream: accumulate
    /// into the pending buffer, decompress standalone zstd frames as they
    /// complete, and push decompressed bytes into the normal read pipe.
    ///
    /// Each compressed record is framed as `compressed_len: u32 LE,
    /// plain_len: u32 LE, compressed_len bytes of zstd frame`, since a
    /// record may itself be split across multiple DATA frames by the peer's
    /// max frame size. `plain_len` travels alongside the compressed length
    /// rather than being guessed from it — a repetitive payload against a
    /// primed dictionary can compress at a ratio no fixed multiplier covers.
    pub fn feed_compressed(
        &self,
        bytes: &[u8],
        dict_bytes: &[u8],
    ) -> std::io::Result<()> {
        let mut inner = self.inner.lock();
        let Some(state) = inner.dictionary.as_mut() else {
            drop(inner);
            self.read_writer.push(bytes);
            return Ok(());
        };
        state.pending.extend_from_slice(bytes);
        loop {
            if state.pending.len() < 8 {
                break;
            }
            let compressed_len = u32::from_le_bytes(state.pending[..4].try_into().unwrap()) as usize;
            let plain_len = u32::from_le_bytes(state.pending[4..8].try_into().unwrap()) as usize;
            if state.pending.len() < 8 + compressed_len {
                break;
            }
            let record: Vec<u8> = state.pending.drain(..8 + compressed_len).skip(8).collect();
            let plain = crate::dictionary::decompress(dict_bytes, &record, plain_len)?;
            self.read_writer.push(&plain);
        }
        Ok(())
    }

    /// Debit the receive window for `n` newly-buffered bytes.
    pub fn consume_receive_window(&self, n: u32) -> Result<(), StreamError> {
        let mut inner = self.inner.lock();
        let result = inner.receive_window.consume(n);
        if result.is_ok() && inner.receive_window.pending_update > 0 {
            drop(inner);
            self.signal_ready();
        }
        result
    }

    pub fn credit_send_window(&self, delta: u32) {
        self.inner.lock().send_window.credit(delta);
        self.signal_ready();
    }

    /// Record an inbound header set (the "most recently received header
    /// set"), optionally with END_STREAM honored atomically.
    pub fn attach_inbound_headers(&self, headers: HeaderList, end_stream: bool) {
        {
            let mut meta = self.meta.lock();
            capture_meta(&headers, &mut meta);
            *self.inbound_headers.lock() = Some(headers);
        }
        if end_stream {
            self.set_received_eof();
        }
        self.inbound_signal.notify();
    }

    #[must_use]
    pub fn take_inbound_headers(&self) -> Option<HeaderList> {
        self.inbound_headers.lock().take()
    }

    /// Peek the most recently received header set without consuming it, for
    /// handlers and `open_stream` callers that read it after the fact.
    #[must_use]
    pub fn headers(&self) -> Option<HeaderList> {
        self.inbound_headers.lock().clone()
    }

    pub async fn inbound_headers_changed(&self) {
        self.inbound_signal.notified().await;
    }

    pub fn set_received_eof(&self) {
        self.inner.lock().received_eof = true;
        self.read_writer.close();
    }

    /// Stop accepting further inbound bytes without having received the
    /// peer's own END_STREAM — the handler returned without reading the
    /// body to completion. Closing the read buffer here (rather than only
    /// on a genuine received EOF) is what lets the writer notice, the next
    /// time it closes this stream's write side, that the peer was never
    /// told to stop: see [`MuxedStream::read_abandoned_without_peer_eof`].
    pub fn abandon_read(&self) {
        self.read_writer.close();
    }

    /// `true` once our own read buffer is closed for a reason other than
    /// the peer's proper END_STREAM (i.e. [`MuxedStream::abandon_read`] was
    /// called, or the pipe was otherwise closed without `received_eof`
    /// being latched). The writer uses this to decide whether sending our
    /// own END_STREAM must be followed by a forced RST_STREAM.
    #[must_use]
    pub fn read_abandoned_without_peer_eof(&self) -> bool {
        self.read_reader.is_closed() && !self.inner.lock().received_eof
    }

    /// Record that the read side is now considered closed after a writer-
    /// forced RST_STREAM, completing the bookkeeping `abandon_read` left
    /// open so [`MuxedStream::both_sides_closed`] becomes true.
    pub fn note_forced_close(&self) {
        self.inner.lock().received_eof = true;
    }

    /// Close both buffers unconditionally (abort/connection teardown).
    pub fn abort(&self) {
        let mut inner = self.inner.lock();
        inner.received_eof = true;
        inner.sent_eof = true;
        inner.write_closed = true;
        drop(inner);
        self.read_writer.close();
    }

    #[must_use]
    pub fn reader(&self) -> ReadPipeReader {
        self.read_reader.clone()
    }
}

fn capture_meta(headers: &HeaderList, meta: &mut RequestMeta) {
    for (name, value) in headers {
        match name.as_str() {
            ":method" => meta.method = Some(value.clone()),
            ":path" => {
                // Parsed as a URL's path component (RFC 3986 `path-absolute`
                // plus optional query): `http::Uri` strips the query for us.
                let path = value
                    .parse::<http::Uri>()
                    .map(|u| u.path().to_string())
                    .unwrap_or_else(|_| value.clone());
                meta.path = Some(path);
            }
            "content-type" => meta.content_type = Some(value.clone()),
            _ => {}
        }
    }
}

impl AsyncRead for MuxedStream {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<std::io::Result<()>> {
        let mut reader = self.read_reader.clone();
        Pin::new(&mut reader).poll_read(cx, buf)
    }
}

impl AsyncWrite for MuxedStream {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<std::io::Result<usize>> {
        self.write_bytes(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        self.close_write();
        Poll::Ready(Ok(()))
    }
}
