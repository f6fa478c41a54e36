//! Single-producer/single-consumer byte pipe with EOF.
//
// SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later
//
// The read buffer of a muxed stream. Bytes pushed by the reader accumulate
// here; the owning handler reads them out via `AsyncRead`. Closing the pipe
// (on END_STREAM, RST_STREAM, or connection teardown) unblocks any pending
// reader with EOF rather than an error: a received EOF implies the read
// buffer is closed, not broken.
//
// Built on a mutex-guarded `VecDeque<u8>` plus a `Notify`, the same
// partition the teacher uses for its write-side bookkeeping, rather than
// reusing `tokio::io::duplex`: we need to observe exactly how many bytes are
// sitting in the buffer for receive-window accounting, which a generic duplex
// pipe does not expose.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::task::{Context, Poll, Waker};
use tokio::io::{AsyncRead, ReadBuf};

#[derive(Debug, Default)]
struct State {
    bytes: VecDeque<u8>,
    closed: bool,
    waker: Option<Waker>,
}

/// The write (producer) side of a [`ReadPipe`].
#[derive(Debug, Clone)]
pub struct ReadPipeWriter {
    inner: std::sync::Arc<Mutex<State>>,
}

/// The read (consumer) side of a [`ReadPipe`], implementing [`AsyncRead`].
#[derive(Debug, Clone)]
pub struct ReadPipeReader {
    inner: std::sync::Arc<Mutex<State>>,
}

/// Create a connected writer/reader pair.
#[must_use]
pub fn read_pipe() -> (ReadPipeWriter, ReadPipeReader) {
    let inner = std::sync::Arc::new(Mutex::new(State::default()));
    (
        ReadPipeWriter {
            inner: inner.clone(),
        },
        ReadPipeReader { inner },
    )
}

impl ReadPipeWriter {
    /// Append bytes. No-op if the pipe is already closed.
    pub fn push(&self, bytes: &[u8]) {
        let mut state = self.inner.lock();
        if state.closed {
            return;
        }
        state.bytes.extend(bytes.iter().copied());
        if let Some(waker) = state.waker.take() {
            waker.wake();
        }
    }

    /// Close the pipe: pending and future reads see EOF once buffered bytes
    /// are drained. Idempotent.
    pub fn close(&self) {
        let mut state = self.inner.lock();
        state.closed = true;
        if let Some(waker) = state.waker.take() {
            waker.wake();
        }
    }

    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.inner.lock().bytes.len()
    }
}

impl ReadPipeReader {
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.inner.lock().bytes.len()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }
}

impl AsyncRead for ReadPipeReader {
    fn poll_read(
        self: std::pin::Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let mut state = self.inner.lock();
        if state.bytes.is_empty() {
            if state.closed {
                return Poll::Ready(Ok(()));
            }
            state.waker = Some(cx.waker().clone());
            return Poll::Pending;
        }
        let n = buf.remaining().min(state.bytes.len());
        for _ in 0..n {
            // `unwrap`: bounded by `state.bytes.len()` above.
            buf.put_slice(&[state.bytes.pop_front().unwrap()]);
        }
        Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn reads_then_eof() {
        let (w, mut r) = read_pipe();
        w.push(b"hello");
        w.close();
        let mut out = Vec::new();
        r.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"hello");
    }

    #[tokio::test]
    async fn blocks_until_bytes_arrive() {
        let (w, mut r) = read_pipe();
        let handle = tokio::spawn(async move {
            let mut buf = [0u8; 5];
            r.read_exact(&mut buf).await.unwrap();
            buf
        });
        tokio::task::yield_now().await;
        w.push(b"world");
        let buf = handle.await.unwrap();
        assert_eq!(&buf, b"world");
    }

    #[tokio::test]
    async fn immediate_eof_on_empty_close() {
        let (w, mut r) = read_pipe();
        w.close();
        let mut buf = [0u8; 1];
        let n = tokio::io::AsyncReadExt::read(&mut r, &mut buf).await.unwrap();
        assert_eq!(n, 0);
    }
}
