//! Unbounded-by-default byte sink with a soft upper bound.
//
// SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later
//
// The write buffer of a muxed stream. Writers append; the writer loop drains
// chunks out through `drain_chunk`. Structurally the same "state behind a
// mutex + `Notify` signalled on drain" idiom the teacher uses for its
// `psh_send_remaining`/`writer_waker` pairing, generalized from a frame-credit
// counter to a raw byte sink since this transport's backpressure is
// byte-level rather than frame-credit.

use parking_lot::Mutex;
use std::collections::VecDeque;

#[derive(Debug)]
struct State {
    bytes: VecDeque<u8>,
    soft_cap: usize,
}

/// A stream's outgoing byte buffer. Not `Clone`; owned by [`crate::stream::MuxedStream`]
/// and accessed through its single write-side mutex — this type itself
/// holds no lock of its own beyond the internal `Mutex` used for the
/// soft-cap bookkeeping that `AsyncWrite` needs independent of the rest of
/// the stream state.
#[derive(Debug)]
pub struct WriteBuf {
    state: Mutex<State>,
    has_space: tokio::sync::Notify,
}

impl WriteBuf {
    #[must_use]
    pub fn new(soft_cap: usize) -> Self {
        Self {
            state: Mutex::new(State {
                bytes: VecDeque::new(),
                soft_cap,
            }),
            has_space: tokio::sync::Notify::new(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Room left before the soft cap. Writers are expected to block (via
    /// `has_space_notified`) when this reaches zero.
    #[must_use]
    pub fn remaining_capacity(&self) -> usize {
        let state = self.state.lock();
        state.soft_cap.saturating_sub(state.bytes.len())
    }

    /// Append bytes regardless of capacity (the soft cap is advisory;
    /// callers are expected to check `remaining_capacity` first, but this
    /// never rejects a write outright, matching "unbounded-by-default").
    pub fn push(&self, bytes: &[u8]) {
        self.state.lock().bytes.extend(bytes.iter().copied());
    }

    /// Remove and return up to `max_len` bytes from the front.
    pub fn drain(&self, max_len: usize) -> Vec<u8> {
        let mut state = self.state.lock();
        let n = max_len.min(state.bytes.len());
        let out: Vec<u8> = state.bytes.drain(..n).collect();
        if n > 0 {
            drop(state);
            self.has_space.notify_waiters();
        }
        out
    }

    /// Wait for the "space became available" notification (fired whenever
    /// `drain` removes at least one byte).
    pub async fn has_space_notified(&self) {
        self.has_space.notified().await;
    }
}
