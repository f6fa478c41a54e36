//! Active stream map: the authoritative table of live streams, local ID
//! allocation, and the shutdown gate.
//
// SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later

use crate::error::StreamError;
use crate::stream::{LocalIdAllocator, MuxedStream, Role, StreamId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

struct State {
    streams: HashMap<StreamId, Arc<MuxedStream>>,
    largest_peer_id: u32,
    shutdown: bool,
}

/// Owns every live [`MuxedStream`], the local ID allocator, and the
/// "empty streams" notifier used to gate a graceful shutdown.
pub struct StreamTable {
    state: Mutex<State>,
    local_ids: LocalIdAllocator,
    active_count: AtomicUsize,
    empty_notifier: CancellationToken,
}

impl StreamTable {
    #[must_use]
    pub fn new(role: Role) -> Self {
        Self {
            state: Mutex::new(State {
                streams: HashMap::new(),
                largest_peer_id: 0,
                shutdown: false,
            }),
            local_ids: LocalIdAllocator::new(role),
            active_count: AtomicUsize::new(0),
            empty_notifier: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn acquire_local_id(&self) -> StreamId {
        self.local_ids.acquire()
    }

    /// Accept a peer-initiated ID; refuses if shutdown is set or the ID is
    /// not strictly greater than the largest one already observed.
    pub fn acquire_peer_id(&self, id: StreamId) -> Result<(), StreamError> {
        let mut state = self.state.lock();
        if state.shutdown {
            return Err(StreamError::StreamClosed);
        }
        if id.as_u32() <= state.largest_peer_id {
            return Err(StreamError::StreamClosed);
        }
        state.largest_peer_id = id.as_u32();
        Ok(())
    }

    /// Insert a new stream entry. Refuses if the ID is already present or
    /// shutdown has been requested.
    pub fn set(&self, stream: Arc<MuxedStream>) -> Result<(), Arc<MuxedStream>> {
        let mut state = self.state.lock();
        if state.shutdown || state.streams.contains_key(&stream.id) {
            return Err(stream);
        }
        state.streams.insert(stream.id, stream);
        self.active_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, id: StreamId) -> Option<Arc<MuxedStream>> {
        self.state.lock().streams.get(&id).cloned()
    }

    /// Remove a stream entry. Closes the empty-streams notifier (once) if
    /// shutdown is set and this was the last entry.
    pub fn delete(&self, id: StreamId) {
        let removed = self.state.lock().streams.remove(&id).is_some();
        if !removed {
            return;
        }
        let prev = self.active_count.fetch_sub(1, Ordering::Relaxed);
        let state = self.state.lock();
        if state.shutdown && prev - 1 == 0 {
            self.empty_notifier.cancel();
        }
    }

    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn largest_peer_id(&self) -> u32 {
        self.state.lock().largest_peer_id
    }

    /// Mark the table as shutting down; returns the empty-streams notifier
    /// and whether shutdown was already in progress. Idempotent.
    pub fn shutdown(&self) -> (CancellationToken, bool) {
        let mut state = self.state.lock();
        let already = state.shutdown;
        state.shutdown = true;
        if !already && state.streams.is_empty() {
            self.empty_notifier.cancel();
        }
        (self.empty_notifier.clone(), already)
    }

    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.state.lock().shutdown
    }

    /// Abort every live stream and latch shutdown unconditionally.
    pub fn abort(&self) {
        let mut state = self.state.lock();
        state.shutdown = true;
        for stream in state.streams.values() {
            stream.abort();
        }
        self.empty_notifier.cancel();
    }

    /// All streams whose ID is locally allocated and greater than
    /// `last_stream_id`, closed on receipt of GOAWAY.
    pub fn abort_local_streams_after(&self, last_stream_id: u32, local_role: Role) {
        let state = self.state.lock();
        for (id, stream) in state.streams.iter() {
            let is_local = match local_role {
                Role::Client => id.is_client_initiated(),
                Role::Server => !id.is_client_initiated(),
            };
            if is_local && id.as_u32() > last_stream_id {
                stream.abort();
            }
        }
    }

    #[must_use]
    pub fn snapshot_ids(&self) -> Vec<StreamId> {
        self.state.lock().streams.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ready::ReadyList;

    fn new_stream(id: u32, ready: &Arc<ReadyList>) -> Arc<MuxedStream> {
        MuxedStream::new(StreamId::new(id).unwrap(), 1024, 4096, 8192, ready.clone())
    }

    #[test]
    fn set_refuses_duplicate_id() {
        let table = StreamTable::new(Role::Client);
        let ready = Arc::new(ReadyList::new());
        let s1 = new_stream(1, &ready);
        let s2 = new_stream(1, &ready);
        assert!(table.set(s1).is_ok());
        assert!(table.set(s2).is_err());
    }

    #[test]
    fn acquire_peer_id_rejects_non_increasing() {
        let table = StreamTable::new(Role::Server);
        let id1 = StreamId::new(1).unwrap();
        let id2 = StreamId::new(1).unwrap();
        assert!(table.acquire_peer_id(id1).is_ok());
        assert!(table.acquire_peer_id(id2).is_err());
    }

    #[test]
    fn shutdown_closes_notifier_when_already_empty() {
        let table = StreamTable::new(Role::Client);
        let (notifier, already) = table.shutdown();
        assert!(!already);
        assert!(notifier.is_cancelled());
    }

    #[test]
    fn shutdown_closes_notifier_once_last_stream_removed() {
        let table = StreamTable::new(Role::Client);
        let ready = Arc::new(ReadyList::new());
        let s = new_stream(1, &ready);
        let id = s.id;
        table.set(s).unwrap();
        let (notifier, _) = table.shutdown();
        assert!(!notifier.is_cancelled());
        table.delete(id);
        assert!(notifier.is_cancelled());
    }

    #[test]
    fn shutdown_is_idempotent() {
        let table = StreamTable::new(Role::Client);
        let (n1, already1) = table.shutdown();
        let (n2, already2) = table.shutdown();
        assert!(!already1);
        assert!(already2);
        assert!(n1.is_cancelled());
        assert!(n2.is_cancelled());
    }
}
