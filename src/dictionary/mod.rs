//! Per-connection compression dictionary table and cross-stream dictionary
//! update serialization.
//
// SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later
//
// Only `zstd` publishes a dictionary-seeded streaming codec in the pack's
// dependency universe, so compression itself is delegated to
// `zstd::bulk::{Compressor, Decompressor}::with_dictionary`. A dictionary's
// bytes mutate while streams are actively compressing/decompressing against
// it; the per-dictionary `tokio::sync::Mutex` below is acquired in enqueue
// order, which gives update application the same FIFO guarantee a hand-rolled
// queue would, since `tokio::sync::Mutex` wakes waiters in registration
// order.

mod ring;

use parking_lot::Mutex as SyncMutex;
use ring::Ring;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex as AsyncMutex;

/// One dictionary slot: current contents plus the lock that serializes
/// updates to those contents across concurrently-compressing streams.
#[derive(Debug)]
pub struct Dictionary {
    content: SyncMutex<Ring>,
    order_lock: AsyncMutex<()>,
}

impl Dictionary {
    fn new(max_len: usize) -> Self {
        Self {
            content: SyncMutex::new(Ring::new(max_len)),
            order_lock: AsyncMutex::new(()),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<u8> {
        self.content.lock().snapshot()
    }

    /// Append `data` to this dictionary's contents, waiting for any
    /// previously enqueued append (from another stream) to land first.
    pub async fn apply_update(&self, data: &[u8]) {
        let _turn = self.order_lock.lock().await;
        self.content.lock().append(data);
    }
}

/// Which stream, by its originally-sent method/path/content-type, selects a
/// dictionary slot.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    pub method: Option<String>,
    pub path: Option<String>,
    pub content_type: Option<String>,
}

impl RequestMeta {
    #[must_use]
    pub fn is_compressible(&self) -> bool {
        let method_ok = matches!(self.method.as_deref(), Some("GET") | Some("POST"));
        let type_ok = self
            .content_type
            .as_deref()
            .map(|ct| ct.starts_with("text") || TEXT_COMPRESSIBLE_TYPES.contains(&ct))
            .unwrap_or(false);
        method_ok && type_ok
    }
}

const TEXT_COMPRESSIBLE_TYPES: &[&str] = &[
    "application/json",
    "application/xml",
    "application/javascript",
];

/// A per-connection set of read and write dictionary slots plus the routing
/// tables the write side uses to pick one.
#[derive(Debug)]
pub struct DictionaryTable {
    read_dicts: Vec<Dictionary>,
    write_dicts: Vec<Dictionary>,
    path_routes: SyncMutex<HashMap<String, usize>>,
    type_routes: SyncMutex<HashMap<String, usize>>,
    next_write_slot: AtomicUsize,
    level: i32,
}

impl DictionaryTable {
    #[must_use]
    pub fn new(count: usize, max_size: usize, level: i32) -> Self {
        Self {
            read_dicts: (0..count).map(|_| Dictionary::new(max_size)).collect(),
            write_dicts: (0..count).map(|_| Dictionary::new(max_size)).collect(),
            path_routes: SyncMutex::new(HashMap::new()),
            type_routes: SyncMutex::new(HashMap::new()),
            next_write_slot: AtomicUsize::new(0),
            level,
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !self.write_dicts.is_empty()
    }

    #[must_use]
    pub fn read_dict(&self, id: u32) -> Option<&Dictionary> {
        self.read_dicts.get(id as usize)
    }

    #[must_use]
    pub fn write_dict(&self, id: u32) -> Option<&Dictionary> {
        self.write_dicts.get(id as usize)
    }

    /// Select the dictionary slot for an outbound message: a slot already
    /// routed to this path wins, then one routed to this content type, then
    /// a fresh slot allocated in increasing order until the table is
    /// exhausted (after which the last slot is reused as the generic one).
    pub fn select_for_write(&self, meta: &RequestMeta) -> Option<u32> {
        if self.write_dicts.is_empty() {
            return None;
        }
        if let Some(path) = &meta.path {
            if let Some(&slot) = self.path_routes.lock().get(path) {
                return Some(slot as u32);
            }
        }
        if let Some(ct) = &meta.content_type {
            if let Some(&slot) = self.type_routes.lock().get(ct) {
                return Some(slot as u32);
            }
        }
        let slot = self.allocate_slot();
        if let Some(path) = &meta.path {
            self.path_routes.lock().insert(path.clone(), slot);
        } else if let Some(ct) = &meta.content_type {
            self.type_routes.lock().insert(ct.clone(), slot);
        }
        Some(slot as u32)
    }

    fn allocate_slot(&self) -> usize {
        let last = self.write_dicts.len() - 1;
        let slot = self.next_write_slot.fetch_add(1, Ordering::Relaxed);
        slot.min(last)
    }

    #[must_use]
    pub fn level(&self) -> i32 {
        self.level
    }
}

/// Compress `data` against `dict`, producing a standalone zstd frame.
pub fn compress(level: i32, dict: &[u8], data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut compressor = zstd::bulk::Compressor::with_dictionary(level, dict)?;
    compressor.compress(data)
}

/// Decompress a standalone zstd frame produced by [`compress`] against `dict`.
pub fn decompress(dict: &[u8], data: &[u8], capacity: usize) -> std::io::Result<Vec<u8>> {
    let mut decompressor = zstd::bulk::Decompressor::with_dictionary(dict)?;
    decompressor.decompress(data, capacity)
}

/// Per-stream dictionary state: which slot is in use and the accumulator
/// for length-prefixed compressed records arriving split across DATA
/// frames (mirrors how HEADERS blocks split across CONTINUATION).
#[derive(Debug)]
pub struct StreamDictionaryState {
    pub dict_id: u32,
    pub pending: Vec<u8>,
}

impl StreamDictionaryState {
    #[must_use]
    pub fn new(dict_id: u32) -> Self {
        Self {
            dict_id,
            pending: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compressible_requires_method_and_type() {
        let mut meta = RequestMeta {
            method: Some("GET".into()),
            path: Some("/a".into()),
            content_type: Some("text/plain".into()),
        };
        assert!(meta.is_compressible());
        meta.method = Some("DELETE".into());
        assert!(!meta.is_compressible());
    }

    #[test]
    fn select_for_write_prefers_path_then_type_then_generic() {
        let table = DictionaryTable::new(3, 1024, 3);
        let meta_a = RequestMeta {
            method: Some("GET".into()),
            path: Some("/a".into()),
            content_type: Some("text/plain".into()),
        };
        let slot_a = table.select_for_write(&meta_a).unwrap();
        let slot_a_again = table.select_for_write(&meta_a).unwrap();
        assert_eq!(slot_a, slot_a_again);

        let meta_b = RequestMeta {
            method: Some("POST".into()),
            path: Some("/b".into()),
            content_type: Some("text/plain".into()),
        };
        let slot_b = table.select_for_write(&meta_b).unwrap();
        assert_ne!(slot_a, slot_b);
    }

    #[tokio::test]
    async fn compress_decompress_roundtrip() {
        let dict = b"hello hello hello world".to_vec();
        let data = b"hello world, hello again";
        let compressed = compress(3, &dict, data).unwrap();
        let decompressed = decompress(&dict, &compressed, data.len()).unwrap();
        assert_eq!(decompressed, data);
    }
}
