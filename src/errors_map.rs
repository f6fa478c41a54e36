//! Per-stream abort codes collected for the writer.
//
// SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later

use crate::error::StreamError;
use crate::stream::StreamId;
use crate::sync::Signal;
use parking_lot::Mutex;
use std::collections::HashMap;

/// Collects `(StreamId, StreamError)` pairs raised by the reader or by a
/// stream handler, for the writer to turn into RST_STREAM frames.
#[derive(Debug, Default)]
pub struct StreamErrorMap {
    map: Mutex<HashMap<StreamId, StreamError>>,
    signal: Signal,
}

impl StreamErrorMap {
    #[must_use]
    pub fn new() -> Self {
        Self {
            map: Mutex::new(HashMap::new()),
            signal: Signal::new(),
        }
    }

    /// Raise an error against `id`, overwriting any code already recorded,
    /// and wake the writer.
    pub fn raise(&self, id: StreamId, error: StreamError) {
        self.map.lock().insert(id, error);
        self.signal.notify();
    }

    /// Atomically take and clear all collected errors.
    pub fn drain(&self) -> HashMap<StreamId, StreamError> {
        std::mem::take(&mut *self.map.lock())
    }

    pub async fn changed(&self) {
        self.signal.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raise_overwrites_and_drain_clears() {
        let map = StreamErrorMap::new();
        let id = StreamId::new(1).unwrap();
        map.raise(id, StreamError::FlowControl);
        map.raise(id, StreamError::StreamClosed);
        let drained = map.drain();
        assert_eq!(drained.len(), 1);
        assert!(matches!(drained[&id], StreamError::StreamClosed));
        assert!(map.drain().is_empty());
    }
}
