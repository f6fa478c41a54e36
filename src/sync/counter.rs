//! Lock-free accumulator with read-and-reset.
//
// SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later
//
// Same ordering discipline the teacher uses for its per-stream atomics: we
// are counting bytes, not protecting memory accesses, so `Relaxed` is fine
// throughout.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct AtomicCounter(AtomicU64);

impl AtomicCounter {
    #[must_use]
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    #[inline]
    pub fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    /// Atomically read the accumulated value and reset it to zero.
    #[inline]
    pub fn take(&self) -> u64 {
        self.0.swap(0, Ordering::Relaxed)
    }

    #[inline]
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}
