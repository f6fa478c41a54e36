//! Once-settable tri-state boolean.
//
// SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later

use std::sync::atomic::{AtomicU8, Ordering};

const UNSET: u8 = 0;
const TRUE: u8 = 1;
const FALSE: u8 = 2;

/// A value that starts `Unset` and can be set to `True` or `False` exactly
/// once; later `set()` calls are no-ops. Reads never block.
#[derive(Debug, Default)]
pub struct Fuse(AtomicU8);

impl Fuse {
    #[must_use]
    pub fn new() -> Self {
        Self(AtomicU8::new(UNSET))
    }

    /// Set the fuse, if it is not already set. Returns `true` if this call
    /// performed the set.
    pub fn set(&self, value: bool) -> bool {
        let target = if value { TRUE } else { FALSE };
        self.0
            .compare_exchange(UNSET, target, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Current value: `None` if unset.
    #[must_use]
    pub fn get(&self) -> Option<bool> {
        match self.0.load(Ordering::Acquire) {
            UNSET => None,
            TRUE => Some(true),
            _ => Some(false),
        }
    }

    #[must_use]
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire) != UNSET
    }
}
