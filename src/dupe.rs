//! A marker trait for cheap, reference-count-style clones.
//!
//! SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later
//!
//! Calling `.clone()` on an `Arc<T>` or a `tokio::sync::mpsc::Sender<T>` is
//! O(1) and only bumps a refcount, but reading `foo.clone()` in a diff gives
//! no hint of that. `Dupe::dupe()` exists purely so that the call site is
//! self-documenting: everything implementing it is known to be cheap to
//! duplicate.

use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// Types that can be cheaply duplicated (as opposed to deep-cloned).
pub trait Dupe {
    /// Duplicate `self`. Always O(1).
    fn dupe(&self) -> Self;
}

impl<T> Dupe for Arc<T> {
    #[inline]
    fn dupe(&self) -> Self {
        Arc::clone(self)
    }
}

impl<T> Dupe for mpsc::Sender<T> {
    #[inline]
    fn dupe(&self) -> Self {
        self.clone()
    }
}

impl<T> Dupe for mpsc::UnboundedSender<T> {
    #[inline]
    fn dupe(&self) -> Self {
        self.clone()
    }
}

impl<T> Dupe for broadcast::Sender<T> {
    #[inline]
    fn dupe(&self) -> Self {
        self.clone()
    }
}

impl<T> Dupe for Option<oneshot::Sender<T>> {
    #[inline]
    fn dupe(&self) -> Self {
        // `oneshot::Sender` is single-use and cannot be duplicated; this
        // impl only exists to let callers `dupe()` an `Option` that is
        // usually `None` at the point of duplication.
        None
    }
}

impl Dupe for CancellationToken {
    #[inline]
    fn dupe(&self) -> Self {
        self.clone()
    }
}
