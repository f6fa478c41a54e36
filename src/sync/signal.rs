//! Edge-triggered "something happened" primitive.
//
// SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later

use tokio::sync::Notify;

/// A thin wrapper over [`tokio::sync::Notify`] used wherever a bare
/// "signal"/"re-signal" is needed without any payload attached.
#[derive(Debug, Default)]
pub struct Signal(Notify);

impl Signal {
    #[must_use]
    pub fn new() -> Self {
        Self(Notify::new())
    }

    /// Wake one waiter, or remember the notification for the next
    /// `notified()` call if nobody is currently waiting.
    #[inline]
    pub fn notify(&self) {
        self.0.notify_one();
    }

    /// Wait for the next `notify()`.
    #[inline]
    pub async fn notified(&self) {
        self.0.notified().await;
    }
}
