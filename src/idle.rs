//! Jittered periodic tick with bounded retry count.
//
// SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later
//
// The writer resets this timer's retry count on any activity; when it
// fires with no intervening activity it consumes one retry and
// emits a PING, until the retry budget is exhausted, at which point the
// connection is declared dropped. Jitter is drawn from `rand`, the same
// dependency the teacher already seeds its interval jitter from.

use rand::Rng;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, Interval, MissedTickBehavior};

fn jittered_period(base: Duration) -> Duration {
    let multiplier: f64 = rand::rng().random_range(1.0..2.0);
    base.mul_f64(multiplier)
}

/// A single timer with period = `base * jitter`, jitter uniform in `[1, 2)`,
/// plus a retry budget that callers consume and reset explicitly.
///
/// The retry counter lives behind an `Arc` so the owning [`crate::mux::Muxer`]
/// can expose `timer_retries()` without holding the writer's `&mut self`.
pub struct IdleTimer {
    base: Duration,
    interval: Interval,
    retries: Arc<AtomicU32>,
    max_retries: u32,
}

impl std::fmt::Debug for IdleTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdleTimer")
            .field("base", &self.base)
            .field("retries", &self.retries.load(Ordering::Relaxed))
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl IdleTimer {
    #[must_use]
    pub fn new(base: Duration, max_retries: u32) -> Self {
        Self::with_counter(base, max_retries, Arc::new(AtomicU32::new(0)))
    }

    /// Construct a timer whose retry counter is a pre-existing `Arc`, so a
    /// caller retains read access to it independent of the timer's owner.
    #[must_use]
    pub fn with_counter(base: Duration, max_retries: u32, retries: Arc<AtomicU32>) -> Self {
        let mut interval = tokio::time::interval(jittered_period(base));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick of a freshly created `Interval` fires immediately;
        // consume it so the timer's first real fire is after one full
        // jittered period.
        interval.reset_after(jittered_period(base));
        Self {
            base,
            interval,
            retries,
            max_retries,
        }
    }

    /// Clone of the `Arc` backing this timer's retry counter.
    #[must_use]
    pub fn counter(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.retries)
    }

    /// Wait for the timer to fire.
    pub async fn tick(&mut self) -> Instant {
        self.interval.tick().await
    }

    /// Reset the timer with a freshly jittered period.
    pub fn reset(&mut self) {
        self.interval.reset_after(jittered_period(self.base));
    }

    /// Reset the retry counter to zero; called on any connection activity.
    pub fn reset_retries(&self) {
        self.retries.store(0, Ordering::Relaxed);
    }

    /// Consume one retry. Returns `false` if the budget is now exhausted
    /// (the connection should be declared dropped).
    pub fn consume_retry(&self) -> bool {
        let prev = self.retries.fetch_add(1, Ordering::Relaxed);
        prev < self.max_retries
    }

    #[must_use]
    pub fn retries(&self) -> u32 {
        self.retries.load(Ordering::Relaxed)
    }
}
