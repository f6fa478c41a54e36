//! Ping timestamp and RTT estimation.
//
// SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later

use crate::sync::Signal;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Current time as signed nanoseconds since the epoch, matching the
/// little-endian signed 8-byte PING payload this muxer exchanges.
#[must_use]
pub fn now_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as i64
}

/// An atomic nanosecond timestamp plus a change notification.
///
/// The writer stores the timestamp it is waiting to have acknowledged; the
/// reader, on a PING ACK carrying that same timestamp, computes the RTT as
/// `now - stored`.
#[derive(Debug, Default)]
pub struct PingClock {
    outstanding: AtomicI64,
    changed: Signal,
}

/// Sentinel meaning "no PING outstanding".
const NONE: i64 = i64::MIN;

impl PingClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            outstanding: AtomicI64::new(NONE),
            changed: Signal::new(),
        }
    }

    /// Record that we are about to send a PING with payload `now_nanos()`,
    /// and return that timestamp to embed in the frame.
    pub fn start_ping(&self) -> i64 {
        let ts = now_nanos();
        self.outstanding.store(ts, Ordering::Release);
        self.changed.notify();
        ts
    }

    /// Process an inbound PING ACK payload. Returns the measured RTT if the
    /// payload matches our outstanding PING.
    pub fn record_ack(&self, payload: i64) -> Option<Duration> {
        let outstanding = self.outstanding.swap(NONE, Ordering::AcqRel);
        if outstanding == NONE || outstanding != payload {
            return None;
        }
        let elapsed_nanos = now_nanos().saturating_sub(payload).max(0);
        Some(Duration::from_nanos(elapsed_nanos as u64))
    }

    /// Wait until `start_ping` is called (used by the writer to emit a
    /// PING ACK when it has recorded a peer's PING timestamp; see
    /// [`PongClock`]).
    pub async fn changed(&self) {
        self.changed.notified().await;
    }
}

/// The PING-ACK-pending side: the reader records the peer's PING payload
/// here so the writer can emit the ACK.
#[derive(Debug, Default)]
pub struct PongClock {
    pending: AtomicI64,
    signal: Signal,
}

impl PongClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            pending: AtomicI64::new(NONE),
            signal: Signal::new(),
        }
    }

    /// Called by the reader when a non-ACK PING arrives.
    pub fn record_ping(&self, payload: i64) {
        self.pending.store(payload, Ordering::Release);
        self.signal.notify();
    }

    /// Called by the writer; returns the payload to ACK, if any is pending.
    pub fn take_pending(&self) -> Option<i64> {
        let v = self.pending.swap(NONE, Ordering::AcqRel);
        if v == NONE { None } else { Some(v) }
    }

    pub async fn changed(&self) {
        self.signal.notified().await;
    }
}
