//! Metrics updater: aggregates RTT, windows, and throughput counters.
//
// SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later

use crate::ping::PingClock;
use crate::sync::AtomicCounter;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A point-in-time view of connection metrics, returned by `Muxer::metrics`.
#[derive(Debug, Clone, Copy)]
pub struct MetricsSnapshot {
    pub rtt: Option<Duration>,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

/// Owns the running totals the reader and writer feed on every tick.
#[derive(Debug, Default)]
pub struct MetricsUpdater {
    bytes_sent: AtomicCounter,
    bytes_received: AtomicCounter,
    last_rtt_nanos: AtomicI64,
}

impl MetricsUpdater {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_sent(&self, n: u64) {
        self.bytes_sent.add(n);
    }

    pub fn record_received(&self, n: u64) {
        self.bytes_received.add(n);
    }

    pub fn record_rtt(&self, rtt: Duration) {
        self.last_rtt_nanos
            .store(rtt.as_nanos().min(i64::MAX as u128) as i64, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self, ping: &PingClock) -> MetricsSnapshot {
        let _ = ping;
        let nanos = self.last_rtt_nanos.load(Ordering::Relaxed);
        MetricsSnapshot {
            rtt: if nanos == 0 { None } else { Some(Duration::from_nanos(nanos as u64)) },
            bytes_sent: self.bytes_sent.get(),
            bytes_received: self.bytes_received.get(),
        }
    }
}
