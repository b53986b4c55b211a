//! Notification statistics shared between handlers and the main loop.
//!
//! Handlers run with the notification pool locked, so recording is a
//! handful of atomic stores and never blocks.

use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of notification statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Number of notifications received.
    pub fires: u64,
    /// Extended timestamp of the latest notification.
    pub last_timestamp_us: u64,
    /// Largest deviation of an observed period from the expected one.
    pub max_jitter_us: u64,
    /// Notifications whose timestamp did not advance past the previous one.
    pub non_monotonic: u64,
}

/// Counters updated from a repeating notification handler.
#[derive(Debug)]
pub struct NotificationStats {
    expected_period_us: u64,
    fires: AtomicU64,
    last_timestamp_us: AtomicU64,
    max_jitter_us: AtomicU64,
    non_monotonic: AtomicU64,
}

impl NotificationStats {
    /// Create stats for a notification expected every `expected_period_us`.
    pub fn new(expected_period_us: u64) -> Self {
        Self {
            expected_period_us,
            fires: AtomicU64::new(0),
            last_timestamp_us: AtomicU64::new(0),
            max_jitter_us: AtomicU64::new(0),
            non_monotonic: AtomicU64::new(0),
        }
    }

    /// Record one notification delivered at `timestamp_us`.
    pub fn record(&self, timestamp_us: u64) {
        let previous = self.last_timestamp_us.swap(timestamp_us, Ordering::Relaxed);
        let fires = self.fires.fetch_add(1, Ordering::Relaxed);
        if fires == 0 {
            return;
        }

        if timestamp_us <= previous {
            self.non_monotonic.fetch_add(1, Ordering::Relaxed);
            return;
        }
        let jitter = (timestamp_us - previous).abs_diff(self.expected_period_us);
        self.max_jitter_us.fetch_max(jitter, Ordering::Relaxed);
    }

    /// Take a snapshot of the counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            fires: self.fires.load(Ordering::Relaxed),
            last_timestamp_us: self.last_timestamp_us.load(Ordering::Relaxed),
            max_jitter_us: self.max_jitter_us.load(Ordering::Relaxed),
            non_monotonic: self.non_monotonic.load(Ordering::Relaxed),
        }
    }
}
