use std::sync::atomic::{AtomicI64, Ordering};

use sts_core::current_unix_timestamp_ms;
use sts_types::{FeedKind, HealthReport, Liveness};

/// Longest tolerated silence of either feed.
pub const LIVENESS_THRESHOLD_MS: i64 = 10 * 60 * 1000;

/// Dead when the staler of the two feeds is older than the threshold.
pub fn liveness_at(now_ms: i64, last_status_feed_ms: i64, last_cross_reference_ms: i64) -> Liveness {
    let silence = (now_ms - last_status_feed_ms).max(now_ms - last_cross_reference_ms);
    if silence > LIVENESS_THRESHOLD_MS {
        Liveness::Dead
    } else {
        Liveness::Fine
    }
}

/// Last update time of each feed. Both start at construction time.
#[derive(Debug)]
pub struct HealthMonitor {
    last_status_feed_ms: AtomicI64,
    last_cross_reference_ms: AtomicI64,
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthMonitor {
    pub fn new() -> Self {
        Self::started_at(current_unix_timestamp_ms())
    }

    pub fn started_at(now_ms: i64) -> Self {
        Self {
            last_status_feed_ms: AtomicI64::new(now_ms),
            last_cross_reference_ms: AtomicI64::new(now_ms),
        }
    }

    pub fn record(&self, kind: FeedKind, at_ms: i64) {
        let slot = match kind {
            FeedKind::StatusFeed => &self.last_status_feed_ms,
            FeedKind::CrossReference => &self.last_cross_reference_ms,
        };
        slot.store(at_ms, Ordering::Release);
    }

    pub fn report(&self) -> HealthReport {
        self.report_at(current_unix_timestamp_ms())
    }

    pub fn report_at(&self, now_ms: i64) -> HealthReport {
        let last_status_feed_ms = self.last_status_feed_ms.load(Ordering::Acquire);
        let last_cross_reference_ms = self.last_cross_reference_ms.load(Ordering::Acquire);
        HealthReport {
            last_status_feed_ms: last_status_feed_ms as f64,
            last_cross_reference_ms: last_cross_reference_ms as f64,
            status: liveness_at(now_ms, last_status_feed_ms, last_cross_reference_ms),
        }
    }
}
