//! Time spent between status thresholds.
//!
//! Each threshold pair counts an identifier at most once per process: once it
//! has been considered, it stays in the pair's seen set even when its
//! duration could not be resolved.

use std::collections::HashSet;
use std::sync::Arc;

use arc_swap::ArcSwap;
use sts_core::utc_day_start_ms;
use sts_store::{EventQuery, EventStore, INDEX_PATTERN};
use sts_types::{status_at_least, MetricsSnapshot, StatusEvent};

const MINUTE_MS: f64 = 60_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdPair {
    pub lower: &'static str,
    pub upper: &'static str,
}

/// Pair reported as `saku*`.
pub const PRIMARY_PAIR: ThresholdPair = ThresholdPair {
    lower: "50",
    upper: "70",
};
/// Pair reported as `shin*`.
pub const SECONDARY_PAIR: ThresholdPair = ThresholdPair {
    lower: "70",
    upper: "72",
};

/// Minutes from the first event at or above `lower` to the first later event
/// at or above `upper`, provided an event below `lower` was seen first.
///
/// `events` must be ascending by time.
pub fn crossing_duration_minutes(events: &[StatusEvent], pair: ThresholdPair) -> Option<f64> {
    let below = events
        .iter()
        .position(|event| !status_at_least(&event.status_code, pair.lower))?;
    let start_offset = events[below + 1..]
        .iter()
        .position(|event| status_at_least(&event.status_code, pair.lower))?;
    let start = below + 1 + start_offset;
    let end = events[start + 1..]
        .iter()
        .find(|event| status_at_least(&event.status_code, pair.upper))?;
    Some((end.timestamp_ms - events[start].timestamp_ms) as f64 / MINUTE_MS)
}

/// Read-only view of the running totals.
#[derive(Debug, Clone)]
pub struct MetricsHandle {
    snapshot: Arc<ArcSwap<MetricsSnapshot>>,
}

impl MetricsHandle {
    pub fn snapshot(&self) -> MetricsSnapshot {
        **self.snapshot.load()
    }
}

#[derive(Debug, Default)]
struct PairState {
    seen: HashSet<String>,
    count: i64,
    total_minutes: f64,
}

pub struct MetricsAccumulator {
    store: Arc<dyn EventStore>,
    index_pattern: String,
    primary: PairState,
    secondary: PairState,
    snapshot: Arc<ArcSwap<MetricsSnapshot>>,
}

impl MetricsAccumulator {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self {
            store,
            index_pattern: INDEX_PATTERN.to_string(),
            primary: PairState::default(),
            secondary: PairState::default(),
            snapshot: Arc::new(ArcSwap::from_pointee(MetricsSnapshot::default())),
        }
    }

    pub fn handle(&self) -> MetricsHandle {
        MetricsHandle {
            snapshot: Arc::clone(&self.snapshot),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        **self.snapshot.load()
    }

    pub fn has_seen(&self, pair: ThresholdPair, identifier: &str) -> bool {
        self.pair_state(pair)
            .map(|state| state.seen.contains(identifier))
            .unwrap_or(false)
    }

    fn pair_state(&self, pair: ThresholdPair) -> Option<&PairState> {
        if pair == PRIMARY_PAIR {
            Some(&self.primary)
        } else if pair == SECONDARY_PAIR {
            Some(&self.secondary)
        } else {
            None
        }
    }

    /// Folds one status cycle into the totals and publishes a new snapshot.
    pub async fn absorb_cycle(&mut self, events: &[StatusEvent], now_ms: i64) -> MetricsSnapshot {
        let day_start_ms = utc_day_start_ms(now_ms);
        let store = Arc::clone(&self.store);
        for (pair, state) in [
            (PRIMARY_PAIR, &mut self.primary),
            (SECONDARY_PAIR, &mut self.secondary),
        ] {
            absorb_pair(
                store.as_ref(),
                &self.index_pattern,
                pair,
                state,
                events,
                day_start_ms,
                now_ms,
            )
            .await;
        }
        let snapshot = MetricsSnapshot {
            primary_count: self.primary.count,
            primary_total_minutes: self.primary.total_minutes,
            secondary_count: self.secondary.count,
            secondary_total_minutes: self.secondary.total_minutes,
        };
        self.snapshot.store(Arc::new(snapshot));
        snapshot
    }
}

async fn absorb_pair(
    store: &dyn EventStore,
    index_pattern: &str,
    pair: ThresholdPair,
    state: &mut PairState,
    events: &[StatusEvent],
    day_start_ms: i64,
    now_ms: i64,
) {
    let mut candidates: Vec<&str> = Vec::new();
    for event in events {
        let identifier = event.identifier.as_str();
        if status_at_least(&event.status_code, pair.upper)
            && !state.seen.contains(identifier)
            && !candidates.contains(&identifier)
        {
            candidates.push(identifier);
        }
    }

    for identifier in candidates {
        let query = EventQuery::half_open(identifier, day_start_ms, now_ms);
        match store.search_events(index_pattern, &query).await {
            Ok(history) => {
                if let Some(minutes) = crossing_duration_minutes(&history, pair) {
                    if minutes != 0.0 {
                        state.count += 1;
                        state.total_minutes += minutes;
                    }
                }
            }
            Err(error) => {
                tracing::warn!(identifier, lower = pair.lower, upper = pair.upper, error = %error, "duration query failed");
            }
        }
        state.seen.insert(identifier.to_string());
    }
}
