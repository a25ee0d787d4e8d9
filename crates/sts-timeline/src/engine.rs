use std::sync::Arc;

use sts_store::{EventQuery, EventStore, StoreResult, INDEX_PATTERN};
use sts_types::StatusEvent;

use crate::bucket::TimelineBucket;
use crate::grid::{ceil_hour, BucketCoord, BucketGrid};
use crate::MAX_TIMELINE_BUCKETS;

/// How the requested window is aligned to the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryMode {
    /// Whole hours around the window.
    #[default]
    Default,
    /// Starts at the bucket holding `from`, ends with the bucket holding `to`.
    Latest,
    /// Starts at the hour holding `from`, ends with the bucket holding `to`.
    Update,
}

impl QueryMode {
    pub fn start(self, grid: &BucketGrid, from_ms: i64) -> BucketCoord {
        match self {
            Self::Latest => grid.coord_of(from_ms),
            Self::Default | Self::Update => BucketCoord::hour_aligned(from_ms),
        }
    }

    /// First coordinate past the window.
    ///
    /// Events are loaded over the closed range `[from, to]`, so an event
    /// stamped exactly at `to` needs the bucket starting there. In Latest and
    /// Update modes this axis therefore always keeps the bucket holding `to`.
    /// The event-free axis from `timeline_calendar` rounds `to` up to a span
    /// boundary instead, and is one bucket shorter when `to` sits exactly on
    /// one.
    pub fn end(self, grid: &BucketGrid, to_ms: i64) -> BucketCoord {
        match self {
            Self::Default => BucketCoord::hour_aligned(ceil_hour(to_ms)),
            Self::Latest | Self::Update => grid.next(grid.coord_of(to_ms)),
        }
    }
}

struct TimelineBuilder<'a> {
    identifier: &'a str,
    grid: &'a BucketGrid,
    buckets: Vec<TimelineBucket>,
    truncated: bool,
}

impl<'a> TimelineBuilder<'a> {
    fn new(identifier: &'a str, grid: &'a BucketGrid) -> Self {
        Self {
            identifier,
            grid,
            buckets: Vec::new(),
            truncated: false,
        }
    }

    fn has_room(&mut self) -> bool {
        if self.buckets.len() < MAX_TIMELINE_BUCKETS {
            return true;
        }
        self.truncated = true;
        false
    }

    fn push_event(&mut self, event: &StatusEvent, coord: BucketCoord) {
        if self.has_room() {
            let index = self.buckets.len();
            self.buckets.push(TimelineBucket::from_event(
                self.identifier,
                event,
                index,
                coord,
                self.grid,
            ));
        }
    }

    /// Emits `count` fillers stepping from `from` and returns the coordinate
    /// after the last one.
    fn fill(&mut self, from: BucketCoord, count: i64) -> BucketCoord {
        let mut cursor = from;
        for _ in 0..count.max(0) {
            if !self.has_room() {
                break;
            }
            let index = self.buckets.len();
            self.buckets
                .push(TimelineBucket::filler(self.identifier, index, cursor, self.grid));
            cursor = self.grid.next(cursor);
        }
        cursor
    }

    fn finish(self) -> Vec<TimelineBucket> {
        if self.truncated {
            tracing::warn!(
                identifier = self.identifier,
                limit = MAX_TIMELINE_BUCKETS,
                "timeline truncated"
            );
        }
        self.buckets
    }
}

/// Turns ascending events into a dense, gap-free bucket sequence.
///
/// The last event of a bucket is carried forward and closed out in the slot
/// just before the next event's bucket, after the fillers covering the gap.
/// The final event keeps its own bucket and fillers run from there to the
/// end of the window. Returns `None` when there are no events at all.
pub fn build_timeline(
    identifier: &str,
    events: &[StatusEvent],
    from_ms: i64,
    to_ms: i64,
    grid: &BucketGrid,
    mode: QueryMode,
) -> Option<Vec<TimelineBucket>> {
    let (first, rest) = events.split_first()?;
    let mut builder = TimelineBuilder::new(identifier, grid);

    let mut previous = first;
    let mut previous_coord = grid.coord_of(first.timestamp_ms);
    let start = mode.start(grid, from_ms);
    builder.fill(start, grid.steps_between(start, previous_coord));

    for event in rest {
        let coord = grid.coord_of(event.timestamp_ms);
        if coord != previous_coord {
            let gap = grid.steps_between(previous_coord, coord).saturating_sub(1);
            let closing = builder.fill(previous_coord, gap);
            builder.push_event(previous, closing);
            previous_coord = coord;
        }
        previous = event;
    }
    builder.push_event(previous, previous_coord);
    let trailing = grid.next(previous_coord);
    builder.fill(trailing, grid.steps_between(trailing, mode.end(grid, to_ms)));

    Some(builder.finish())
}

/// One bucket per identifier at the position of its latest event.
pub fn latest_buckets(events: &[StatusEvent], grid: &BucketGrid) -> Vec<TimelineBucket> {
    events
        .iter()
        .enumerate()
        .map(|(index, event)| {
            TimelineBucket::from_event(
                &event.identifier,
                event,
                index,
                grid.coord_of(event.timestamp_ms),
                grid,
            )
        })
        .collect()
}

/// Store-backed timeline queries.
#[derive(Clone)]
pub struct TimelineEngine {
    store: Arc<dyn EventStore>,
    index_pattern: String,
}

impl TimelineEngine {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self {
            store,
            index_pattern: INDEX_PATTERN.to_string(),
        }
    }

    /// Dense timeline for `identifier` over `[from_ms, to_ms]`, or `None`
    /// when the identifier has no events in the window.
    pub async fn reconstruct(
        &self,
        identifier: &str,
        from_ms: i64,
        to_ms: i64,
        grid: &BucketGrid,
        mode: QueryMode,
    ) -> StoreResult<Option<Vec<TimelineBucket>>> {
        let query = EventQuery::inclusive(identifier, from_ms, to_ms);
        let events = self.store.search_events(&self.index_pattern, &query).await?;
        tracing::debug!(identifier, events = events.len(), "timeline events loaded");
        Ok(build_timeline(identifier, &events, from_ms, to_ms, grid, mode))
    }

    /// Latest event per identifier within `[from_ms, to_ms)`.
    pub async fn latest_per_identifier(
        &self,
        from_ms: i64,
        to_ms: i64,
        grid: &BucketGrid,
    ) -> StoreResult<Vec<TimelineBucket>> {
        let events = self
            .store
            .latest_per_identifier(&self.index_pattern, from_ms, to_ms)
            .await?;
        Ok(latest_buckets(&events, grid))
    }
}
