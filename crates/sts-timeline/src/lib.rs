//! Dense timeline reconstruction over an hour-aligned bucket grid.
//!
//! Sparse status events are placed into fixed-width buckets; every bucket in
//! the requested window appears exactly once, in order, either carrying the
//! last event that landed in it or as an `NA` filler.

mod bucket;
mod calendar;
mod engine;
pub mod grid;

pub use bucket::{CalendarSlot, TimelineBucket};
pub use calendar::timeline_calendar;
pub use engine::{build_timeline, latest_buckets, QueryMode, TimelineEngine};
pub use grid::{BucketCoord, BucketGrid};

/// Upper bound on buckets produced by one call.
pub const MAX_TIMELINE_BUCKETS: usize = 100_000;
