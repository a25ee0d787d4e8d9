//! Hour-aligned bucket grid.
//!
//! Every hour is cut into `quarters = ceil(hour / span)` buckets. When the
//! span does not divide the hour, the last bucket of each hour is short and
//! the next bucket starts on the following hour boundary.

pub const MINUTE_MS: i64 = 60_000;
pub const HOUR_MS: i64 = 3_600_000;

/// Start of the hour holding `timestamp_ms`, saturating at `i64::MIN`.
pub fn floor_hour(timestamp_ms: i64) -> i64 {
    timestamp_ms.saturating_sub(timestamp_ms.rem_euclid(HOUR_MS))
}

pub fn ceil_hour(timestamp_ms: i64) -> i64 {
    let floor = floor_hour(timestamp_ms);
    if floor == timestamp_ms {
        floor
    } else {
        floor.saturating_add(HOUR_MS)
    }
}

/// Position of a bucket: the hour it belongs to and its slot in that hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BucketCoord {
    pub hour_start_ms: i64,
    pub quarter: i64,
}

impl BucketCoord {
    pub fn hour_aligned(timestamp_ms: i64) -> Self {
        Self {
            hour_start_ms: floor_hour(timestamp_ms),
            quarter: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketGrid {
    span_minutes: i64,
    span_ms: i64,
    quarters: i64,
}

impl BucketGrid {
    /// Returns `None` unless `span_minutes` is at least one.
    pub fn from_span_minutes(span_minutes: i64) -> Option<Self> {
        if span_minutes < 1 {
            return None;
        }
        let span_ms = span_minutes.checked_mul(MINUTE_MS)?;
        let quarters = (HOUR_MS - 1) / span_ms + 1;
        Some(Self {
            span_minutes,
            span_ms,
            quarters,
        })
    }

    pub fn span_minutes(&self) -> i64 {
        self.span_minutes
    }

    pub fn span_ms(&self) -> i64 {
        self.span_ms
    }

    /// Buckets per hour.
    pub fn quarters(&self) -> i64 {
        self.quarters
    }

    pub fn coord_of(&self, timestamp_ms: i64) -> BucketCoord {
        let hour_start_ms = floor_hour(timestamp_ms);
        BucketCoord {
            hour_start_ms,
            quarter: (timestamp_ms - hour_start_ms) / self.span_ms,
        }
    }

    pub fn next(&self, coord: BucketCoord) -> BucketCoord {
        if coord.quarter + 1 < self.quarters {
            BucketCoord {
                quarter: coord.quarter + 1,
                ..coord
            }
        } else {
            BucketCoord {
                hour_start_ms: coord.hour_start_ms.saturating_add(HOUR_MS),
                quarter: 0,
            }
        }
    }

    /// Number of `next` steps from `from` to `to`; negative when `to` is
    /// earlier.
    pub fn steps_between(&self, from: BucketCoord, to: BucketCoord) -> i64 {
        let hours = to.hour_start_ms.saturating_sub(from.hour_start_ms) / HOUR_MS;
        self.quarters
            .saturating_mul(hours)
            .saturating_add(to.quarter - from.quarter)
    }

    pub fn bucket_start_ms(&self, coord: BucketCoord) -> i64 {
        coord
            .hour_start_ms
            .saturating_add(coord.quarter.saturating_mul(self.span_ms))
    }

    pub fn is_bucket_start(&self, timestamp_ms: i64) -> bool {
        self.bucket_start_ms(self.coord_of(timestamp_ms)) == timestamp_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(span_minutes: i64) -> BucketGrid {
        BucketGrid::from_span_minutes(span_minutes).expect("valid span")
    }

    #[test]
    fn unit_quarters_round_up_for_non_dividing_spans() {
        assert_eq!(grid(10).quarters(), 6);
        assert_eq!(grid(25).quarters(), 3);
        assert_eq!(grid(7).quarters(), 9);
        assert_eq!(grid(90).quarters(), 1);
        assert!(BucketGrid::from_span_minutes(0).is_none());
        assert!(BucketGrid::from_span_minutes(-5).is_none());
    }

    #[test]
    fn unit_next_rolls_to_following_hour_after_last_quarter() {
        let grid = grid(25);
        let start = BucketCoord::hour_aligned(0);
        let second = grid.next(start);
        let third = grid.next(second);
        let rolled = grid.next(third);
        assert_eq!(third.quarter, 2);
        assert_eq!(grid.bucket_start_ms(third), 50 * MINUTE_MS);
        assert_eq!(
            rolled,
            BucketCoord {
                hour_start_ms: HOUR_MS,
                quarter: 0
            }
        );
    }

    #[test]
    fn unit_coord_of_keeps_short_trailing_bucket_inside_hour() {
        let grid = grid(25);
        let coord = grid.coord_of(HOUR_MS - 1);
        assert_eq!(coord.hour_start_ms, 0);
        assert_eq!(coord.quarter, 2);
    }

    #[test]
    fn unit_steps_between_counts_next_calls() {
        let grid = grid(25);
        let from = grid.coord_of(10 * MINUTE_MS);
        let to = grid.coord_of(2 * HOUR_MS + 30 * MINUTE_MS);
        let mut cursor = from;
        let mut steps = 0;
        while cursor != to {
            cursor = grid.next(cursor);
            steps += 1;
        }
        assert_eq!(grid.steps_between(from, to), steps);
        assert_eq!(grid.steps_between(to, from), -steps);
    }

    #[test]
    fn regression_negative_timestamps_floor_toward_past_hour() {
        assert_eq!(floor_hour(-1), -HOUR_MS);
        assert_eq!(ceil_hour(-1), 0);
        assert_eq!(ceil_hour(HOUR_MS), HOUR_MS);
        assert_eq!(grid(10).coord_of(-1).quarter, 5);
    }

    #[test]
    fn regression_extreme_timestamps_saturate_instead_of_overflowing() {
        let grid = grid(10);
        let low = grid.coord_of(i64::MIN);
        assert_eq!(low.hour_start_ms, i64::MIN);
        assert_eq!(low.quarter, 0);
        let high = grid.coord_of(i64::MAX);
        assert!(high.quarter < grid.quarters());
        assert_eq!(grid.bucket_start_ms(grid.next(high)), i64::MAX);
        assert!(grid.steps_between(low, high) > 0);
        assert!(grid.steps_between(high, low) < 0);
    }

    #[test]
    fn unit_is_bucket_start_detects_boundaries() {
        let grid = grid(10);
        assert!(grid.is_bucket_start(20 * MINUTE_MS));
        assert!(!grid.is_bucket_start(20 * MINUTE_MS + 1));
    }
}
