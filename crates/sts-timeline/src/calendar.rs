use sts_core::datetime_from_unix_ms;

use crate::bucket::CalendarSlot;
use crate::grid::{ceil_hour, BucketCoord, BucketGrid};
use crate::MAX_TIMELINE_BUCKETS;

/// Bucket boundaries covering `[from_ms, to_ms]`.
///
/// By default the window widens to whole hours. With `latest` it starts at
/// the bucket containing `from_ms` and ends with the bucket containing
/// `to_ms`, or just before it when `to_ms` sits exactly on a boundary.
pub fn timeline_calendar(
    from_ms: i64,
    to_ms: i64,
    grid: &BucketGrid,
    latest: bool,
) -> Vec<CalendarSlot> {
    let (start, end) = if latest {
        let end = grid.coord_of(to_ms);
        let end = if grid.is_bucket_start(to_ms) {
            end
        } else {
            grid.next(end)
        };
        (grid.coord_of(from_ms), end)
    } else {
        (
            BucketCoord::hour_aligned(from_ms),
            BucketCoord::hour_aligned(ceil_hour(to_ms)),
        )
    };

    let steps = grid.steps_between(start, end).clamp(0, MAX_TIMELINE_BUCKETS as i64);
    let mut slots = Vec::with_capacity(steps as usize);
    let mut cursor = start;
    for index in 0..steps as usize {
        slots.push(CalendarSlot {
            time: datetime_from_unix_ms(grid.bucket_start_ms(cursor)),
            index,
        });
        cursor = grid.next(cursor);
    }
    slots
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{HOUR_MS, MINUTE_MS};

    fn grid(span_minutes: i64) -> BucketGrid {
        BucketGrid::from_span_minutes(span_minutes).expect("valid span")
    }

    #[test]
    fn functional_default_calendar_covers_whole_hour() {
        let slots = timeline_calendar(0, HOUR_MS, &grid(10), false);
        assert_eq!(slots.len(), 6);
        assert_eq!(slots[0].time.timestamp_millis(), 0);
        assert_eq!(slots[5].time.timestamp_millis(), 50 * MINUTE_MS);
        assert!(slots.iter().enumerate().all(|(i, slot)| slot.index == i));
    }

    #[test]
    fn functional_default_calendar_widens_to_hour_boundaries() {
        let slots = timeline_calendar(15 * MINUTE_MS, HOUR_MS + MINUTE_MS, &grid(10), false);
        assert_eq!(slots.len(), 12);
    }

    #[test]
    fn functional_latest_calendar_anchors_to_span() {
        let slots = timeline_calendar(15 * MINUTE_MS, 42 * MINUTE_MS, &grid(10), true);
        let starts: Vec<i64> = slots
            .iter()
            .map(|slot| slot.time.timestamp_millis() / MINUTE_MS)
            .collect();
        assert_eq!(starts, vec![10, 20, 30, 40]);

        let aligned = timeline_calendar(10 * MINUTE_MS, 40 * MINUTE_MS, &grid(10), true);
        assert_eq!(aligned.len(), 3);
    }

    #[test]
    fn regression_non_dividing_span_restarts_each_hour() {
        let slots = timeline_calendar(0, 2 * HOUR_MS, &grid(25), false);
        let starts: Vec<i64> = slots
            .iter()
            .map(|slot| slot.time.timestamp_millis() / MINUTE_MS)
            .collect();
        assert_eq!(starts, vec![0, 25, 50, 60, 85, 110]);
    }

    #[test]
    fn regression_inverted_window_is_empty() {
        assert!(timeline_calendar(HOUR_MS * 3, 0, &grid(10), false).is_empty());
    }

    #[test]
    fn regression_extreme_window_is_capped_without_overflow() {
        let grid = grid(10);
        let wide = timeline_calendar(-9_000_000_000_000_000_000, 9_000_000_000_000_000_000, &grid, false);
        assert_eq!(wide.len(), MAX_TIMELINE_BUCKETS);
        let latest = timeline_calendar(i64::MIN, i64::MAX, &grid, true);
        assert_eq!(latest.len(), MAX_TIMELINE_BUCKETS);
    }
}
