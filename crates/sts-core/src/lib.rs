//! Low-level helpers shared by the shipment-status crates.
//!
//! Wall-clock conversions used for ingestion timestamps, index rotation and
//! same-day queries, plus the atomic file write used for worklist output.

pub mod atomic_io;
pub mod time_utils;

pub use atomic_io::write_text_atomic;
pub use time_utils::{
    compact_day, current_unix_timestamp_ms, datetime_from_unix_ms, is_representable_unix_ms,
    utc_day_start_ms, DAY_MS,
};

#[cfg(test)]
mod tests {
    use std::fs::read_to_string;

    use chrono::NaiveDate;

    use super::*;

    #[test]
    fn unit_utc_day_start_floors_to_midnight() {
        let noon = 1_700_000_000_000_i64;
        let start = utc_day_start_ms(noon);
        assert_eq!(start % DAY_MS, 0);
        assert!(start <= noon);
        assert!(noon - start < DAY_MS);
        assert_eq!(utc_day_start_ms(start), start);
    }

    #[test]
    fn unit_utc_day_start_handles_pre_epoch_values() {
        assert_eq!(utc_day_start_ms(-1), -DAY_MS);
    }

    #[test]
    fn regression_out_of_range_millis_are_not_representable() {
        assert!(is_representable_unix_ms(0));
        assert!(is_representable_unix_ms(-1_700_000_000_000));
        assert!(!is_representable_unix_ms(i64::MIN));
        assert!(!is_representable_unix_ms(9_000_000_000_000_000_000));
        assert!(utc_day_start_ms(i64::MIN) <= 0);
    }

    #[test]
    fn unit_compact_day_renders_zero_padded_date() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 7).expect("date");
        assert_eq!(compact_day(date), "20240307");
    }

    #[test]
    fn unit_datetime_from_unix_ms_round_trips_millis() {
        let value = datetime_from_unix_ms(3_600_000);
        assert_eq!(value.timestamp_millis(), 3_600_000);
    }

    #[test]
    fn functional_write_text_atomic_replaces_existing_content() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let path = tempdir.path().join("nested/worklist.txt");
        write_text_atomic(&path, "first").expect("first write");
        write_text_atomic(&path, "second").expect("second write");
        assert_eq!(read_to_string(&path).expect("read"), "second");
        let leftovers = std::fs::read_dir(path.parent().expect("parent"))
            .expect("read dir")
            .count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn regression_write_text_atomic_rejects_directory_targets() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let error = write_text_atomic(tempdir.path(), "x").expect_err("directory target");
        assert!(error.to_string().contains("is a directory"));
    }
}
