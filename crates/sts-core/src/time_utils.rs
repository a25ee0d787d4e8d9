use chrono::{DateTime, NaiveDate, Utc};

/// Milliseconds in one UTC calendar day.
pub const DAY_MS: i64 = 24 * 60 * 60 * 1_000;

/// Returns the current Unix timestamp in milliseconds.
pub fn current_unix_timestamp_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Returns the start of the UTC calendar day that contains `timestamp_ms`.
pub fn utc_day_start_ms(timestamp_ms: i64) -> i64 {
    timestamp_ms.div_euclid(DAY_MS).saturating_mul(DAY_MS)
}

/// True when chrono can represent `timestamp_ms` as a UTC datetime.
pub fn is_representable_unix_ms(timestamp_ms: i64) -> bool {
    DateTime::<Utc>::from_timestamp_millis(timestamp_ms).is_some()
}

/// Converts a Unix millisecond timestamp to a UTC datetime, clamping values
/// chrono cannot represent to the epoch.
pub fn datetime_from_unix_ms(timestamp_ms: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(timestamp_ms).unwrap_or_default()
}

/// Formats a calendar day as the compact `YYYYMMDD` form used in index names.
pub fn compact_day(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}
