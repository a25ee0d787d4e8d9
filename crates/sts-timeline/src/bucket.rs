use chrono::{DateTime, Utc};
use serde::Serialize;
use sts_core::datetime_from_unix_ms;
use sts_types::{StatusEvent, NO_DATA_STATUS};

use crate::grid::{BucketCoord, BucketGrid};

/// One slot of a dense timeline. Filler slots carry [`NO_DATA_STATUS`] and
/// empty metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimelineBucket {
    pub index: usize,
    #[serde(rename = "awbno")]
    pub identifier: String,
    /// Start of the hour the bucket belongs to.
    pub base_time: DateTime<Utc>,
    #[serde(rename = "time_span")]
    pub span_minutes: i64,
    #[serde(rename = "q")]
    pub quarter: i64,
    #[serde(rename = "bucket_start")]
    pub bucket_start_ms: i64,
    pub status_code: String,
    pub section_code: String,
    pub company_code: String,
    pub company_name: String,
    #[serde(rename = "last_updated_user")]
    pub user_name: String,
    #[serde(rename = "last_updated_id")]
    pub user_id: String,
    pub is_stocked: bool,
    #[serde(rename = "igs_status")]
    pub cross_ref_status: String,
}

impl TimelineBucket {
    pub fn filler(identifier: &str, index: usize, coord: BucketCoord, grid: &BucketGrid) -> Self {
        Self {
            index,
            identifier: identifier.to_string(),
            base_time: datetime_from_unix_ms(coord.hour_start_ms),
            span_minutes: grid.span_minutes(),
            quarter: coord.quarter,
            bucket_start_ms: grid.bucket_start_ms(coord),
            status_code: NO_DATA_STATUS.to_string(),
            section_code: String::new(),
            company_code: String::new(),
            company_name: String::new(),
            user_name: String::new(),
            user_id: String::new(),
            is_stocked: false,
            cross_ref_status: String::new(),
        }
    }

    pub fn from_event(
        identifier: &str,
        event: &StatusEvent,
        index: usize,
        coord: BucketCoord,
        grid: &BucketGrid,
    ) -> Self {
        Self {
            status_code: event.status_code.clone(),
            section_code: event.section_code.clone(),
            company_code: event.company_code.clone(),
            company_name: event.company_name.clone(),
            user_name: event.user_name.clone(),
            user_id: event.user_id.clone(),
            is_stocked: event.is_stocked,
            cross_ref_status: event.cross_ref_status.clone(),
            ..Self::filler(identifier, index, coord, grid)
        }
    }

    pub fn is_filler(&self) -> bool {
        self.status_code == NO_DATA_STATUS
    }
}

/// Calendar entry: bucket start and position, no status payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CalendarSlot {
    pub time: DateTime<Utc>,
    pub index: usize,
}
