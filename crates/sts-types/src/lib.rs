//! Shared data types for the shipment-status pipeline.
//!
//! Status codes are two-character strings and every threshold comparison on
//! them is lexicographic, never numeric.

use serde::{Deserialize, Serialize};

/// Cross-reference status recorded when no cross-reference answer exists yet.
pub const CROSS_REFERENCE_UNCHECKED: &str = "-1";
/// Cross-reference status meaning the identifier was checked without a match.
pub const CROSS_REFERENCE_NO_MATCH: &str = "0";
/// Status code carried by timeline buckets that hold no event.
pub const NO_DATA_STATUS: &str = "NA";
/// Branch sequence that is folded into the bare identifier.
pub const ROOT_BRANCH_SEQ: &str = "0";

/// Builds the externally visible identifier: branch `"0"` stays bare, any
/// other branch is appended with a `-` separator.
pub fn compose_identifier(awb_no: &str, branch_seq: &str) -> String {
    if branch_seq == ROOT_BRANCH_SEQ {
        awb_no.to_string()
    } else {
        format!("{awb_no}-{branch_seq}")
    }
}

/// Lexicographic `code >= bound`.
pub fn status_at_least(code: &str, bound: &str) -> bool {
    code >= bound
}

/// One collapsed row from the status export.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FeedRecord {
    pub awb_no: String,
    pub branch_seq: String,
    pub section_code: String,
    pub company_code: String,
    pub company_name: String,
    pub status_code: String,
    pub user_id: String,
    pub user_name: String,
}

impl FeedRecord {
    /// Deduplication key: identifier and branch joined with `-`.
    pub fn composite_key(&self) -> String {
        format!("{}-{}", self.awb_no, self.branch_seq)
    }

    pub fn display_identifier(&self) -> String {
        compose_identifier(&self.awb_no, &self.branch_seq)
    }
}

/// Immutable status snapshot persisted once per ingestion cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct StatusEvent {
    #[serde(rename = "awb_no")]
    pub identifier: String,
    #[serde(default)]
    pub branch_seq: String,
    #[serde(rename = "update_time")]
    pub timestamp_ms: i64,
    #[serde(rename = "sts_code", default)]
    pub status_code: String,
    #[serde(default)]
    pub section_code: String,
    #[serde(default)]
    pub company_code: String,
    #[serde(default)]
    pub company_name: String,
    #[serde(rename = "last_updated_user", default)]
    pub user_name: String,
    #[serde(rename = "last_updated_user_id", default)]
    pub user_id: String,
    #[serde(default)]
    pub is_stocked: bool,
    #[serde(rename = "igs_status", default)]
    pub cross_ref_status: String,
}

impl StatusEvent {
    /// Merges a collapsed feed row with its cross-reference status at the
    /// cycle's shared ingestion timestamp. An absent or empty cross-reference
    /// entry becomes [`CROSS_REFERENCE_UNCHECKED`].
    pub fn from_feed_record(
        record: FeedRecord,
        ingested_at_ms: i64,
        cross_ref_status: Option<&str>,
    ) -> Self {
        let cross_ref_status = match cross_ref_status {
            Some(value) if !value.is_empty() => value.to_string(),
            _ => CROSS_REFERENCE_UNCHECKED.to_string(),
        };
        Self {
            identifier: record.display_identifier(),
            branch_seq: record.branch_seq,
            timestamp_ms: ingested_at_ms,
            status_code: record.status_code,
            section_code: record.section_code,
            company_code: record.company_code,
            company_name: record.company_name,
            user_name: record.user_name,
            user_id: record.user_id,
            is_stocked: false,
            cross_ref_status,
        }
    }
}

/// Latest known status per identifier; identical in shape to the event that
/// established it.
pub type LatestStatus = StatusEvent;

/// Which ingestion feed produced an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedKind {
    StatusFeed,
    CrossReference,
}

impl FeedKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StatusFeed => "status_feed",
            Self::CrossReference => "cross_reference",
        }
    }
}

/// Accumulated threshold durations for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct MetricsSnapshot {
    #[serde(rename = "sakucnt")]
    pub primary_count: i64,
    #[serde(rename = "sakuttl")]
    pub primary_total_minutes: f64,
    #[serde(rename = "shincnt")]
    pub secondary_count: i64,
    #[serde(rename = "shinttl")]
    pub secondary_total_minutes: f64,
}

/// Derived liveness verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Liveness {
    Fine,
    Dead,
}

/// Feed update timestamps plus the verdict computed for one request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    #[serde(rename = "laststsupdated")]
    pub last_status_feed_ms: f64,
    #[serde(rename = "lastigsupdated")]
    pub last_cross_reference_ms: f64,
    pub status: Liveness,
}
