//! Status export parsing.
//!
//! The export is a Shift-JIS encoded CSV with a header row and fixed column
//! positions. It is not deduplicated: the same identifier/branch pair appears
//! on consecutive rows and only the last of each run is meaningful.

use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord};
use encoding_rs::SHIFT_JIS;
use sts_types::{FeedRecord, StatusEvent};

use crate::cross_reference::CrossReferenceStore;
use crate::{FeedError, FeedResult};

/// End-of-file marker some exporters leave as a final line.
pub const EOF_SENTINEL: &str = "\u{1a}";
/// Minimum columns a data row must carry.
pub const FEED_COLUMN_COUNT: usize = 13;

const COLUMN_SECTION_CODE: usize = 1;
const COLUMN_AWB_NO: usize = 2;
const COLUMN_BRANCH_SEQ: usize = 3;
const COLUMN_COMPANY_CODE: usize = 5;
const COLUMN_COMPANY_NAME: usize = 6;
const COLUMN_STATUS_CODE: usize = 7;
const COLUMN_USER_ID: usize = 11;
const COLUMN_USER_NAME: usize = 12;

/// Events of one status cycle, all stamped with the same ingestion time.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FeedCycle {
    pub ingested_at_ms: i64,
    pub events: Vec<StatusEvent>,
}

#[derive(Debug, Clone)]
pub struct FeedParser {
    path: PathBuf,
}

impl FeedParser {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads, decodes and collapses the export at the configured path.
    pub fn read_records(&self) -> FeedResult<Vec<FeedRecord>> {
        let bytes = std::fs::read(&self.path).map_err(|source| FeedError::Io {
            path: self.path.clone(),
            source,
        })?;
        parse_feed(&decode_shift_jis(&bytes))
    }

    /// Parses the export and merges every record with its cross-reference
    /// status at one shared timestamp.
    pub fn read_cycle(
        &self,
        cross_reference: &CrossReferenceStore,
        ingested_at_ms: i64,
    ) -> FeedResult<FeedCycle> {
        let records = self.read_records()?;
        Ok(FeedCycle {
            ingested_at_ms,
            events: enrich_records(records, cross_reference, ingested_at_ms),
        })
    }
}

pub fn decode_shift_jis(bytes: &[u8]) -> String {
    let (text, _, had_errors) = SHIFT_JIS.decode(bytes);
    if had_errors {
        tracing::warn!("status export contained bytes outside Shift-JIS; replaced");
    }
    text.into_owned()
}

/// Parses decoded export text, skipping the header row, and collapses
/// consecutive rows with the same composite key into the last one.
pub fn parse_feed(text: &str) -> FeedResult<Vec<FeedRecord>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());
    let mut rows = Vec::new();
    for row in reader.records() {
        let row = row?;
        if row.get(0).map(str::trim) == Some(EOF_SENTINEL) {
            continue;
        }
        match record_from_row(&row) {
            Ok(record) => rows.push(record),
            Err(error) => tracing::warn!(error = %error, "skipping malformed status row"),
        }
    }
    Ok(collapse_consecutive(rows))
}

fn record_from_row(row: &StringRecord) -> FeedResult<FeedRecord> {
    if row.len() < FEED_COLUMN_COUNT {
        return Err(FeedError::MissingColumn {
            line: row.position().map(|position| position.line()).unwrap_or(0),
            columns: row.len(),
        });
    }
    let column = |index: usize| row.get(index).unwrap_or_default().trim().to_string();
    Ok(FeedRecord {
        awb_no: column(COLUMN_AWB_NO),
        branch_seq: column(COLUMN_BRANCH_SEQ),
        section_code: column(COLUMN_SECTION_CODE),
        company_code: column(COLUMN_COMPANY_CODE),
        company_name: column(COLUMN_COMPANY_NAME),
        status_code: column(COLUMN_STATUS_CODE),
        user_id: column(COLUMN_USER_ID),
        user_name: column(COLUMN_USER_NAME),
    })
}

/// Keeps the last record of every run of equal composite keys.
pub fn collapse_consecutive(records: impl IntoIterator<Item = FeedRecord>) -> Vec<FeedRecord> {
    let mut collapsed = Vec::new();
    let mut previous: Option<FeedRecord> = None;
    for record in records {
        if let Some(prior) = previous.take() {
            if prior.composite_key() != record.composite_key() {
                collapsed.push(prior);
            }
        }
        previous = Some(record);
    }
    collapsed.extend(previous);
    collapsed
}

/// Cross-reference lookups use the bare identifier, without branch suffix.
pub fn enrich_records(
    records: Vec<FeedRecord>,
    cross_reference: &CrossReferenceStore,
    ingested_at_ms: i64,
) -> Vec<StatusEvent> {
    records
        .into_iter()
        .map(|record| {
            let status = cross_reference.get(&record.awb_no);
            StatusEvent::from_feed_record(record, ingested_at_ms, status)
        })
        .collect()
}
