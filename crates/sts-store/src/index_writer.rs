use std::sync::Arc;

use chrono::{Days, NaiveDate};
use sts_core::compact_day;
use sts_types::StatusEvent;
use tokio::sync::Mutex;

use crate::{EventStore, StoreResult};

pub const INDEX_PREFIX: &str = "sts_index_";
/// Pattern matching every daily status index.
pub const INDEX_PATTERN: &str = "sts_index_*";
pub const DEFAULT_BULK_BATCH_SIZE: usize = 10;
pub const DEFAULT_RETENTION_DAYS: u32 = 3;

pub fn index_name_for_day(day: NaiveDate) -> String {
    format!("{INDEX_PREFIX}{}", compact_day(day))
}

/// Summary of one persisted cycle.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WriteReport {
    pub index: String,
    pub batches: usize,
    pub written: usize,
    /// One message per batch that was not fully persisted.
    pub failed_batches: Vec<String>,
}

impl WriteReport {
    pub fn is_complete(&self) -> bool {
        self.failed_batches.is_empty()
    }
}

/// Bulk-persists cycle events into one index per calendar day.
///
/// The day's index is created lazily on the first write of that day. Batches
/// are independent: a failed batch is recorded and the remaining batches are
/// still written, so a cycle may be partially persisted.
pub struct IndexWriter {
    store: Arc<dyn EventStore>,
    retention_days: u32,
    batch_size: usize,
    current_index: Mutex<Option<String>>,
}

impl IndexWriter {
    pub fn new(store: Arc<dyn EventStore>, retention_days: u32) -> Self {
        Self {
            store,
            retention_days,
            batch_size: DEFAULT_BULK_BATCH_SIZE,
            current_index: Mutex::new(None),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn retention_days(&self) -> u32 {
        self.retention_days
    }

    /// Deletes the indices of the `retention_days` days before `today`.
    /// Returns the names that existed and were removed.
    pub async fn prune_expired(&self, today: NaiveDate) -> StoreResult<Vec<String>> {
        let mut deleted = Vec::new();
        for days_back in 1..=u64::from(self.retention_days) {
            let Some(day) = today.checked_sub_days(Days::new(days_back)) else {
                break;
            };
            let name = index_name_for_day(day);
            if !self.store.index_exists(&name).await? {
                continue;
            }
            self.store.delete_index(&name).await?;
            tracing::info!(index = %name, deleted = true, "pruned expired index");
            deleted.push(name);
        }
        Ok(deleted)
    }

    /// Returns the index for `day`, creating it when the day changed since the
    /// last call and the index does not exist yet.
    pub async fn ensure_index_for(&self, day: NaiveDate) -> StoreResult<String> {
        let name = index_name_for_day(day);
        let mut current = self.current_index.lock().await;
        if current.as_deref() == Some(name.as_str()) {
            return Ok(name);
        }
        if !self.store.index_exists(&name).await? {
            self.store.create_index(&name).await?;
            tracing::info!(index = %name, "created daily index");
        }
        *current = Some(name.clone());
        Ok(name)
    }

    /// Writes one cycle's events in fixed-size batches.
    ///
    /// Fatal store errors abort the cycle with `Err`; any other batch failure
    /// is recorded in the report and writing continues.
    pub async fn write_cycle(
        &self,
        day: NaiveDate,
        events: &[StatusEvent],
    ) -> StoreResult<WriteReport> {
        let index = self.ensure_index_for(day).await?;
        let mut report = WriteReport {
            index: index.clone(),
            ..WriteReport::default()
        };
        for (batch_number, batch) in events.chunks(self.batch_size).enumerate() {
            report.batches += 1;
            match self.store.bulk_create(&index, batch).await {
                Ok(bulk) if bulk.failed_items == 0 => {
                    report.written += bulk.items;
                    tracing::debug!(index = %index, batch = batch_number, items = bulk.items, "bulk batch written");
                }
                Ok(bulk) => {
                    report.written += bulk.items - bulk.failed_items;
                    let message = format!(
                        "batch {batch_number}: {} of {} items failed",
                        bulk.failed_items, bulk.items
                    );
                    tracing::warn!(index = %index, batch = batch_number, failed = bulk.failed_items, "bulk batch partially failed");
                    report.failed_batches.push(message);
                }
                Err(error) if error.is_fatal() => return Err(error),
                Err(error) => {
                    tracing::warn!(index = %index, batch = batch_number, error = %error, "bulk batch failed");
                    report.failed_batches.push(format!("batch {batch_number}: {error}"));
                }
            }
        }
        Ok(report)
    }
}
