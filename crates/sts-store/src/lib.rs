//! Document-store abstractions for status events.
//!
//! [`EventStore`] is the seam between the pipeline and the external
//! time-series store. [`ElasticsearchStore`] talks to the real cluster,
//! [`InMemoryEventStore`] backs tests and local runs.

use async_trait::async_trait;
use std::collections::BTreeMap;
use sts_types::StatusEvent;
use thiserror::Error;
use tokio::sync::RwLock;

mod elasticsearch;
mod index_writer;

pub use elasticsearch::ElasticsearchStore;
pub use index_writer::{
    index_name_for_day, IndexWriter, WriteReport, DEFAULT_BULK_BATCH_SIZE,
    DEFAULT_RETENTION_DAYS, INDEX_PATTERN, INDEX_PREFIX,
};

/// Maximum hits returned by a per-identifier event search.
pub const EVENT_SEARCH_LIMIT: usize = 1_000;
/// Maximum identifiers returned by the latest-per-identifier aggregation.
pub const LATEST_AGGREGATION_LIMIT: usize = 10_000;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors returned by store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store rejected {endpoint} as malformed: {body}")]
    Rejected { endpoint: String, body: String },
    #[error("store returned status {status} for {endpoint}: {body}")]
    UnexpectedStatus {
        endpoint: String,
        status: u16,
        body: String,
    },
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    /// True when the store refused a request as malformed, which means the
    /// schema no longer matches and the process cannot continue.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }
}

/// Per-identifier event search over a time window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventQuery {
    pub identifier: String,
    pub from_ms: i64,
    pub to_ms: i64,
    /// `true` for `[from, to]`, `false` for `[from, to)`.
    pub to_inclusive: bool,
}

impl EventQuery {
    pub fn inclusive(identifier: impl Into<String>, from_ms: i64, to_ms: i64) -> Self {
        Self {
            identifier: identifier.into(),
            from_ms,
            to_ms,
            to_inclusive: true,
        }
    }

    pub fn half_open(identifier: impl Into<String>, from_ms: i64, to_ms: i64) -> Self {
        Self {
            to_inclusive: false,
            ..Self::inclusive(identifier, from_ms, to_ms)
        }
    }

    fn contains(&self, timestamp_ms: i64) -> bool {
        if timestamp_ms < self.from_ms {
            return false;
        }
        if self.to_inclusive {
            timestamp_ms <= self.to_ms
        } else {
            timestamp_ms < self.to_ms
        }
    }
}

/// Outcome of one bulk request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BulkReport {
    pub items: usize,
    pub failed_items: usize,
}

/// Async store contract used by the index writer, metrics and timelines.
///
/// `index` arguments on read operations may be a trailing-`*` pattern.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn index_exists(&self, index: &str) -> StoreResult<bool>;
    async fn create_index(&self, index: &str) -> StoreResult<()>;
    async fn delete_index(&self, index: &str) -> StoreResult<()>;
    async fn bulk_create(&self, index: &str, events: &[StatusEvent]) -> StoreResult<BulkReport>;
    /// Events for one identifier, ascending by timestamp, capped at
    /// [`EVENT_SEARCH_LIMIT`].
    async fn search_events(&self, index: &str, query: &EventQuery)
        -> StoreResult<Vec<StatusEvent>>;
    /// Most recent event per identifier within `[from_ms, to_ms)`.
    async fn latest_per_identifier(
        &self,
        index: &str,
        from_ms: i64,
        to_ms: i64,
    ) -> StoreResult<Vec<StatusEvent>>;
}

/// In-memory implementation for tests and local experimentation.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    indices: RwLock<BTreeMap<String, Vec<StatusEvent>>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn index_names(&self) -> Vec<String> {
        self.indices.read().await.keys().cloned().collect()
    }

    pub async fn document_count(&self, index: &str) -> usize {
        self.indices
            .read()
            .await
            .get(index)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

fn index_matches(pattern: &str, index: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => index.starts_with(prefix),
        None => pattern == index,
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn index_exists(&self, index: &str) -> StoreResult<bool> {
        Ok(self.indices.read().await.contains_key(index))
    }

    async fn create_index(&self, index: &str) -> StoreResult<()> {
        let mut indices = self.indices.write().await;
        if indices.contains_key(index) {
            return Err(StoreError::Rejected {
                endpoint: format!("/{index}"),
                body: format!("index '{index}' already exists"),
            });
        }
        indices.insert(index.to_string(), Vec::new());
        Ok(())
    }

    async fn delete_index(&self, index: &str) -> StoreResult<()> {
        self.indices.write().await.remove(index);
        Ok(())
    }

    async fn bulk_create(&self, index: &str, events: &[StatusEvent]) -> StoreResult<BulkReport> {
        let mut indices = self.indices.write().await;
        indices
            .entry(index.to_string())
            .or_default()
            .extend(events.iter().cloned());
        Ok(BulkReport {
            items: events.len(),
            failed_items: 0,
        })
    }

    async fn search_events(
        &self,
        index: &str,
        query: &EventQuery,
    ) -> StoreResult<Vec<StatusEvent>> {
        let indices = self.indices.read().await;
        let mut events: Vec<StatusEvent> = indices
            .iter()
            .filter(|(name, _)| index_matches(index, name))
            .flat_map(|(_, events)| events.iter())
            .filter(|event| event.identifier == query.identifier)
            .filter(|event| query.contains(event.timestamp_ms))
            .cloned()
            .collect();
        events.sort_by_key(|event| event.timestamp_ms);
        events.truncate(EVENT_SEARCH_LIMIT);
        Ok(events)
    }

    async fn latest_per_identifier(
        &self,
        index: &str,
        from_ms: i64,
        to_ms: i64,
    ) -> StoreResult<Vec<StatusEvent>> {
        let indices = self.indices.read().await;
        let mut latest: BTreeMap<&str, &StatusEvent> = BTreeMap::new();
        for event in indices
            .iter()
            .filter(|(name, _)| index_matches(index, name))
            .flat_map(|(_, events)| events.iter())
            .filter(|event| event.timestamp_ms >= from_ms && event.timestamp_ms < to_ms)
        {
            latest
                .entry(event.identifier.as_str())
                .and_modify(|current| {
                    if event.timestamp_ms >= current.timestamp_ms {
                        *current = event;
                    }
                })
                .or_insert(event);
        }
        Ok(latest
            .into_values()
            .take(LATEST_AGGREGATION_LIMIT)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(identifier: &str, timestamp_ms: i64, status_code: &str) -> StatusEvent {
        StatusEvent {
            identifier: identifier.to_string(),
            timestamp_ms,
            status_code: status_code.to_string(),
            ..StatusEvent::default()
        }
    }

    #[tokio::test]
    async fn functional_in_memory_search_filters_sorts_and_spans_patterns() {
        let store = InMemoryEventStore::new();
        store
            .bulk_create("sts_index_20240102", &[event("A", 30, "60"), event("B", 5, "50")])
            .await
            .expect("bulk day two");
        store
            .bulk_create("sts_index_20240101", &[event("A", 10, "50"), event("A", 20, "55")])
            .await
            .expect("bulk day one");
        store
            .bulk_create("other_index", &[event("A", 15, "99")])
            .await
            .expect("bulk other");

        let hits = store
            .search_events("sts_index_*", &EventQuery::inclusive("A", 10, 30))
            .await
            .expect("search");
        let times: Vec<i64> = hits.iter().map(|hit| hit.timestamp_ms).collect();
        assert_eq!(times, vec![10, 20, 30]);

        let half_open = store
            .search_events("sts_index_*", &EventQuery::half_open("A", 10, 30))
            .await
            .expect("half-open search");
        assert_eq!(half_open.len(), 2);
    }

    #[tokio::test]
    async fn functional_in_memory_latest_per_identifier_keeps_newest_event() {
        let store = InMemoryEventStore::new();
        store
            .bulk_create(
                "sts_index_20240101",
                &[
                    event("A", 10, "50"),
                    event("A", 20, "60"),
                    event("B", 15, "70"),
                    event("C", 99, "80"),
                ],
            )
            .await
            .expect("bulk");
        let latest = store
            .latest_per_identifier("sts_index_*", 0, 50)
            .await
            .expect("latest");
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].identifier, "A");
        assert_eq!(latest[0].status_code, "60");
        assert_eq!(latest[1].identifier, "B");
    }

    #[tokio::test]
    async fn regression_in_memory_create_existing_index_is_rejected_as_fatal() {
        let store = InMemoryEventStore::new();
        store.create_index("sts_index_x").await.expect("create");
        let error = store
            .create_index("sts_index_x")
            .await
            .expect_err("duplicate create");
        assert!(error.is_fatal());
    }
}
