//! Elasticsearch backend over the REST API.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use sts_types::StatusEvent;

use crate::{
    BulkReport, EventQuery, EventStore, StoreError, StoreResult, EVENT_SEARCH_LIMIT,
    LATEST_AGGREGATION_LIMIT,
};

const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";
const SEARCH_OPTIONS: &str = "ignore_unavailable=true&allow_no_indices=true";
const POOL_MAX_IDLE_PER_HOST: usize = 100;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Status-event store backed by an Elasticsearch cluster.
#[derive(Debug, Clone)]
pub struct ElasticsearchStore {
    client: Client,
    base_url: String,
}

impl ElasticsearchStore {
    pub fn new(base_url: impl Into<String>) -> StoreResult<Self> {
        let client = Client::builder()
            .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn search<T: for<'de> Deserialize<'de>>(&self, index: &str, body: Value) -> StoreResult<T> {
        let path = format!("/{index}/_search?{SEARCH_OPTIONS}");
        let response = self.client.post(self.url(&path)).json(&body).send().await?;
        let response = ensure_success(&path, response).await?;
        Ok(response.json::<T>().await?)
    }
}

/// Schema for every daily status index.
pub(crate) fn status_index_mapping() -> Value {
    let keyword = json!({ "type": "keyword", "doc_values": true });
    json!({
        "mappings": {
            "properties": {
                "awb_no": keyword,
                "branch_seq": keyword,
                "update_time": { "type": "date", "doc_values": true },
                "sts_code": keyword,
                "last_updated_user": keyword,
                "last_updated_user_id": keyword,
                "company_name": keyword,
                "company_code": keyword,
                "section_code": keyword,
                "is_stocked": { "type": "boolean", "doc_values": true },
                "igs_status": keyword,
            }
        }
    })
}

pub(crate) fn render_bulk_body(index: &str, events: &[StatusEvent]) -> StoreResult<String> {
    let action = serde_json::to_string(&json!({ "create": { "_index": index } }))?;
    let mut body = String::new();
    for event in events {
        body.push_str(&action);
        body.push('\n');
        body.push_str(&serde_json::to_string(event)?);
        body.push('\n');
    }
    Ok(body)
}

fn event_search_body(query: &EventQuery) -> Value {
    let upper_bound = if query.to_inclusive { "lte" } else { "lt" };
    json!({
        "size": EVENT_SEARCH_LIMIT,
        "sort": [{ "update_time": { "order": "asc" } }],
        "query": {
            "bool": {
                "must": [
                    { "term": { "awb_no": { "value": query.identifier } } },
                    { "range": { "update_time": { "gte": query.from_ms, upper_bound: query.to_ms } } },
                ]
            }
        }
    })
}

fn latest_aggregation_body(from_ms: i64, to_ms: i64) -> Value {
    json!({
        "size": 0,
        "aggs": {
            "f": {
                "filter": { "range": { "update_time": { "gte": from_ms, "lt": to_ms } } },
                "aggs": {
                    "awbs": {
                        "terms": { "size": LATEST_AGGREGATION_LIMIT, "field": "awb_no" },
                        "aggs": {
                            "latest": {
                                "top_hits": {
                                    "size": 1,
                                    "sort": [{ "update_time": { "order": "desc" } }]
                                }
                            }
                        }
                    }
                }
            }
        }
    })
}

async fn ensure_success(endpoint: &str, response: Response) -> StoreResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    if status == StatusCode::BAD_REQUEST {
        return Err(StoreError::Rejected {
            endpoint: endpoint.to_string(),
            body,
        });
    }
    Err(StoreError::UnexpectedStatus {
        endpoint: endpoint.to_string(),
        status: status.as_u16(),
        body,
    })
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: SearchHits,
}

#[derive(Debug, Default, Deserialize)]
struct SearchHits {
    #[serde(default)]
    hits: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(rename = "_source")]
    source: StatusEvent,
}

#[derive(Debug, Deserialize)]
struct LatestAggregationResponse {
    aggregations: LatestAggregations,
}

#[derive(Debug, Deserialize)]
struct LatestAggregations {
    f: FilteredAggregation,
}

#[derive(Debug, Deserialize)]
struct FilteredAggregation {
    awbs: TermsAggregation,
}

#[derive(Debug, Deserialize)]
struct TermsAggregation {
    #[serde(default)]
    buckets: Vec<TermsBucket>,
}

#[derive(Debug, Deserialize)]
struct TermsBucket {
    key: String,
    latest: TopHitsAggregation,
}

#[derive(Debug, Deserialize)]
struct TopHitsAggregation {
    hits: SearchHits,
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<HashMap<String, BulkItemResult>>,
}

#[derive(Debug, Deserialize)]
struct BulkItemResult {
    status: u16,
}

#[async_trait]
impl EventStore for ElasticsearchStore {
    async fn index_exists(&self, index: &str) -> StoreResult<bool> {
        let path = format!("/{index}");
        let response = self.client.head(self.url(&path)).send().await?;
        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(StoreError::UnexpectedStatus {
                endpoint: path,
                status: status.as_u16(),
                body: String::new(),
            }),
        }
    }

    async fn create_index(&self, index: &str) -> StoreResult<()> {
        let path = format!("/{index}");
        let response = self
            .client
            .put(self.url(&path))
            .json(&status_index_mapping())
            .send()
            .await?;
        ensure_success(&path, response).await?;
        tracing::info!(index, "created status index");
        Ok(())
    }

    async fn delete_index(&self, index: &str) -> StoreResult<()> {
        let path = format!("/{index}");
        let response = self.client.delete(self.url(&path)).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        ensure_success(&path, response).await?;
        Ok(())
    }

    async fn bulk_create(&self, index: &str, events: &[StatusEvent]) -> StoreResult<BulkReport> {
        if events.is_empty() {
            return Ok(BulkReport::default());
        }
        let path = "/_bulk";
        let response = self
            .client
            .post(self.url(path))
            .header(reqwest::header::CONTENT_TYPE, NDJSON_CONTENT_TYPE)
            .body(render_bulk_body(index, events)?)
            .send()
            .await?;
        let response = ensure_success(path, response).await?;
        let parsed = response.json::<BulkResponse>().await?;
        let failed_items = if parsed.errors {
            parsed
                .items
                .iter()
                .flat_map(|item| item.values())
                .filter(|result| result.status >= 300)
                .count()
        } else {
            0
        };
        Ok(BulkReport {
            items: events.len(),
            failed_items,
        })
    }

    async fn search_events(
        &self,
        index: &str,
        query: &EventQuery,
    ) -> StoreResult<Vec<StatusEvent>> {
        let response: SearchResponse = self.search(index, event_search_body(query)).await?;
        Ok(response
            .hits
            .hits
            .into_iter()
            .map(|hit| hit.source)
            .collect())
    }

    async fn latest_per_identifier(
        &self,
        index: &str,
        from_ms: i64,
        to_ms: i64,
    ) -> StoreResult<Vec<StatusEvent>> {
        let response: LatestAggregationResponse = self
            .search(index, latest_aggregation_body(from_ms, to_ms))
            .await?;
        Ok(response
            .aggregations
            .f
            .awbs
            .buckets
            .into_iter()
            .filter_map(|bucket| {
                let key = bucket.key;
                bucket
                    .latest
                    .hits
                    .hits
                    .into_iter()
                    .next()
                    .map(|hit| StatusEvent {
                        identifier: key,
                        ..hit.source
                    })
            })
            .collect())
    }
}
