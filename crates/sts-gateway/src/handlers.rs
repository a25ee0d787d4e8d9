use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::Value;
use sts_core::is_representable_unix_ms;
use sts_timeline::{timeline_calendar, BucketGrid, QueryMode};

use crate::awb_list::{
    list_identifiers, paginate, recent_window_start, recently_seen, AwbFilter, AwbSortKey,
    RECENT_WINDOW_MS,
};
use crate::types::{
    AwbListQuery, AwbListResponse, StatusCodeListResponse, StatusQuery, StatusResponse,
    TimelineQuery, TimelineResponse, UserListQuery, UserListResponse,
};
use crate::GatewayState;

/// Bucket width used when a status request names none.
pub const DEFAULT_TIMESPAN_MINUTES: i64 = 10;

fn bad_request() -> Response {
    (StatusCode::BAD_REQUEST, Json(Value::Null)).into_response()
}

fn non_empty(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|value| !value.is_empty())
}

fn parse_i64(raw: Option<&str>) -> Option<i64> {
    non_empty(raw)?.parse().ok()
}

/// Millisecond timestamp that chrono can represent; anything else is rejected
/// before it reaches grid arithmetic.
fn parse_timestamp_ms(raw: Option<&str>) -> Option<i64> {
    parse_i64(raw).filter(|value| is_representable_unix_ms(*value))
}

fn is_true(raw: Option<&str>) -> bool {
    raw.map(str::trim) == Some("true")
}

pub(crate) async fn handle_status(
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<StatusQuery>,
) -> Response {
    let Some(key) = non_empty(query.key.as_deref()) else {
        return bad_request();
    };
    let (Some(from_ms), Some(to_ms)) = (
        parse_timestamp_ms(query.from.as_deref()),
        parse_timestamp_ms(query.to.as_deref()),
    ) else {
        return bad_request();
    };
    let span_minutes = match non_empty(query.timespan.as_deref()) {
        None => DEFAULT_TIMESPAN_MINUTES,
        Some(raw) => match raw.parse::<i64>() {
            Ok(value) => value,
            Err(_) => return bad_request(),
        },
    };
    let Some(grid) = BucketGrid::from_span_minutes(span_minutes) else {
        return bad_request();
    };
    let mode = if is_true(query.islatest.as_deref()) {
        QueryMode::Latest
    } else if is_true(query.isupdate.as_deref()) {
        QueryMode::Update
    } else {
        QueryMode::Default
    };

    let status = match state
        .timeline
        .reconstruct(key, from_ms, to_ms, &grid, mode)
        .await
    {
        Ok(buckets) => buckets,
        Err(error) => {
            tracing::warn!(identifier = key, %error, "timeline query failed");
            None
        }
    };
    (StatusCode::OK, Json(StatusResponse { status })).into_response()
}

async fn recent_exclusions(
    state: &GatewayState,
    last_updated: Option<&str>,
    filter: &AwbFilter,
) -> HashSet<String> {
    let Some(to_ms) = parse_timestamp_ms(last_updated) else {
        return HashSet::new();
    };
    let Some(grid) = BucketGrid::from_span_minutes(RECENT_WINDOW_MS / 60_000) else {
        return HashSet::new();
    };
    match state
        .timeline
        .latest_per_identifier(recent_window_start(to_ms), to_ms, &grid)
        .await
    {
        Ok(recent) => recently_seen(&recent, filter),
        Err(error) => {
            tracing::warn!(%error, "recent status query failed");
            HashSet::new()
        }
    }
}

pub(crate) async fn handle_awb_list(
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<AwbListQuery>,
) -> Response {
    let filter = AwbFilter::new(query.user.as_deref(), query.sts.as_deref());
    let excluded = if is_true(query.isupdate.as_deref()) {
        recent_exclusions(&state, query.lastupdated.as_deref(), &filter).await
    } else {
        HashSet::new()
    };
    let snapshot = state.view.cache.snapshot();
    let sort = query.sort.as_deref().and_then(AwbSortKey::parse);
    let listed = list_identifiers(
        &snapshot,
        sort,
        is_true(query.isdesc.as_deref()),
        &filter,
        &excluded,
    );
    let ttl = listed.len();

    let paging = match (non_empty(query.page.as_deref()), non_empty(query.par.as_deref())) {
        (Some(page), Some(per_page)) => page.parse::<i64>().ok().zip(per_page.parse::<i64>().ok()),
        _ => None,
    };
    let awbnos = match paging {
        Some((page, per_page)) => match paginate(listed, page, per_page) {
            Ok(slice) => slice,
            Err(_) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(AwbListResponse {
                        ttl: 0,
                        awbnos: None,
                    }),
                )
                    .into_response();
            }
        },
        None => listed,
    };
    (
        StatusCode::OK,
        Json(AwbListResponse {
            ttl,
            awbnos: Some(awbnos),
        }),
    )
        .into_response()
}

pub(crate) async fn handle_user_list(
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<UserListQuery>,
) -> Response {
    let status_filter = non_empty(query.status.as_deref());
    let snapshot = state.view.cache.snapshot();
    let users: BTreeSet<&str> = snapshot
        .values()
        .filter(|row| status_filter.map_or(true, |code| row.status_code == code))
        .map(|row| row.user_name.as_str())
        .filter(|name| !name.is_empty())
        .collect();
    let users = users.into_iter().map(str::to_string).collect();
    (StatusCode::OK, Json(UserListResponse { users })).into_response()
}

pub(crate) async fn handle_status_code_list(State(state): State<Arc<GatewayState>>) -> Response {
    let snapshot = state.view.cache.snapshot();
    let codes: BTreeSet<&str> = snapshot
        .values()
        .map(|row| row.status_code.as_str())
        .collect();
    let statuscodes = codes.into_iter().map(str::to_string).collect();
    (StatusCode::OK, Json(StatusCodeListResponse { statuscodes })).into_response()
}

pub(crate) async fn handle_timeline(Query(query): Query<TimelineQuery>) -> Response {
    let (Some(from_ms), Some(to_ms)) = (
        parse_timestamp_ms(query.from.as_deref()),
        parse_timestamp_ms(query.to.as_deref()),
    ) else {
        return bad_request();
    };
    let Some(grid) = parse_i64(query.timespan.as_deref()).and_then(BucketGrid::from_span_minutes)
    else {
        return bad_request();
    };
    let timeline = timeline_calendar(from_ms, to_ms, &grid, is_true(query.islatest.as_deref()));
    (StatusCode::OK, Json(TimelineResponse { timeline })).into_response()
}

pub(crate) async fn handle_metrics(State(state): State<Arc<GatewayState>>) -> Response {
    (StatusCode::OK, Json(state.view.metrics.snapshot())).into_response()
}

pub(crate) async fn handle_health(State(state): State<Arc<GatewayState>>) -> Response {
    (StatusCode::OK, Json(state.view.health.report())).into_response()
}
