//! Identifier listing over the status cache: sort, filter, exclusion of
//! recently seen identifiers and paging.

use std::cmp::Ordering;
use std::collections::HashSet;

use sts_state::StatusSnapshot;
use sts_timeline::TimelineBucket;
use sts_types::LatestStatus;

/// Width of the window used to find identifiers a poller already saw.
pub const RECENT_WINDOW_MS: i64 = 10 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AwbSortKey {
    Identifier,
    UserId,
    UserName,
    LastUpdated,
    Status,
    CompanyName,
    CompanyCode,
    SectionCode,
}

impl AwbSortKey {
    /// Unknown keys keep the identifier order.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "awbno" => Some(Self::Identifier),
            "update_user_id" => Some(Self::UserId),
            "update_user_name" => Some(Self::UserName),
            "last_updated" => Some(Self::LastUpdated),
            "status" => Some(Self::Status),
            "company_name" => Some(Self::CompanyName),
            "company_code" => Some(Self::CompanyCode),
            "section_code" => Some(Self::SectionCode),
            _ => None,
        }
    }

    fn compare(self, left: &LatestStatus, right: &LatestStatus) -> Ordering {
        match self {
            Self::Identifier => left.identifier.cmp(&right.identifier),
            Self::UserId => left.user_id.cmp(&right.user_id),
            Self::UserName => left.user_name.cmp(&right.user_name),
            Self::LastUpdated => left.timestamp_ms.cmp(&right.timestamp_ms),
            Self::Status => left.status_code.cmp(&right.status_code),
            Self::CompanyName => left.company_name.cmp(&right.company_name),
            Self::CompanyCode => left.company_code.cmp(&right.company_code),
            Self::SectionCode => left.section_code.cmp(&right.section_code),
        }
    }
}

/// Exact-match filters; empty values are inactive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AwbFilter {
    pub user_name: Option<String>,
    pub status_code: Option<String>,
}

impl AwbFilter {
    pub fn new(user_name: Option<&str>, status_code: Option<&str>) -> Self {
        let active = |value: Option<&str>| value.filter(|value| !value.is_empty()).map(str::to_string);
        Self {
            user_name: active(user_name),
            status_code: active(status_code),
        }
    }

    pub fn matches(&self, status: &LatestStatus) -> bool {
        self.matches_fields(&status.user_name, &status.status_code)
    }

    fn matches_fields(&self, user_name: &str, status_code: &str) -> bool {
        self.user_name.as_deref().map_or(true, |wanted| wanted == user_name)
            && self
                .status_code
                .as_deref()
                .map_or(true, |wanted| wanted == status_code)
    }
}

/// Identifiers ordered and filtered, before paging.
pub fn list_identifiers(
    snapshot: &StatusSnapshot,
    sort: Option<AwbSortKey>,
    descending: bool,
    filter: &AwbFilter,
    excluded: &HashSet<String>,
) -> Vec<String> {
    // Snapshot iteration is already in identifier order.
    let mut rows: Vec<&LatestStatus> = snapshot.values().collect();
    if let Some(key) = sort {
        if descending {
            rows.sort_by(|left, right| key.compare(right, left));
        } else {
            rows.sort_by(|left, right| key.compare(left, right));
        }
    }
    rows.into_iter()
        .filter(|row| filter.matches(row))
        .filter(|row| !excluded.contains(&row.identifier))
        .map(|row| row.identifier.clone())
        .collect()
}

/// Identifiers whose latest recent event matches `filter`.
pub fn recently_seen(recent: &[TimelineBucket], filter: &AwbFilter) -> HashSet<String> {
    recent
        .iter()
        .filter(|bucket| filter.matches_fields(&bucket.user_name, &bucket.status_code))
        .map(|bucket| bucket.identifier.clone())
        .collect()
}

/// Start of the exclusion window for a poller that last looked at
/// `last_updated_ms`.
pub fn recent_window_start(last_updated_ms: i64) -> i64 {
    last_updated_ms
        .saturating_sub(RECENT_WINDOW_MS)
        .div_euclid(RECENT_WINDOW_MS)
        .saturating_mul(RECENT_WINDOW_MS)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageError {
    Negative,
    PastEnd,
}

/// Slice `[page * per_page, (page + 1) * per_page)` clamped to the list.
pub fn paginate(identifiers: Vec<String>, page: i64, per_page: i64) -> Result<Vec<String>, PageError> {
    if page < 0 || per_page < 0 {
        return Err(PageError::Negative);
    }
    if identifiers.is_empty() {
        return Ok(identifiers);
    }
    let start = page.saturating_mul(per_page);
    if start >= identifiers.len() as i64 {
        return Err(PageError::PastEnd);
    }
    let end = page
        .saturating_add(1)
        .saturating_mul(per_page)
        .min(identifiers.len() as i64);
    Ok(identifiers[start as usize..end as usize].to_vec())
}
