use serde::{Deserialize, Serialize};
use sts_timeline::{CalendarSlot, TimelineBucket};

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct StatusQuery {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub timespan: Option<String>,
    #[serde(default)]
    pub islatest: Option<String>,
    #[serde(default)]
    pub isupdate: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct AwbListQuery {
    #[serde(default)]
    pub sort: Option<String>,
    #[serde(default)]
    pub isdesc: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub sts: Option<String>,
    #[serde(default)]
    pub isupdate: Option<String>,
    #[serde(default)]
    pub lastupdated: Option<String>,
    #[serde(default)]
    pub page: Option<String>,
    #[serde(default)]
    pub par: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct UserListQuery {
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct TimelineQuery {
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub timespan: Option<String>,
    #[serde(default)]
    pub islatest: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct StatusResponse {
    pub status: Option<Vec<TimelineBucket>>,
}

#[derive(Debug, Serialize)]
pub(crate) struct AwbListResponse {
    pub ttl: usize,
    pub awbnos: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub(crate) struct UserListResponse {
    pub users: Vec<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct StatusCodeListResponse {
    pub statuscodes: Vec<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct TimelineResponse {
    pub timeline: Vec<CalendarSlot>,
}
