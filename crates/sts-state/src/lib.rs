//! Read-side state fed by ingestion outcomes: the latest-status cache,
//! threshold duration metrics and feed liveness.

mod cache;
mod health;
mod metrics;
mod presentation;

pub use cache::{StatusCache, StatusSnapshot};
pub use health::{liveness_at, HealthMonitor, LIVENESS_THRESHOLD_MS};
pub use metrics::{
    crossing_duration_minutes, MetricsAccumulator, MetricsHandle, ThresholdPair, PRIMARY_PAIR,
    SECONDARY_PAIR,
};
pub use presentation::{PresentationView, Presenter};
