use std::sync::Arc;

use anyhow::{bail, Result};
use sts_core::current_unix_timestamp_ms;
use sts_ingest::CycleOutcome;
use sts_types::FeedKind;
use tokio::sync::mpsc;

use crate::cache::StatusCache;
use crate::health::HealthMonitor;
use crate::metrics::{MetricsAccumulator, MetricsHandle};

/// Read-side handles shared with request handlers.
#[derive(Debug, Clone)]
pub struct PresentationView {
    pub cache: StatusCache,
    pub health: Arc<HealthMonitor>,
    pub metrics: MetricsHandle,
}

/// Sole writer of the presentation state; applies ingestion outcomes in
/// arrival order.
pub struct Presenter {
    cache: StatusCache,
    health: Arc<HealthMonitor>,
    metrics: MetricsAccumulator,
}

impl Presenter {
    pub fn new(metrics: MetricsAccumulator, health: Arc<HealthMonitor>) -> Self {
        Self {
            cache: StatusCache::new(),
            health,
            metrics,
        }
    }

    pub fn view(&self) -> PresentationView {
        PresentationView {
            cache: self.cache.clone(),
            health: Arc::clone(&self.health),
            metrics: self.metrics.handle(),
        }
    }

    pub async fn apply(&mut self, outcome: CycleOutcome) -> Result<()> {
        self.apply_at(outcome, current_unix_timestamp_ms()).await
    }

    /// Fatal failures come back as `Err`; everything else updates state.
    pub async fn apply_at(&mut self, outcome: CycleOutcome, now_ms: i64) -> Result<()> {
        match outcome {
            CycleOutcome::StatusFeed { events, .. } => {
                self.health.record(FeedKind::StatusFeed, now_ms);
                let identifiers = self.cache.rebuild(&events);
                let snapshot = self.metrics.absorb_cycle(&events, now_ms).await;
                tracing::info!(
                    identifiers,
                    primary_count = snapshot.primary_count,
                    secondary_count = snapshot.secondary_count,
                    "status cache rebuilt"
                );
            }
            CycleOutcome::CrossReference => {
                self.health.record(FeedKind::CrossReference, now_ms);
            }
            CycleOutcome::Failed {
                kind,
                error,
                fatal: true,
            } => {
                bail!("{} cycle failed fatally: {error}", kind.as_str());
            }
            CycleOutcome::Failed { .. } => {}
        }
        Ok(())
    }

    /// Drains `outcomes` until the sender side closes or a fatal outcome
    /// arrives.
    pub async fn run(mut self, mut outcomes: mpsc::Receiver<CycleOutcome>) -> Result<()> {
        while let Some(outcome) = outcomes.recv().await {
            self.apply(outcome).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sts_ingest::outcome_channel;
    use sts_store::InMemoryEventStore;
    use sts_types::{Liveness, StatusEvent};

    const T: i64 = 1_700_006_400_000;
    const MINUTE: i64 = 60_000;

    fn presenter(started_at: i64) -> Presenter {
        Presenter::new(
            MetricsAccumulator::new(Arc::new(InMemoryEventStore::new())),
            Arc::new(HealthMonitor::started_at(started_at)),
        )
    }

    fn event(identifier: &str, status_code: &str) -> StatusEvent {
        StatusEvent {
            identifier: identifier.to_string(),
            timestamp_ms: T,
            status_code: status_code.to_string(),
            ..StatusEvent::default()
        }
    }

    #[tokio::test]
    async fn functional_status_outcome_rebuilds_cache_and_marks_feed_alive() {
        let mut presenter = presenter(T);
        let view = presenter.view();
        presenter
            .apply_at(
                CycleOutcome::StatusFeed {
                    ingested_at_ms: T,
                    events: vec![event("A", "50"), event("B", "75")],
                },
                T + 11 * MINUTE,
            )
            .await
            .expect("apply");
        assert_eq!(view.cache.len(), 2);
        let report = view.health.report_at(T + 11 * MINUTE);
        assert_eq!(report.last_status_feed_ms, (T + 11 * MINUTE) as f64);
        assert_eq!(report.status, Liveness::Dead);

        presenter
            .apply_at(CycleOutcome::CrossReference, T + 11 * MINUTE)
            .await
            .expect("apply");
        assert_eq!(view.health.report_at(T + 11 * MINUTE).status, Liveness::Fine);
        assert_eq!(view.cache.len(), 2, "cross-reference outcomes keep the cache");
    }

    #[tokio::test]
    async fn regression_recoverable_failure_changes_nothing() {
        let mut presenter = presenter(T);
        let view = presenter.view();
        presenter
            .apply_at(
                CycleOutcome::Failed {
                    kind: FeedKind::StatusFeed,
                    error: "lock busy".to_string(),
                    fatal: false,
                },
                T + MINUTE,
            )
            .await
            .expect("recoverable");
        assert!(view.cache.is_empty());
        assert_eq!(view.health.report_at(T).last_status_feed_ms, T as f64);
    }

    #[tokio::test]
    async fn integration_run_stops_with_error_on_fatal_outcome() {
        let presenter = presenter(T);
        let view = presenter.view();
        let (sender, receiver) = outcome_channel();
        let task = tokio::spawn(presenter.run(receiver));

        sender
            .send(CycleOutcome::StatusFeed {
                ingested_at_ms: T,
                events: vec![event("A", "50")],
            })
            .await
            .expect("send status");
        sender
            .send(CycleOutcome::Failed {
                kind: FeedKind::StatusFeed,
                error: "mapper_parsing_exception".to_string(),
                fatal: true,
            })
            .await
            .expect("send fatal");

        let error = task
            .await
            .expect("join")
            .expect_err("fatal outcome ends the loop");
        assert!(error.to_string().contains("mapper_parsing_exception"));
        assert_eq!(view.cache.len(), 1);
    }
}
