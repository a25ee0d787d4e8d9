//! Background ingestion loop.
//!
//! Two feed timers and a watchdog drive a single `select!` loop. Each cycle
//! body runs to completion inside the loop, so cycles never overlap, and its
//! outcome is handed to the presentation side over a capacity-one channel.
//! When the watchdog fires, both feed timers are dropped and rebuilt.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use sts_core::{current_unix_timestamp_ms, datetime_from_unix_ms};
use sts_store::IndexWriter;
use sts_types::{FeedKind, StatusEvent};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::cross_reference::{
    ingest_cross_reference_feed, CrossReferenceFeedConfig, CrossReferenceStore,
};
use crate::feed_parser::FeedParser;
use crate::lock::{LockConfig, LockedFileExchange};
use crate::worklist::{select_worklist, write_worklist, WorklistConfig};

pub const DEFAULT_STATUS_INTERVAL: Duration = Duration::from_secs(90);
pub const DEFAULT_CROSS_REFERENCE_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_WATCHDOG_INTERVAL: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_STATUS_START_DELAY: Duration = Duration::from_secs(5);
/// Outcomes wait here until the presentation loop takes them.
pub const OUTCOME_CHANNEL_CAPACITY: usize = 1;

/// Result of one ingestion cycle as seen by the presentation side.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    StatusFeed {
        ingested_at_ms: i64,
        events: Vec<StatusEvent>,
    },
    /// The cross-reference feed answered; it never carries records.
    CrossReference,
    Failed {
        kind: FeedKind,
        error: String,
        fatal: bool,
    },
}

impl CycleOutcome {
    fn failed(kind: FeedKind, error: impl std::fmt::Display, fatal: bool) -> Self {
        let error = error.to_string();
        if fatal {
            tracing::error!(feed = kind.as_str(), error = %error, "ingestion cycle failed fatally");
        } else {
            tracing::warn!(feed = kind.as_str(), error = %error, "ingestion cycle skipped");
        }
        Self::Failed { kind, error, fatal }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Failed { fatal: true, .. })
    }
}

pub fn outcome_channel() -> (mpsc::Sender<CycleOutcome>, mpsc::Receiver<CycleOutcome>) {
    mpsc::channel(OUTCOME_CHANNEL_CAPACITY)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionSchedulerConfig {
    pub status_interval: Duration,
    pub cross_reference_interval: Duration,
    pub watchdog_interval: Duration,
    /// Extra wait before the first status tick of every timer group.
    pub status_start_delay: Duration,
}

impl Default for IngestionSchedulerConfig {
    fn default() -> Self {
        Self {
            status_interval: DEFAULT_STATUS_INTERVAL,
            cross_reference_interval: DEFAULT_CROSS_REFERENCE_INTERVAL,
            watchdog_interval: DEFAULT_WATCHDOG_INTERVAL,
            status_start_delay: DEFAULT_STATUS_START_DELAY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionPipelineConfig {
    pub status_export_path: PathBuf,
    pub status_lock: LockConfig,
    pub cross_reference: CrossReferenceFeedConfig,
    pub cross_reference_lock: LockConfig,
    pub worklist: Option<WorklistConfig>,
}

/// Cycle bodies plus the state they own between cycles.
pub struct IngestionPipeline {
    parser: FeedParser,
    status_lock: LockedFileExchange,
    cross_reference_feed: CrossReferenceFeedConfig,
    cross_reference_lock: LockedFileExchange,
    worklist: Option<WorklistConfig>,
    writer: Arc<IndexWriter>,
    cross_reference: CrossReferenceStore,
}

impl IngestionPipeline {
    pub fn new(config: IngestionPipelineConfig, writer: Arc<IndexWriter>) -> Self {
        Self {
            parser: FeedParser::new(config.status_export_path),
            status_lock: LockedFileExchange::new(config.status_lock),
            cross_reference_feed: config.cross_reference,
            cross_reference_lock: LockedFileExchange::new(config.cross_reference_lock),
            worklist: config.worklist,
            writer,
            cross_reference: CrossReferenceStore::new(),
        }
    }

    pub fn cross_reference(&self) -> &CrossReferenceStore {
        &self.cross_reference
    }

    /// Reads the status export under its lock, persists it and refreshes the
    /// worklist.
    pub async fn run_status_cycle(&mut self) -> CycleOutcome {
        tracing::info!("status feed cycle started");
        let lease = match self.status_lock.acquire().await {
            Ok(lease) => lease,
            Err(error) => return CycleOutcome::failed(FeedKind::StatusFeed, error, false),
        };
        let ingested_at_ms = current_unix_timestamp_ms();
        let parsed = self.parser.read_cycle(&self.cross_reference, ingested_at_ms);
        if let Err(error) = lease.release() {
            tracing::warn!(error = %error, "status lock release failed");
        }
        let cycle = match parsed {
            Ok(cycle) => cycle,
            Err(error) => return CycleOutcome::failed(FeedKind::StatusFeed, error, false),
        };

        let today = datetime_from_unix_ms(ingested_at_ms).date_naive();
        match self.writer.write_cycle(today, &cycle.events).await {
            Ok(report) if report.is_complete() => {
                tracing::info!(index = %report.index, written = report.written, batches = report.batches, "status feed cycle persisted");
            }
            Ok(report) => {
                tracing::warn!(
                    index = %report.index,
                    written = report.written,
                    failed_batches = report.failed_batches.len(),
                    "status feed cycle partially persisted"
                );
            }
            Err(error) if error.is_fatal() => {
                return CycleOutcome::failed(FeedKind::StatusFeed, error, true);
            }
            Err(error) => {
                tracing::warn!(error = %error, "status feed cycle not persisted");
            }
        }

        if let Some(worklist) = &self.worklist {
            let identifiers = select_worklist(&cycle.events);
            if let Err(error) = write_worklist(worklist, &identifiers).await {
                tracing::warn!(error = %format!("{error:#}"), "worklist update failed");
            }
        }

        CycleOutcome::StatusFeed {
            ingested_at_ms: cycle.ingested_at_ms,
            events: cycle.events,
        }
    }

    /// Consumes pending cross-reference files under their lock.
    pub async fn run_cross_reference_cycle(&mut self) -> CycleOutcome {
        let lease = match self.cross_reference_lock.acquire().await {
            Ok(lease) => lease,
            Err(error) => return CycleOutcome::failed(FeedKind::CrossReference, error, false),
        };
        let ingested = ingest_cross_reference_feed(&self.cross_reference_feed, &mut self.cross_reference);
        if let Err(error) = lease.release() {
            tracing::warn!(error = %error, "cross-reference lock release failed");
        }
        match ingested {
            Ok(report) => {
                if !report.is_idle() {
                    tracing::info!(
                        applied = report.applied,
                        known = self.cross_reference.len(),
                        "cross-reference feed consumed"
                    );
                }
                CycleOutcome::CrossReference
            }
            Err(error) => CycleOutcome::failed(FeedKind::CrossReference, error, false),
        }
    }
}

#[derive(Debug)]
pub struct IngestionSchedulerHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl IngestionSchedulerHandle {
    pub fn is_running(&self) -> bool {
        self.task
            .as_ref()
            .map(|task| !task.is_finished())
            .unwrap_or(false)
    }

    pub async fn shutdown(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

pub fn start_ingestion_scheduler(
    config: IngestionSchedulerConfig,
    pipeline: IngestionPipeline,
    outcomes: mpsc::Sender<CycleOutcome>,
) -> Result<IngestionSchedulerHandle> {
    if config.status_interval.is_zero() || config.cross_reference_interval.is_zero() {
        anyhow::bail!("ingestion feed intervals must be greater than zero");
    }
    if config.watchdog_interval.is_zero() {
        anyhow::bail!("ingestion watchdog interval must be greater than zero");
    }
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let task = tokio::spawn(async move {
        run_ingestion_loop(config, pipeline, outcomes, shutdown_rx).await;
    });
    Ok(IngestionSchedulerHandle {
        shutdown_tx: Some(shutdown_tx),
        task: Some(task),
    })
}

async fn run_ingestion_loop(
    config: IngestionSchedulerConfig,
    mut pipeline: IngestionPipeline,
    outcomes: mpsc::Sender<CycleOutcome>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let mut generation = 0_u64;
    loop {
        generation = generation.saturating_add(1);
        let started = Instant::now();
        let mut cross_reference_ticks = tokio::time::interval_at(
            started + config.cross_reference_interval,
            config.cross_reference_interval,
        );
        cross_reference_ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut status_ticks = tokio::time::interval_at(
            started + config.status_start_delay + config.status_interval,
            config.status_interval,
        );
        status_ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let watchdog = tokio::time::sleep(config.watchdog_interval);
        tokio::pin!(watchdog);
        tracing::debug!(generation, "ingestion timers started");

        loop {
            let outcome = tokio::select! {
                _ = status_ticks.tick() => pipeline.run_status_cycle().await,
                _ = cross_reference_ticks.tick() => pipeline.run_cross_reference_cycle().await,
                _ = &mut watchdog => {
                    tracing::info!(generation, "watchdog restarting ingestion timers");
                    break;
                }
                _ = &mut shutdown_rx => return,
            };
            tokio::select! {
                sent = outcomes.send(outcome) => {
                    if sent.is_err() {
                        tracing::warn!("outcome receiver closed; stopping ingestion");
                        return;
                    }
                }
                _ = &mut shutdown_rx => return,
            }
        }
    }
}
