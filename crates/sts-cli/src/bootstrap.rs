use std::sync::Arc;

use anyhow::{Context, Result};
use sts_core::{current_unix_timestamp_ms, datetime_from_unix_ms};
use sts_gateway::{build_gateway_router, serve_gateway, GatewayState};
use sts_ingest::{outcome_channel, start_ingestion_scheduler, IngestionPipeline};
use sts_state::{HealthMonitor, MetricsAccumulator, Presenter};
use sts_store::{ElasticsearchStore, EventStore, IndexWriter};
use sts_timeline::TimelineEngine;
use tokio::sync::oneshot;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::cli_args::Cli;
use crate::settings::ServerSettings;

pub(crate) fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

pub(crate) async fn run_server(cli: Cli) -> Result<()> {
    let settings = ServerSettings::load(&cli.settings)
        .with_context(|| format!("failed to load settings from {}", cli.settings.display()))?;

    let store: Arc<dyn EventStore> = Arc::new(
        ElasticsearchStore::new(cli.elasticsearch_url.as_str())
            .context("failed to build event store client")?,
    );
    let writer = Arc::new(IndexWriter::new(Arc::clone(&store), settings.retention_days));

    let today = datetime_from_unix_ms(current_unix_timestamp_ms()).date_naive();
    let pruned = writer
        .prune_expired(today)
        .await
        .context("failed to prune expired indices")?;
    let index = writer
        .ensure_index_for(today)
        .await
        .context("failed to prepare today's index")?;
    tracing::info!(
        index = %index,
        pruned = pruned.len(),
        retention_days = settings.retention_days,
        "event store ready"
    );

    let presenter = Presenter::new(
        MetricsAccumulator::new(Arc::clone(&store)),
        Arc::new(HealthMonitor::new()),
    );
    let view = presenter.view();
    let (outcome_tx, outcome_rx) = outcome_channel();
    let pipeline = IngestionPipeline::new(settings.pipeline_config(), writer);
    let mut scheduler = start_ingestion_scheduler(cli.scheduler_config(), pipeline, outcome_tx)
        .context("failed to start ingestion scheduler")?;

    let (stopped_tx, stopped_rx) = oneshot::channel::<()>();
    let presenter_task = tokio::spawn(async move {
        let result = presenter.run(outcome_rx).await;
        let _ = stopped_tx.send(());
        result
    });

    let state = Arc::new(GatewayState::new(view, TimelineEngine::new(store)));
    let router = build_gateway_router(state, Some(cli.static_dir.as_path()));
    let shutdown = async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown signal received");
            }
            _ = stopped_rx => {
                tracing::error!("presentation loop stopped; shutting down");
            }
        }
    };
    let served = serve_gateway(cli.bind, router, shutdown).await;

    scheduler.shutdown().await;
    let presented = presenter_task
        .await
        .context("presentation task panicked")?;
    served?;
    presented.context("presentation loop failed")
}
