use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, Result};
use serde_json::Value;
use sts_gateway::{build_gateway_router, GatewayState};
use sts_ingest::{
    outcome_channel, start_ingestion_scheduler, CrossReferenceFeedConfig, CycleOutcome,
    IngestionPipeline, IngestionPipelineConfig, IngestionSchedulerConfig, LockConfig,
    WorklistConfig,
};
use sts_state::{HealthMonitor, MetricsAccumulator, Presenter};
use sts_store::{InMemoryEventStore, IndexWriter};
use sts_timeline::TimelineEngine;
use tokio::net::TcpListener;

const HEADER: &str =
    "kind,section,awb,branch,x,company_code,company_name,status,a,b,c,user_id,user_name";

struct FeedFolders {
    _temp: tempfile::TempDir,
    root: PathBuf,
}

impl FeedFolders {
    fn new() -> Result<Self> {
        let temp = tempfile::tempdir().context("create tempdir")?;
        let root = temp.path().to_path_buf();
        for dir in ["locks", "xref", "out"] {
            std::fs::create_dir_all(root.join(dir)).context("create fixture dir")?;
        }
        for target in ["sts.lnk", "igs.lnk", "list.lnk"] {
            std::fs::write(root.join("locks").join(target), "").context("create lock target")?;
        }
        Ok(Self { _temp: temp, root })
    }

    fn lock(&self, target: &str, lock: &str) -> LockConfig {
        LockConfig::in_folder(&self.root.join("locks"), target, lock)
            .with_retry_interval(Duration::from_millis(1))
    }

    fn worklist_path(&self) -> PathBuf {
        self.root.join("out").join("list75.txt")
    }

    /// Writes the export the way the upstream system does: Shift-JIS, CRLF
    /// rows and a trailing end-of-file marker.
    fn write_status_export(&self, rows: &[&str]) -> Result<()> {
        let mut text = String::from(HEADER);
        for row in rows {
            text.push_str("\r\n");
            text.push_str(row);
        }
        text.push_str("\r\n\u{1a}");
        let (encoded, _, unmappable) = encoding_rs::SHIFT_JIS.encode(&text);
        assert!(!unmappable, "fixture must be representable in Shift-JIS");
        std::fs::write(self.root.join("sts.csv"), encoded).context("write status export")
    }

    fn write_cross_reference(&self, identifiers: &str, outcomes: &str) -> Result<()> {
        std::fs::write(self.root.join("xref").join("BLNO_0001.txt"), identifiers)
            .context("write identifier file")?;
        std::fs::write(self.root.join("xref").join("IGS_0001.txt"), outcomes)
            .context("write outcome file")
    }

    fn pipeline(&self, store: Arc<InMemoryEventStore>) -> IngestionPipeline {
        let writer = Arc::new(IndexWriter::new(store, 3));
        IngestionPipeline::new(
            IngestionPipelineConfig {
                status_export_path: self.root.join("sts.csv"),
                status_lock: self.lock("sts.lnk", "sts.lock"),
                cross_reference: CrossReferenceFeedConfig {
                    folder: self.root.join("xref"),
                    identifiers_prefix: "BLNO".to_string(),
                    outcomes_prefix: "IGS".to_string(),
                },
                cross_reference_lock: self.lock("igs.lnk", "igs.lock"),
                worklist: Some(WorklistConfig {
                    output_path: self.worklist_path(),
                    lock: self.lock("list.lnk", "list.lock"),
                }),
            },
            writer,
        )
    }
}

fn file_count(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0)
}

async fn spawn_gateway(state: Arc<GatewayState>) -> Result<(SocketAddr, tokio::task::JoinHandle<()>)> {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .context("bind ephemeral listener")?;
    let addr = listener.local_addr().context("resolve listener addr")?;
    let app = build_gateway_router(state, None);
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    Ok((addr, handle))
}

async fn get_json(addr: SocketAddr, path_and_query: &str) -> Result<Value> {
    reqwest::Client::new()
        .get(format!("http://{addr}{path_and_query}"))
        .send()
        .await
        .context("send request")?
        .json::<Value>()
        .await
        .context("decode json body")
}

fn seed_feeds(folders: &FeedFolders) -> Result<()> {
    folders.write_cross_reference("100\r\n200\r\n", "1\r\n0\r\n")?;
    folders.write_status_export(&[
        "D,S1,100,0,x,JL,日本航空,50,a,b,c,U1,山田",
        "D,S1,100,0,x,JL,日本航空,70,a,b,c,U1,山田",
        "D,S2,200,1,x,NH,全日空,75,a,b,c,U2,佐藤",
    ])
}

#[tokio::test]
async fn integration_feed_cycles_surface_through_http_api() -> Result<()> {
    let folders = FeedFolders::new()?;
    seed_feeds(&folders)?;
    let store = Arc::new(InMemoryEventStore::new());
    let mut pipeline = folders.pipeline(store.clone());
    let mut presenter = Presenter::new(
        MetricsAccumulator::new(store.clone()),
        Arc::new(HealthMonitor::new()),
    );

    let cross_reference = pipeline.run_cross_reference_cycle().await;
    assert_eq!(cross_reference, CycleOutcome::CrossReference);
    assert_eq!(file_count(&folders.root.join("xref")), 0);
    presenter.apply(cross_reference).await?;

    let status = pipeline.run_status_cycle().await;
    let ingested_at_ms = match &status {
        CycleOutcome::StatusFeed { ingested_at_ms, events } => {
            assert_eq!(events.len(), 2);
            *ingested_at_ms
        }
        other => panic!("expected status outcome, got {other:?}"),
    };
    presenter.apply(status).await?;

    assert_eq!(
        std::fs::read_to_string(folders.worklist_path()).context("read worklist")?,
        "200\n"
    );

    let state = Arc::new(GatewayState::new(
        presenter.view(),
        TimelineEngine::new(store.clone()),
    ));
    let (addr, handle) = spawn_gateway(state).await?;

    let listed = get_json(addr, "/api/awb").await?;
    assert_eq!(listed, serde_json::json!({ "ttl": 2, "awbnos": ["100", "200-1"] }));

    let users = get_json(addr, "/api/user").await?;
    assert_eq!(users, serde_json::json!({ "users": ["佐藤", "山田"] }));

    let codes = get_json(addr, "/api/stslist").await?;
    assert_eq!(codes, serde_json::json!({ "statuscodes": ["70", "75"] }));

    let timeline = get_json(
        addr,
        &format!(
            "/api/status?key=100&from={}&to={}",
            ingested_at_ms - 3_600_000,
            ingested_at_ms
        ),
    )
    .await?;
    let buckets = timeline["status"].as_array().context("bucket array")?;
    let real: Vec<&Value> = buckets
        .iter()
        .filter(|bucket| bucket["status_code"] != "NA")
        .collect();
    assert_eq!(real.len(), 1);
    assert_eq!(real[0]["status_code"], "70");
    assert_eq!(real[0]["company_name"], "日本航空");
    assert_eq!(real[0]["igs_status"], "1");
    assert!(buckets
        .iter()
        .enumerate()
        .all(|(position, bucket)| bucket["index"] == position));

    let health = get_json(addr, "/api/deadoralive").await?;
    assert_eq!(health["status"], "Fine");
    assert_eq!(health["laststsupdated"].as_f64().map(|ms| ms >= ingested_at_ms as f64), Some(true));

    handle.abort();
    Ok(())
}

#[tokio::test]
async fn integration_scheduler_feeds_presenter_until_shutdown() -> Result<()> {
    let folders = FeedFolders::new()?;
    seed_feeds(&folders)?;
    let store = Arc::new(InMemoryEventStore::new());
    let presenter = Presenter::new(
        MetricsAccumulator::new(store.clone()),
        Arc::new(HealthMonitor::new()),
    );
    let view = presenter.view();
    let (outcome_tx, outcome_rx) = outcome_channel();
    let mut scheduler = start_ingestion_scheduler(
        IngestionSchedulerConfig {
            status_interval: Duration::from_millis(40),
            cross_reference_interval: Duration::from_millis(15),
            watchdog_interval: Duration::from_secs(60),
            status_start_delay: Duration::from_millis(1),
        },
        folders.pipeline(store.clone()),
        outcome_tx,
    )?;
    let presenter_task = tokio::spawn(presenter.run(outcome_rx));

    let state = Arc::new(GatewayState::new(view, TimelineEngine::new(store.clone())));
    let (addr, handle) = spawn_gateway(state).await?;

    let mut listed = Value::Null;
    for _ in 0..100 {
        listed = get_json(addr, "/api/awb").await?;
        if listed["ttl"] == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(listed["awbnos"], serde_json::json!(["100", "200-1"]));

    scheduler.shutdown().await;
    assert!(!scheduler.is_running());
    tokio::time::timeout(Duration::from_secs(2), presenter_task)
        .await
        .context("presenter did not stop after scheduler shutdown")?
        .context("presenter task panicked")??;

    handle.abort();
    Ok(())
}
