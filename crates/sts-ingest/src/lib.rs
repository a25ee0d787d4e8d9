//! File-based ingestion: lock exchange with the export writer, status export
//! parsing, cross-reference overlay, worklist output and the scheduler that
//! drives them.

use std::path::PathBuf;

use thiserror::Error;

pub mod cross_reference;
pub mod feed_parser;
pub mod lock;
pub mod scheduler;
pub mod worklist;

pub use cross_reference::{
    find_files_with_prefix, ingest_cross_reference_feed, CrossReferenceFeedConfig,
    CrossReferenceReport, CrossReferenceStore,
};
pub use feed_parser::{collapse_consecutive, parse_feed, FeedCycle, FeedParser};
pub use lock::{LockConfig, LockError, LockLease, LockedFileExchange};
pub use scheduler::{
    outcome_channel, start_ingestion_scheduler, CycleOutcome, IngestionPipeline,
    IngestionPipelineConfig, IngestionSchedulerConfig, IngestionSchedulerHandle,
};
pub use worklist::{select_worklist, write_worklist, WorklistConfig};

pub type FeedResult<T> = Result<T, FeedError>;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("failed to access '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed status export: {0}")]
    Csv(#[from] csv::Error),
    #[error("status row at line {line} has {columns} columns")]
    MissingColumn { line: u64, columns: usize },
}
