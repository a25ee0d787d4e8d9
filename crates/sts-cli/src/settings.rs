//! The `key=value` settings file naming feed folders, lock files and
//! retention.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use sts_ingest::{CrossReferenceFeedConfig, IngestionPipelineConfig, LockConfig, WorklistConfig};
use sts_store::DEFAULT_RETENTION_DAYS;
use thiserror::Error;

const REQUIRED_KEYS: [&str; 10] = [
    "LockFolderPath",
    "STSFilePath",
    "IGSFolderPath",
    "STSLinkFileName",
    "STSLockFileName",
    "IGSLinkFileName",
    "IGSLockFileName",
    "IGSFileName",
    "IGSBLNOFilename",
    "DeleteIndiciesfrom",
];

const WORKLIST_KEYS: [&str; 3] = ["STS75FilePath", "75ListLinkFileName", "75ListLockFileName"];

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file '{}': {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("settings key '{key}' is missing or empty")]
    MissingKey { key: &'static str },
    #[error("worklist settings must set all of {keys:?} or none of them")]
    PartialWorklist { keys: [&'static str; 3] },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorklistSettings {
    pub output_path: PathBuf,
    pub link_file_name: String,
    pub lock_file_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    pub lock_folder: PathBuf,
    pub status_export_path: PathBuf,
    pub cross_reference_folder: PathBuf,
    pub status_link_file_name: String,
    pub status_lock_file_name: String,
    pub cross_reference_link_file_name: String,
    pub cross_reference_lock_file_name: String,
    pub outcomes_prefix: String,
    pub identifiers_prefix: String,
    pub retention_days: u32,
    pub worklist: Option<WorklistSettings>,
}

impl ServerSettings {
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let raw = std::fs::read_to_string(path).map_err(|source| SettingsError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self, SettingsError> {
        let values = parse_key_values(raw);
        for key in REQUIRED_KEYS {
            if !values.contains_key(key) {
                return Err(SettingsError::MissingKey { key });
            }
        }
        let value = |key: &str| values.get(key).cloned().unwrap_or_default();

        let retention_days = match value("DeleteIndiciesfrom").parse::<u32>() {
            Ok(days) if days > 0 => days,
            _ => {
                tracing::warn!(
                    value = %value("DeleteIndiciesfrom"),
                    fallback = DEFAULT_RETENTION_DAYS,
                    "invalid index retention; using fallback"
                );
                DEFAULT_RETENTION_DAYS
            }
        };

        let present = WORKLIST_KEYS
            .iter()
            .filter(|key| values.contains_key(**key))
            .count();
        let worklist = match present {
            0 => None,
            3 => Some(WorklistSettings {
                output_path: PathBuf::from(value("STS75FilePath")),
                link_file_name: value("75ListLinkFileName"),
                lock_file_name: value("75ListLockFileName"),
            }),
            _ => return Err(SettingsError::PartialWorklist { keys: WORKLIST_KEYS }),
        };

        Ok(Self {
            lock_folder: PathBuf::from(value("LockFolderPath")),
            status_export_path: PathBuf::from(value("STSFilePath")),
            cross_reference_folder: PathBuf::from(value("IGSFolderPath")),
            status_link_file_name: value("STSLinkFileName"),
            status_lock_file_name: value("STSLockFileName"),
            cross_reference_link_file_name: value("IGSLinkFileName"),
            cross_reference_lock_file_name: value("IGSLockFileName"),
            outcomes_prefix: value("IGSFileName"),
            identifiers_prefix: value("IGSBLNOFilename"),
            retention_days,
            worklist,
        })
    }

    /// Lock files live in the lock folder next to the hard links they
    /// guard.
    pub fn pipeline_config(&self) -> IngestionPipelineConfig {
        let lock_folder = self.lock_folder.as_path();
        IngestionPipelineConfig {
            status_export_path: self.status_export_path.clone(),
            status_lock: LockConfig::in_folder(
                lock_folder,
                &self.status_link_file_name,
                &self.status_lock_file_name,
            ),
            cross_reference: CrossReferenceFeedConfig {
                folder: self.cross_reference_folder.clone(),
                identifiers_prefix: self.identifiers_prefix.clone(),
                outcomes_prefix: self.outcomes_prefix.clone(),
            },
            cross_reference_lock: LockConfig::in_folder(
                lock_folder,
                &self.cross_reference_link_file_name,
                &self.cross_reference_lock_file_name,
            ),
            worklist: self.worklist.as_ref().map(|worklist| WorklistConfig {
                output_path: worklist.output_path.clone(),
                lock: LockConfig::in_folder(
                    lock_folder,
                    &worklist.link_file_name,
                    &worklist.lock_file_name,
                ),
            }),
        }
    }
}

/// Lines without `=` are skipped; keys and values are trimmed and empty
/// values count as absent.
fn parse_key_values(raw: &str) -> HashMap<String, String> {
    raw.lines()
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim(), value.trim()))
        .filter(|(key, value)| !key.is_empty() && !value.is_empty())
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}
