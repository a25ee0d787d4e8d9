//! Worklist of shipments waiting at status `75` without a cross-reference
//! match, rewritten after every status cycle.

use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::{Context, Result};
use sts_core::write_text_atomic;
use sts_types::{StatusEvent, CROSS_REFERENCE_NO_MATCH, CROSS_REFERENCE_UNCHECKED, ROOT_BRANCH_SEQ};

use crate::lock::{LockConfig, LockedFileExchange};

pub const WORKLIST_STATUS: &str = "75";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorklistConfig {
    pub output_path: PathBuf,
    pub lock: LockConfig,
}

/// Bare identifiers at [`WORKLIST_STATUS`] whose cross-reference status is
/// "no match" or unknown. Sorted and deduplicated.
pub fn select_worklist(events: &[StatusEvent]) -> Vec<String> {
    events
        .iter()
        .filter(|event| event.status_code == WORKLIST_STATUS)
        .filter(|event| {
            event.cross_ref_status == CROSS_REFERENCE_NO_MATCH
                || event.cross_ref_status == CROSS_REFERENCE_UNCHECKED
                || event.cross_ref_status.is_empty()
        })
        .map(|event| bare_identifier(event).to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn bare_identifier(event: &StatusEvent) -> &str {
    if event.branch_seq.is_empty() || event.branch_seq == ROOT_BRANCH_SEQ {
        return &event.identifier;
    }
    event
        .identifier
        .strip_suffix(event.branch_seq.as_str())
        .and_then(|rest| rest.strip_suffix('-'))
        .unwrap_or(&event.identifier)
}

/// Replaces the worklist file while holding its lock.
pub async fn write_worklist(config: &WorklistConfig, identifiers: &[String]) -> Result<()> {
    let lease = LockedFileExchange::new(config.lock.clone())
        .acquire()
        .await
        .context("failed to lock worklist")?;
    let mut content = identifiers.join("\n");
    if !content.is_empty() {
        content.push('\n');
    }
    write_text_atomic(&config.output_path, &content)
        .with_context(|| format!("failed to write worklist {}", config.output_path.display()))?;
    lease.release().context("failed to release worklist lock")?;
    tracing::info!(entries = identifiers.len(), path = %config.output_path.display(), "worklist written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    fn event(identifier: &str, branch_seq: &str, status: &str, cross_ref: &str) -> StatusEvent {
        StatusEvent {
            identifier: identifier.to_string(),
            branch_seq: branch_seq.to_string(),
            status_code: status.to_string(),
            cross_ref_status: cross_ref.to_string(),
            ..StatusEvent::default()
        }
    }

    #[test]
    fn unit_select_worklist_filters_status_and_cross_reference() {
        let events = vec![
            event("300", "0", "75", "-1"),
            event("100", "0", "75", "0"),
            event("100-2", "2", "75", "0"),
            event("200", "0", "75", "1"),
            event("400", "0", "70", "0"),
        ];
        assert_eq!(select_worklist(&events), vec!["100", "300"]);
    }

    #[tokio::test]
    async fn functional_write_worklist_replaces_file_under_lock() {
        let temp = tempdir().expect("tempdir");
        std::fs::write(temp.path().join("list.lnk"), "").expect("lock target");
        let output_path = temp.path().join("out").join("worklist.txt");
        let config = WorklistConfig {
            output_path: output_path.clone(),
            lock: LockConfig::in_folder(temp.path(), "list.lnk", "list.lock")
                .with_retry_interval(Duration::from_millis(1)),
        };

        write_worklist(&config, &["100".to_string(), "300".to_string()])
            .await
            .expect("first write");
        write_worklist(&config, &["300".to_string()])
            .await
            .expect("second write");

        assert_eq!(std::fs::read_to_string(&output_path).expect("read"), "300\n");
        assert!(!temp.path().join("list.lock").exists());
    }
}
