//! Cross-reference feed: identifiers and outcome codes delivered as two
//! companion file sets, paired by line position.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::{FeedError, FeedResult};

/// Identifier to cross-reference status. Entries are only ever inserted or
/// overwritten, never removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrossReferenceStore {
    entries: HashMap<String, String>,
}

impl CrossReferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, identifier: &str) -> Option<&str> {
        self.entries.get(identifier).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pairs `identifiers[i]` with `outcomes[i]`. Excess entries on either
    /// side are dropped. Returns the number of pairs applied.
    pub fn apply_pairs(&mut self, identifiers: &[String], outcomes: &[String]) -> usize {
        let mut applied = 0;
        for (identifier, outcome) in identifiers.iter().zip(outcomes) {
            self.entries.insert(identifier.clone(), outcome.clone());
            applied += 1;
        }
        applied
    }
}

/// Where the cross-reference files live and how they are named.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrossReferenceFeedConfig {
    pub folder: PathBuf,
    pub identifiers_prefix: String,
    pub outcomes_prefix: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrossReferenceReport {
    pub identifier_files: usize,
    pub outcome_files: usize,
    pub identifiers: usize,
    pub outcomes: usize,
    pub applied: usize,
}

impl CrossReferenceReport {
    /// True when a file set was missing and nothing was consumed.
    pub fn is_idle(&self) -> bool {
        self.identifier_files == 0 || self.outcome_files == 0
    }
}

/// Consumes one round of cross-reference files into `store`.
///
/// Missing identifier or outcome files make the round a no-op that leaves
/// every file in place. Otherwise both file sets are paired and deleted.
pub fn ingest_cross_reference_feed(
    config: &CrossReferenceFeedConfig,
    store: &mut CrossReferenceStore,
) -> FeedResult<CrossReferenceReport> {
    let identifier_files = find_files_with_prefix(&config.folder, &config.identifiers_prefix)?;
    if identifier_files.is_empty() {
        tracing::debug!(folder = %config.folder.display(), "no cross-reference identifier files");
        return Ok(CrossReferenceReport::default());
    }
    let outcome_files = find_files_with_prefix(&config.folder, &config.outcomes_prefix)?;
    if outcome_files.is_empty() {
        tracing::debug!(folder = %config.folder.display(), "no cross-reference outcome files");
        return Ok(CrossReferenceReport {
            identifier_files: identifier_files.len(),
            ..CrossReferenceReport::default()
        });
    }

    let identifiers = read_feed_lines(&identifier_files)?;
    let outcomes = read_feed_lines(&outcome_files)?;
    if identifiers.len() != outcomes.len() {
        tracing::warn!(
            identifiers = identifiers.len(),
            outcomes = outcomes.len(),
            "cross-reference files differ in length; excess lines dropped"
        );
    }
    let applied = store.apply_pairs(&identifiers, &outcomes);

    for path in identifier_files.iter().chain(outcome_files.iter()) {
        std::fs::remove_file(path).map_err(|source| FeedError::Io {
            path: path.clone(),
            source,
        })?;
    }

    Ok(CrossReferenceReport {
        identifier_files: identifier_files.len(),
        outcome_files: outcome_files.len(),
        identifiers: identifiers.len(),
        outcomes: outcomes.len(),
        applied,
    })
}

/// Files below `root`, at any depth, whose file name starts with `prefix`.
/// Sorted by path.
pub fn find_files_with_prefix(root: &Path, prefix: &str) -> FeedResult<Vec<PathBuf>> {
    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let entries = std::fs::read_dir(&dir).map_err(|source| FeedError::Io {
            path: dir.clone(),
            source,
        })?;
        for entry in entries {
            let entry = entry.map_err(|source| FeedError::Io {
                path: dir.clone(),
                source,
            })?;
            let path = entry.path();
            if path.is_dir() {
                pending.push(path);
            } else if entry.file_name().to_string_lossy().starts_with(prefix) {
                found.push(path);
            }
        }
    }
    found.sort();
    Ok(found)
}

/// Trimmed, non-empty lines of every file, in file order.
pub fn read_feed_lines(paths: &[PathBuf]) -> FeedResult<Vec<String>> {
    let mut lines = Vec::new();
    for path in paths {
        let text = std::fs::read_to_string(path).map_err(|source| FeedError::Io {
            path: path.clone(),
            source,
        })?;
        lines.extend(
            text.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string),
        );
    }
    Ok(lines)
}
