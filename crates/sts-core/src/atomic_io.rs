use std::io::Write;
use std::path::Path;

use anyhow::{bail, Context, Result};
use tempfile::NamedTempFile;

/// Replaces `path` with `content` in one rename.
///
/// The text is staged in a hidden sibling file and synced before it is
/// persisted over the target, so pollers of the worklist see either the old
/// list or the new one. The staging file is removed when any step fails.
pub fn write_text_atomic(path: &Path, content: &str) -> Result<()> {
    let Some(file_name) = path.file_name() else {
        bail!("worklist destination '{}' names no file", path.display());
    };
    if path.is_dir() {
        bail!("worklist destination '{}' is a directory", path.display());
    }
    let folder = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(folder)
        .with_context(|| format!("creating worklist folder {}", folder.display()))?;

    let mut staged = tempfile::Builder::new()
        .prefix(&format!(".{}.", file_name.to_string_lossy()))
        .suffix(".partial")
        .tempfile_in(folder)
        .with_context(|| format!("staging worklist next to {}", path.display()))?;
    write_and_sync(&mut staged, content)
        .with_context(|| format!("writing staged worklist {}", staged.path().display()))?;
    staged
        .persist(path)
        .map_err(|error| error.error)
        .with_context(|| format!("replacing worklist {}", path.display()))?;
    Ok(())
}

fn write_and_sync(staged: &mut NamedTempFile, content: &str) -> std::io::Result<()> {
    staged.write_all(content.as_bytes())?;
    staged.as_file().sync_all()
}
