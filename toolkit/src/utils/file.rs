//! File utility functions

use std::io;
use std::path::{Path, PathBuf};

/// Resolve a config or CLI path: `~` expands to the home directory and
/// relative paths are anchored at the working directory
pub fn expand_path(path: &str) -> PathBuf {
    let path = path.trim();
    let expanded = match (path, path.strip_prefix("~/"), dirs::home_dir()) {
        ("~", _, Some(home)) => home,
        (_, Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    };
    if expanded.is_absolute() {
        return expanded;
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(&expanded))
        .unwrap_or(expanded)
}

/// Create the parent directory of `path` if it does not exist
pub async fn ensure_parent_dir(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => tokio::fs::create_dir_all(parent).await,
        _ => Ok(()),
    }
}

/// Write `contents` to a sibling temp file and rename it over `path`
///
/// Readers polling the file (rule watcher, a second run) never observe a
/// half-written artifact.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    ensure_parent_dir(path).await?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));
    tokio::fs::write(&tmp, contents).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e);
    }
    Ok(())
}
