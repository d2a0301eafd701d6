//! File system utilities for atomic writes and artifact cleanup.
//!
//! Every file TDPM persists (manifest, cached bodies, cache metadata, installed
//! artifacts) goes through [`atomic_write`], so a reader never observes a partially
//! written file and an interrupted process leaves either the old or the new content.
//!
//! # Async Safety
//!
//! The async variants run the blocking work on `spawn_blocking` so slow disks do not
//! starve tokio worker threads while many fetches are in flight.

use sha2::{Digest, Sha256};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Atomically writes bytes to a file using a write-then-rename strategy.
///
/// 1. Creates the parent directory if needed
/// 2. Writes the content to a uniquely named temporary file in the same directory
/// 3. Syncs the temporary file to disk
/// 4. Renames it over the target path
///
/// Using a unique temporary name (rather than a fixed `.tmp` suffix) keeps two writers
/// of the same path from clobbering each other's temporary file; the last rename wins.
///
/// # Examples
///
/// ```rust,no_run
/// use tdpm_cli::utils::fs::atomic_write;
/// use std::path::Path;
///
/// # fn example() -> std::io::Result<()> {
/// atomic_write(Path::new("tdpm.json"), b"{}\n")?;
/// # Ok(())
/// # }
/// ```
pub fn atomic_write(path: &Path, content: &[u8]) -> io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let mut temp = NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Async wrapper around [`atomic_write`].
pub async fn atomic_write_async(path: PathBuf, content: Vec<u8>) -> io::Result<()> {
    tokio::task::spawn_blocking(move || atomic_write(&path, &content))
        .await
        .map_err(|e| io::Error::other(format!("write task failed: {e}")))?
}

/// Removes a file, then every parent directory left empty, stopping at `stop_at`.
///
/// `stop_at` itself is never removed. Returns `Ok(false)` if the file did not exist.
pub fn remove_file_and_empty_parents(path: &Path, stop_at: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    }

    let mut current = path.parent();
    while let Some(dir) = current {
        if dir == stop_at || !dir.starts_with(stop_at) {
            break;
        }
        // remove_dir only succeeds on empty directories
        if fs::remove_dir(dir).is_err() {
            break;
        }
        current = dir.parent();
    }
    Ok(true)
}

/// SHA-256 of `content` formatted as `sha256:<hex>`.
#[must_use]
pub fn content_checksum(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("sha256:{}", hex::encode(hasher.finalize()))
}
