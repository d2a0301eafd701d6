//! Advisory lock guarding manifest transforms.
//!
//! At most one read-transform-write of a project's manifest may be in progress at a
//! time, across processes. The lock is a single non-blocking attempt: a second
//! operation fails immediately with [`TdpmError::ManifestLocked`] instead of waiting.
//!
//! # Async Safety
//!
//! File opening and locking run in `spawn_blocking` so the tokio workers never block
//! on filesystem calls.

use crate::constants::PROJECT_STATE_DIR;
use crate::core::TdpmError;
use fs4::fs_std::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

const LOCKS_DIR: &str = ".locks";
const LOCK_FILE: &str = "manifest.lock";

/// Exclusive lock on a project's manifest.
///
/// Lock files live at `{project_dir}/.tdpm/.locks/manifest.lock`. The OS lock is
/// released when the value is dropped. The file itself stays in place: every holder
/// must lock the same inode, so it is never unlinked.
///
/// # Example
///
/// ```rust,no_run
/// use tdpm_cli::manifest::ManifestLock;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), tdpm_cli::core::TdpmError> {
/// let project = Path::new("/path/to/project");
/// let _lock = ManifestLock::try_acquire(project, &project.join("tdpm.json")).await?;
/// // Read, change and write the manifest...
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ManifestLock {
    /// The file handle; the lock is released when this is dropped
    _file: File,
    lock_path: PathBuf,
}

impl Drop for ManifestLock {
    fn drop(&mut self) {
        debug!(path = %self.lock_path.display(), "Manifest lock released");
    }
}

impl ManifestLock {
    /// Takes the manifest lock of `project_dir` or fails at once.
    ///
    /// `manifest_path` is only used to report which manifest is busy.
    ///
    /// # Errors
    ///
    /// - [`TdpmError::ManifestLocked`] if another operation holds the lock
    /// - [`TdpmError::FileSystem`] if the lock directory or file cannot be created
    pub async fn try_acquire(project_dir: &Path, manifest_path: &Path) -> Result<Self, TdpmError> {
        let locks_dir = project_dir.join(PROJECT_STATE_DIR).join(LOCKS_DIR);
        tokio::fs::create_dir_all(&locks_dir)
            .await
            .map_err(|e| TdpmError::file_system("create lock directory", &locks_dir, e))?;

        let lock_path = locks_dir.join(LOCK_FILE);
        let open_path = lock_path.clone();
        let attempt = tokio::task::spawn_blocking(move || -> std::io::Result<Option<File>> {
            let file = OpenOptions::new().create(true).write(true).truncate(false).open(&open_path)?;
            match file.try_lock_exclusive() {
                Ok(true) => Ok(Some(file)),
                Ok(false) => Ok(None),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(|e| TdpmError::file_system("acquire manifest lock", &lock_path, e))?
        .map_err(|e| TdpmError::file_system("acquire manifest lock", &lock_path, e))?;

        match attempt {
            Some(file) => {
                debug!(path = %lock_path.display(), "Manifest lock acquired");
                Ok(Self {
                    _file: file,
                    lock_path,
                })
            }
            None => {
                debug!(path = %lock_path.display(), "Manifest lock is held elsewhere");
                Err(TdpmError::ManifestLocked {
                    path: manifest_path.to_path_buf(),
                })
            }
        }
    }
}
