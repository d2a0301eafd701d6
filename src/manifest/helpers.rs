//! Project discovery.
//!
//! A project is the nearest directory, walking upward from the working directory, that
//! contains a `tdpm.json`. Mirrors Cargo, Git and npm project file discovery.
//!
//! ```text
//! /home/user/project/
//! ├── tdpm.json          ← found here
//! └── src/
//!     └── deep/           ← search started here, walks up
//! ```

use crate::constants::MANIFEST_FILE;
use crate::core::TdpmError;
use std::path::{Path, PathBuf};

/// Returns the first ancestor of `cwd` (inclusive) that contains a manifest.
///
/// "No project" is an expected outcome, so it is `None` rather than an error.
#[must_use]
pub fn find_project_root(cwd: &Path) -> Option<PathBuf> {
    cwd.ancestors().find(|dir| manifest_path(dir).is_file()).map(Path::to_path_buf)
}

/// Like [`find_project_root`], failing with [`TdpmError::ProjectNotFound`].
pub fn require_project_root(cwd: &Path) -> Result<PathBuf, TdpmError> {
    find_project_root(cwd).ok_or_else(|| TdpmError::ProjectNotFound {
        cwd: cwd.to_path_buf(),
    })
}

/// Path of the manifest inside `project_root`.
#[must_use]
pub fn manifest_path(project_root: &Path) -> PathBuf {
    project_root.join(MANIFEST_FILE)
}
