//! Installing and uninstalling artifacts in a project.
//!
//! The [`Installer`] runs one logical operation per call, entirely inside a
//! [`ManifestStore`] transform, so the manifest lock is held from the first read to the
//! final write:
//!
//! 1. **Locate**: find the project root above the working directory (or bootstrap a new
//!    manifest there when installing something into no project)
//! 2. **Merge**: apply the new declarations (or remove the uninstalled ones)
//! 3. **Resolve**: build the dependency graph from all declarations
//! 4. **Fetch**: download content for every artifact not already present; all content
//!    is fetched before any file is written
//! 5. **Write**: store artifacts atomically under the artifact directory
//! 6. **Prune**: delete files of artifacts that are no longer resolved, and the empty
//!    directories they leave behind
//! 7. **Record**: rewrite the manifest's `resolved` section
//!
//! An artifact is *already present* when the previous manifest resolved it to the same
//! ref, url and path and the file still exists; its content is not fetched again.
//!
//! Any failure before step 7 leaves the manifest untouched. Dropping the returned
//! future cancels in-flight requests with the same guarantee.

use crate::constants::{DEFAULT_ARTIFACT_DIR, default_parallelism};
use crate::core::{ResolutionError, TdpmError};
use crate::manifest::{
    Declaration, Manifest, ManifestStore, ResolvedReference, SaveKind, find_project_root,
    manifest_path, require_project_root,
};
use crate::resolver::{DependencyGraph, Resolver, ResolverOptions};
use crate::source::ArtifactSource;
use crate::utils::fs::{atomic_write_async, content_checksum, remove_file_and_empty_parents};
use futures::{StreamExt, TryStreamExt, stream};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

/// Installer settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallerConfig {
    /// Project-relative directory artifacts are installed under
    pub artifact_dir: String,
    /// Maximum concurrent header or content fetches
    pub max_parallel: usize,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            artifact_dir: DEFAULT_ARTIFACT_DIR.to_string(),
            max_parallel: default_parallelism(),
        }
    }
}

/// Outcome of [`Installer::install`].
#[derive(Debug, Clone)]
pub struct InstallResult {
    /// Directory holding the manifest
    pub project_root: PathBuf,
    /// The resolved graph, checksums included
    pub graph: DependencyGraph,
    /// Artifacts whose content was fetched and written
    pub installed: Vec<ResolvedReference>,
    /// Artifacts that were already installed at the resolved ref
    pub already_present: Vec<ResolvedReference>,
    /// Previously resolved artifacts that are no longer part of the graph
    pub removed: Vec<ResolvedReference>,
}

/// Options for [`Installer::uninstall`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UninstallOptions {
    /// Only remove declarations of this kind; `None` removes every kind
    pub kind: Option<SaveKind>,
}

/// Outcome of [`Installer::uninstall`].
#[derive(Debug, Clone)]
pub struct UninstallResult {
    /// Directory holding the manifest
    pub project_root: PathBuf,
    /// Declarations taken out of the manifest
    pub removed_declarations: Vec<Declaration>,
    /// Requested names that were not declared (with the requested kind)
    pub not_declared: Vec<String>,
    /// Artifact files deleted from the project
    pub removed_files: Vec<PathBuf>,
    /// The re-resolved graph; `None` when nothing was removed
    pub graph: Option<DependencyGraph>,
}

/// Result of bringing the artifact directory in line with a set of declarations.
#[derive(Debug)]
struct Synchronized {
    graph: DependencyGraph,
    installed: Vec<ResolvedReference>,
    already_present: Vec<ResolvedReference>,
    removed: Vec<ResolvedReference>,
    removed_files: Vec<PathBuf>,
}

/// Installs and uninstalls artifacts from an [`ArtifactSource`].
///
/// # Examples
///
/// ```rust,no_run
/// use tdpm_cli::installer::{Installer, InstallerConfig};
/// use tdpm_cli::manifest::{Declaration, SaveKind};
/// use tdpm_cli::source::ArtifactSource;
/// use std::path::Path;
///
/// # async fn example(source: impl ArtifactSource) -> anyhow::Result<()> {
/// let installer = Installer::new(source, InstallerConfig::default());
/// let result = installer
///     .install(Path::new("."), vec![Declaration::parse("a@1.0", SaveKind::Runtime)?])
///     .await?;
/// println!("{} installed", result.installed.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Installer<S> {
    source: S,
    store: ManifestStore,
    config: InstallerConfig,
}

impl<S: ArtifactSource> Installer<S> {
    /// Creates an installer.
    pub const fn new(source: S, config: InstallerConfig) -> Self {
        Self {
            source,
            store: ManifestStore::new(),
            config,
        }
    }

    /// The artifact source.
    pub const fn source(&self) -> &S {
        &self.source
    }

    /// Adds `declarations` to the project above `cwd` and installs everything declared.
    ///
    /// With no declarations this re-synchronizes the project with its manifest.
    ///
    /// # Errors
    ///
    /// - [`TdpmError::InvalidDeclaration`] for a bad name, before any I/O
    /// - [`TdpmError::ProjectNotFound`] if there is no project and nothing to add
    /// - [`TdpmError::ManifestLocked`] if another operation is running on the project
    /// - [`TdpmError::Resolution`] if a header or content fetch fails
    /// - [`TdpmError::FileSystem`] if an artifact cannot be written
    pub async fn install(
        &self,
        cwd: &Path,
        declarations: Vec<Declaration>,
    ) -> Result<InstallResult, TdpmError> {
        for declaration in &declarations {
            declaration.validate()?;
        }

        let (project_root, bootstrap) = match find_project_root(cwd) {
            Some(root) => (root, false),
            None if declarations.is_empty() => {
                return Err(TdpmError::ProjectNotFound {
                    cwd: cwd.to_path_buf(),
                });
            }
            None => (cwd.to_path_buf(), true),
        };
        let path = manifest_path(&project_root);
        info!(project = %project_root.display(), bootstrap, added = declarations.len(), "Installing");

        let root = project_root.as_path();
        let change = move |mut manifest: Manifest| async move {
            for declaration in declarations {
                manifest.upsert_declaration(declaration);
            }
            let synced = self.synchronize(root, &mut manifest).await?;
            Ok::<_, TdpmError>((manifest, synced))
        };
        let synced = if bootstrap {
            self.store.transform_or_create(&path, change).await?
        } else {
            self.store.transform(&path, change).await?
        };

        info!(
            installed = synced.installed.len(),
            already_present = synced.already_present.len(),
            removed = synced.removed.len(),
            "Install complete"
        );
        Ok(InstallResult {
            project_root,
            graph: synced.graph,
            installed: synced.installed,
            already_present: synced.already_present,
            removed: synced.removed,
        })
    }

    /// Removes the declarations named in `names` and prunes what they pulled in.
    ///
    /// Names that are not declared are reported in
    /// [`UninstallResult::not_declared`]. When nothing matches, the manifest is written
    /// back unchanged and no request is made.
    pub async fn uninstall(
        &self,
        cwd: &Path,
        names: &[String],
        options: UninstallOptions,
    ) -> Result<UninstallResult, TdpmError> {
        let project_root = require_project_root(cwd)?;
        let path = manifest_path(&project_root);
        let root = project_root.as_path();

        let (removed_declarations, not_declared, synced) = self
            .store
            .transform(&path, move |mut manifest: Manifest| async move {
                let (removed, not_declared) = manifest.remove_declarations(names, options.kind);
                for name in &not_declared {
                    warn!(%name, "Not a declared dependency, ignoring");
                }
                if removed.is_empty() {
                    return Ok::<_, TdpmError>((manifest, (removed, not_declared, None)));
                }
                let synced = self.synchronize(root, &mut manifest).await?;
                Ok((manifest, (removed, not_declared, Some(synced))))
            })
            .await?;

        info!(removed = removed_declarations.len(), ignored = not_declared.len(), "Uninstall complete");
        let (removed_files, graph) = match synced {
            Some(synced) => (synced.removed_files, Some(synced.graph)),
            None => (Vec::new(), None),
        };
        Ok(UninstallResult {
            project_root,
            removed_declarations,
            not_declared,
            removed_files,
            graph,
        })
    }

    /// Resolves `manifest`'s declarations, updates the artifact directory and replaces
    /// `manifest.resolved`.
    async fn synchronize(
        &self,
        project_root: &Path,
        manifest: &mut Manifest,
    ) -> Result<Synchronized, TdpmError> {
        let resolver = Resolver::new(
            &self.source,
            ResolverOptions {
                max_parallel: self.config.max_parallel,
                artifact_dir: self.config.artifact_dir.clone(),
            },
        );
        let mut graph = resolver.resolve(&manifest.declarations).await?;
        let previous = std::mem::take(&mut manifest.resolved);

        let mut already_present = Vec::new();
        let mut pending = Vec::new();
        for reference in graph.references() {
            let target = project_file(project_root, &reference.path)?;
            let on_disk = tokio::fs::try_exists(&target).await.unwrap_or(false);
            match previous.get(&reference.name) {
                Some(prior)
                    if on_disk
                        && prior.resolved_ref == reference.resolved_ref
                        && prior.url == reference.url
                        && prior.path == reference.path =>
                {
                    debug!(name = %reference.name, "Already present");
                    already_present.push(ResolvedReference {
                        checksum: prior.checksum.clone(),
                        ..reference.clone()
                    });
                }
                _ => pending.push((reference.clone(), target)),
            }
        }

        // Fetch everything before touching the artifact directory.
        let source = &self.source;
        let graph_ref = &graph;
        let fetches = pending.iter().map(|(reference, _)| async move {
            source.content(reference).await.map_err(|cause| {
                let path = graph_ref
                    .dependency_path(&reference.name)
                    .unwrap_or_else(|| vec![reference.name.clone()]);
                TdpmError::from(ResolutionError::new(path, cause))
            })
        });
        let contents: Vec<Vec<u8>> = stream::iter(fetches)
            .buffered(self.config.max_parallel.max(1))
            .try_collect()
            .await?;

        let mut installed = Vec::with_capacity(pending.len());
        for ((reference, target), bytes) in pending.into_iter().zip(contents) {
            let checksum = content_checksum(&bytes);
            atomic_write_async(target.clone(), bytes)
                .await
                .map_err(|e| TdpmError::file_system("write artifact", &target, e))?;
            debug!(name = %reference.name, path = %target.display(), "Installed");
            installed.push(ResolvedReference {
                checksum: Some(checksum),
                ..reference
            });
        }

        let artifact_root = project_root.join(&self.config.artifact_dir);
        let mut removed = Vec::new();
        let mut removed_files = Vec::new();
        for prior in previous.values() {
            let current = graph.get(&prior.name);
            if current.is_some_and(|r| r.path == prior.path) {
                continue;
            }
            if current.is_none() {
                removed.push(prior.clone());
            }
            let Ok(file) = project_file(project_root, &prior.path) else {
                warn!(name = %prior.name, path = %prior.path, "Skipping removal of path outside the project");
                continue;
            };
            let deleted = remove_file_and_empty_parents(&file, &artifact_root)
                .map_err(|e| TdpmError::file_system("remove artifact", &file, e))?;
            if deleted {
                debug!(name = %prior.name, path = %file.display(), "Removed orphaned artifact");
                removed_files.push(file);
            }
        }

        let mut resolved = BTreeMap::new();
        for reference in installed.iter().chain(&already_present) {
            graph.insert_reference(reference.clone());
            resolved.insert(reference.name.clone(), reference.clone());
        }
        manifest.resolved = resolved;

        Ok(Synchronized {
            graph,
            installed,
            already_present,
            removed,
            removed_files,
        })
    }
}

/// Joins a `/`-separated project-relative path onto `project_root`.
///
/// Rejects absolute paths and `..` so recorded paths cannot point outside the project.
fn project_file(project_root: &Path, relative: &str) -> Result<PathBuf, TdpmError> {
    let mut path = project_root.to_path_buf();
    for part in relative.split('/') {
        match Path::new(part).components().next() {
            Some(Component::Normal(_)) if !part.contains('\\') => path.push(part),
            _ => {
                return Err(TdpmError::FileSystem {
                    operation: "resolve artifact path".to_string(),
                    path: relative.to_string(),
                    reason: "path must stay inside the project".to_string(),
                });
            }
        }
    }
    Ok(path)
}
