//! Pieces shared by the command implementations.

use crate::cache::ContentStore;
use crate::config::GlobalConfig;
use crate::fetch::RemoteFetcher;
use crate::installer::Installer;
use crate::manifest::SaveKind;
use crate::source::RegistrySource;
use crate::utils::progress::Spinner;
use anyhow::{Context, Result};
use clap::Args;
use std::future::Future;
use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;

/// Everything a command needs besides its own arguments.
#[derive(Debug, Clone)]
pub struct CommandContext {
    /// Directory the command runs in
    pub cwd: PathBuf,
    /// Loaded global configuration
    pub config: GlobalConfig,
    /// Whether spinners may be drawn
    pub show_progress: bool,
    /// Whether summaries are suppressed
    pub quiet: bool,
}

impl CommandContext {
    /// The content store configured for this run.
    pub fn content_store(&self) -> Result<ContentStore> {
        Ok(ContentStore::new(self.config.cache_root()?))
    }

    /// An installer talking to the configured registry.
    pub fn installer(&self) -> Result<Installer<RegistrySource>> {
        let store = self.content_store()?;
        debug!(registry = %self.config.registry, cache = %store.root().display(), "Creating installer");
        let fetcher = RemoteFetcher::with_settings(store, &self.config.fetch_settings())
            .context("Failed to create HTTP client")?;
        let source = RegistrySource::new(self.config.registry.clone(), fetcher);
        Ok(Installer::new(source, self.config.installer_config()))
    }

    /// Starts a spinner, hidden when progress is off.
    pub fn spinner(&self, message: &str) -> Spinner {
        Spinner::new(message, self.show_progress)
    }
}

/// The operation was cancelled with Ctrl-C.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("Interrupted")]
pub struct Interrupted;

/// Runs `operation` until it completes or Ctrl-C is pressed.
///
/// On Ctrl-C the operation's future is dropped, which cancels in-flight requests and
/// leaves the manifest as it was.
pub async fn run_cancellable<F, T, E>(operation: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, E>>,
    E: Into<anyhow::Error>,
{
    tokio::select! {
        result = operation => result.map_err(Into::into),
        _ = tokio::signal::ctrl_c() => Err(Interrupted.into()),
    }
}

/// `--save` / `--save-dev` / `--save-ambient`.
#[derive(Args, Debug, Clone, Copy, Default)]
#[group(multiple = false)]
pub struct SaveKindArgs {
    /// Runtime dependency
    #[arg(short = 'S', long = "save")]
    save: bool,

    /// Development dependency
    #[arg(short = 'D', long = "save-dev")]
    save_dev: bool,

    /// Ambient (global) dependency
    #[arg(short = 'A', long = "save-ambient")]
    save_ambient: bool,
}

impl SaveKindArgs {
    /// The selected kind, if any flag was given.
    #[must_use]
    pub const fn kind(&self) -> Option<SaveKind> {
        if self.save {
            Some(SaveKind::Runtime)
        } else if self.save_dev {
            Some(SaveKind::Dev)
        } else if self.save_ambient {
            Some(SaveKind::Ambient)
        } else {
            None
        }
    }
}
