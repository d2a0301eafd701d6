//! Command-line interface for TDPM.
//!
//! # Available Commands
//!
//! - `install [NAME[@REF]...]` - add declarations and install everything declared
//! - `uninstall NAME...` - remove declarations and prune what they pulled in
//! - `cache info|clean` - inspect or empty the content cache
//!
//! # Global Options
//!
//! - `--verbose` / `-v` - debug logging
//! - `--quiet` / `-q` - errors only, no summaries
//! - `--config <PATH>` - configuration file (default `~/.tdpm/config.toml`)
//! - `--cwd` / `-C <DIR>` - run as if started in `DIR`
//! - `--no-progress` - disable spinners
//!
//! ```bash
//! tdpm install node@18.0.0 --save-ambient
//! tdpm install                 # re-sync with tdpm.json
//! tdpm uninstall node
//! tdpm -v cache info
//! ```
//!
//! Commands return [`anyhow::Result`]; `main` renders failures through
//! [`user_friendly_error`](crate::core::user_friendly_error). A Ctrl-C during a command
//! surfaces as [`Interrupted`].

pub mod cache;
pub mod common;
pub mod install;
pub mod uninstall;

pub use common::{CommandContext, Interrupted};

use crate::config::GlobalConfig;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Runtime settings derived from the global flags.
///
/// Separated from [`Cli`] so tests can run commands with explicit settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliConfig {
    /// Log filter directive used when `RUST_LOG` is unset
    pub log_level: Option<String>,
    /// Disable spinners
    pub no_progress: bool,
    /// Suppress summaries
    pub quiet: bool,
}

impl CliConfig {
    /// Default settings: warnings only, progress enabled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the global tracing subscriber.
    ///
    /// `RUST_LOG` takes precedence over [`log_level`](Self::log_level); the default is
    /// `warn`. Logs go to stderr so command output stays clean.
    pub fn init_logging(&self) {
        let filter = match std::env::var("RUST_LOG") {
            Ok(directives) if !directives.is_empty() => EnvFilter::new(directives),
            _ => EnvFilter::new(self.log_level.as_deref().unwrap_or("warn")),
        };
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init();
    }
}

/// TDPM - dependency manager for versioned definition files.
#[derive(Parser, Debug)]
#[command(
    name = "tdpm",
    about = "Install and manage versioned definition files",
    version,
    long_about = "TDPM resolves the dependencies declared in tdpm.json, fetches their definition files from a registry and keeps them under the project's typings directory."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only print errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to the configuration file
    #[arg(long, global = true, value_name = "PATH", env = "TDPM_CONFIG")]
    config: Option<PathBuf>,

    /// Run as if started in this directory
    #[arg(short = 'C', long = "cwd", global = true, value_name = "DIR")]
    cwd: Option<PathBuf>,

    /// Disable progress spinners
    #[arg(long, global = true)]
    no_progress: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Add declarations to tdpm.json and install all declared artifacts.
    Install(install::InstallCommand),

    /// Remove declarations from tdpm.json and prune their artifacts.
    #[command(alias = "remove", alias = "rm")]
    Uninstall(uninstall::UninstallCommand),

    /// Inspect or clean the content cache.
    Cache(cache::CacheCommand),
}

impl Cli {
    /// Builds the runtime settings from the global flags.
    #[must_use]
    pub fn build_config(&self) -> CliConfig {
        let log_level = if self.verbose {
            Some("debug".to_string())
        } else if self.quiet {
            Some("error".to_string())
        } else {
            None
        };
        CliConfig {
            log_level,
            no_progress: self.no_progress || self.quiet,
            quiet: self.quiet,
        }
    }

    /// Runs the selected command with settings from the flags.
    pub async fn execute(self) -> Result<()> {
        let config = self.build_config();
        config.init_logging();
        self.execute_with_config(config).await
    }

    /// Runs the selected command with explicit settings.
    pub async fn execute_with_config(self, config: CliConfig) -> Result<()> {
        let cwd = match self.cwd {
            Some(dir) => dir,
            None => std::env::current_dir().context("Cannot determine current directory")?,
        };
        let global = GlobalConfig::load(self.config).await?;
        let context = CommandContext {
            cwd,
            config: global,
            show_progress: !config.no_progress,
            quiet: config.quiet,
        };

        match self.command {
            Commands::Install(cmd) => cmd.execute(&context).await,
            Commands::Uninstall(cmd) => cmd.execute(&context).await,
            Commands::Cache(cmd) => cmd.execute(&context).await,
        }
    }
}
