//! `tdpm cache`
//!
//! ```bash
//! tdpm cache info     # location, entry count and size
//! tdpm cache clean    # delete every cached response
//! ```

use super::common::CommandContext;
use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;

/// Arguments of `tdpm cache`.
#[derive(Args, Debug)]
pub struct CacheCommand {
    #[command(subcommand)]
    command: CacheSubcommand,
}

#[derive(Subcommand, Debug)]
enum CacheSubcommand {
    /// Show cache location and size
    Info,
    /// Remove all cached content
    Clean,
}

impl CacheCommand {
    /// Runs the command.
    pub async fn execute(self, context: &CommandContext) -> Result<()> {
        let store = context.content_store()?;
        match self.command {
            CacheSubcommand::Info => {
                let stats = store.stats().await.context("Failed to read cache")?;
                println!("{} {}", "Cache:".bold(), store.root().display());
                println!("  {} entries, {}", stats.entries, format_size(stats.bytes));
            }
            CacheSubcommand::Clean => {
                store
                    .clear()
                    .await
                    .with_context(|| format!("Failed to clean cache at {}", store.root().display()))?;
                if !context.quiet {
                    println!("{} Cleaned {}", "✓".green(), store.root().display());
                }
            }
        }
        Ok(())
    }
}

fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 { format!("{bytes} B") } else { format!("{size:.1} {}", UNITS[unit]) }
}
