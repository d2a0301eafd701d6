//! `tdpm uninstall`
//!
//! ```bash
//! tdpm uninstall lodash
//! tdpm uninstall -D jest        # only the dev declaration
//! ```

use super::common::{CommandContext, SaveKindArgs, run_cancellable};
use crate::installer::UninstallOptions;
use anyhow::Result;
use clap::Args;
use colored::Colorize;

/// Arguments of `tdpm uninstall`.
#[derive(Args, Debug)]
pub struct UninstallCommand {
    /// Declared names to remove
    #[arg(required = true, value_name = "NAME")]
    names: Vec<String>,

    #[command(flatten)]
    kind: SaveKindArgs,
}

impl UninstallCommand {
    /// Runs the command.
    pub async fn execute(self, context: &CommandContext) -> Result<()> {
        let installer = context.installer()?;
        let options = UninstallOptions {
            kind: self.kind.kind(),
        };

        let spinner = context.spinner("Removing dependencies");
        let outcome = run_cancellable(installer.uninstall(&context.cwd, &self.names, options)).await;
        spinner.finish_and_clear();
        let result = outcome?;

        if context.quiet {
            return Ok(());
        }
        for name in &result.not_declared {
            eprintln!("{} {} is not a declared dependency", "warning:".yellow().bold(), name.bold());
        }
        for declaration in &result.removed_declarations {
            println!("{} {} ({})", "-".red(), declaration.name.bold(), declaration.kind);
        }
        for file in &result.removed_files {
            let shown = file.strip_prefix(&result.project_root).unwrap_or(file);
            println!("  {} {}", "removed".dimmed(), shown.display());
        }
        println!(
            "{} {} removed",
            "✓".green(),
            result.removed_declarations.len()
        );
        Ok(())
    }
}
