//! `tdpm install`
//!
//! ```bash
//! tdpm install                        # install everything declared in tdpm.json
//! tdpm install lodash@4.17.21         # add a runtime declaration and install
//! tdpm install -D jest -A node@18     # dev and ambient declarations
//! ```
//!
//! Without a project, `install NAME...` creates `tdpm.json` in the current directory.

use super::common::{CommandContext, SaveKindArgs, run_cancellable};
use crate::manifest::{Declaration, SaveKind};
use crate::resolver::Conflict;
use anyhow::Result;
use clap::Args;
use colored::Colorize;

/// Arguments of `tdpm install`.
#[derive(Args, Debug)]
pub struct InstallCommand {
    /// Artifacts to add, as `name` or `name@ref`
    #[arg(value_name = "NAME[@REF]")]
    packages: Vec<String>,

    #[command(flatten)]
    kind: SaveKindArgs,
}

impl InstallCommand {
    /// Parses the requested declarations; runtime is the default kind.
    pub fn declarations(&self) -> Result<Vec<Declaration>> {
        let kind = self.kind.kind().unwrap_or(SaveKind::Runtime);
        self.packages
            .iter()
            .map(|spec| Declaration::parse(spec, kind).map_err(Into::into))
            .collect()
    }

    /// Runs the command.
    pub async fn execute(self, context: &CommandContext) -> Result<()> {
        let declarations = self.declarations()?;
        let installer = context.installer()?;

        let spinner = context.spinner("Resolving dependencies");
        let outcome = run_cancellable(installer.install(&context.cwd, declarations)).await;
        spinner.finish_and_clear();
        let result = outcome?;

        if context.quiet {
            return Ok(());
        }
        for conflict in result.graph.conflicts() {
            print_conflict(conflict);
        }
        for reference in &result.installed {
            println!("{} {}@{}", "+".green(), reference.name.bold(), reference.resolved_ref);
        }
        for reference in &result.removed {
            println!("{} {}@{}", "-".red(), reference.name.bold(), reference.resolved_ref);
        }
        let summary = format!(
            "{} installed, {} already present, {} removed",
            result.installed.len(),
            result.already_present.len(),
            result.removed.len()
        );
        println!("{} {}", "✓".green(), summary);
        Ok(())
    }
}

fn print_conflict(conflict: &Conflict) {
    eprintln!("{} {}", "warning:".yellow().bold(), conflict);
}
