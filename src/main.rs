//! TDPM CLI entry point
//!
//! Parses arguments, runs the selected command and renders failures. Exit codes:
//! `0` on success, `1` on failure, `130` when interrupted with Ctrl-C.

use anyhow::Result;
use clap::Parser;
use tdpm_cli::cli::{self, Interrupted};
use tdpm_cli::core::error::user_friendly_error;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    match cli.execute().await {
        Ok(()) => Ok(()),
        Err(e) if e.downcast_ref::<Interrupted>().is_some() => {
            eprintln!("Interrupted");
            std::process::exit(130);
        }
        Err(e) => {
            let error_ctx = user_friendly_error(e);
            error_ctx.display();
            std::process::exit(1);
        }
    }
}
