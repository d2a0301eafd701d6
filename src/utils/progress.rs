//! Progress indicators for the command line.
//!
//! A [`Spinner`] wraps an `indicatif` spinner with TDPM's styling. It renders on stderr
//! and is replaced by a hidden bar when progress is disabled, so callers never need to
//! branch on it.
//!
//! # Environment Variables
//!
//! - `TDPM_NO_PROGRESS`: set to any value to disable all progress indicators
//!
//! Progress is also disabled when stderr is not a terminal (pipes, CI logs).

use indicatif::{ProgressBar as IndicatifBar, ProgressStyle as IndicatifStyle};
use std::io::IsTerminal;
use std::time::Duration;

/// Environment variable that disables progress indicators.
pub const NO_PROGRESS_ENV: &str = "TDPM_NO_PROGRESS";

/// Whether the environment asks for plain output.
#[must_use]
pub fn is_progress_disabled() -> bool {
    std::env::var_os(NO_PROGRESS_ENV).is_some() || !std::io::stderr().is_terminal()
}

/// A spinner for work of unknown length.
///
/// ```rust,no_run
/// use tdpm_cli::utils::progress::Spinner;
///
/// let spinner = Spinner::new("Resolving dependencies", true);
/// // ...
/// spinner.finish_and_clear();
/// ```
#[derive(Debug, Clone)]
pub struct Spinner {
    inner: IndicatifBar,
}

impl Spinner {
    /// Starts a spinner showing `message`; hidden unless `enabled` and the environment
    /// allows progress output.
    pub fn new(message: impl Into<String>, enabled: bool) -> Self {
        let inner = if enabled && !is_progress_disabled() {
            let bar = IndicatifBar::new_spinner();
            bar.set_style(spinner_style());
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        } else {
            IndicatifBar::hidden()
        };
        inner.set_message(message.into());
        Self {
            inner,
        }
    }

    /// Replaces the message.
    pub fn set_message(&self, message: impl Into<String>) {
        self.inner.set_message(message.into());
    }

    /// Whether anything is drawn.
    #[must_use]
    pub fn is_hidden(&self) -> bool {
        self.inner.is_hidden()
    }

    /// Stops the spinner and removes it from the terminal.
    pub fn finish_and_clear(&self) {
        self.inner.finish_and_clear();
    }
}

fn spinner_style() -> IndicatifStyle {
    IndicatifStyle::default_spinner()
        .template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| IndicatifStyle::default_spinner())
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
}
