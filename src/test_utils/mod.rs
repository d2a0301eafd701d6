//! Test utilities for TDPM
//!
//! Available to unit tests and, through the `test-utils` feature, to the integration
//! test crates:
//!
//! - [`init_test_logging`] - once-guarded tracing setup
//! - [`MemorySource`] - an in-memory [`ArtifactSource`](crate::source::ArtifactSource)
//!   with call counters, injected failures and delays
//! - [`TestRegistry`] - a loopback HTTP registry for exercising the real fetcher
//! - [`ManifestFixture`] - sample `tdpm.json` documents
//!
//! # Example
//!
//! ```rust,no_run
//! use tdpm_cli::test_utils::{MemorySource, init_test_logging};
//!
//! init_test_logging(None);
//! let source = MemorySource::new()
//!     .with_artifact("a", "1.0", &[("b", Some("2.0"))], "declare const a: 1;")
//!     .with_artifact("b", "2.0", &[], "declare const b: 2;");
//! ```

pub mod fixtures;
pub mod registry;

pub use fixtures::{ManifestFixture, MemorySource};
pub use registry::TestRegistry;

use std::sync::Once;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Uses `level` when given, otherwise `RUST_LOG`; without either, logging stays off.
///
/// ```bash
/// RUST_LOG=tdpm_cli=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .with_ansi(true)
            .try_init();
    });
}
