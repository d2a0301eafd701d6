//! Global constants used throughout the TDPM codebase.
//!
//! Well-known file names, timeout durations, retry parameters and parallelism
//! defaults live here so that magic numbers stay discoverable.

use std::time::Duration;

/// Name of the project manifest file that marks a project root.
pub const MANIFEST_FILE: &str = "tdpm.json";

/// Project-local directory holding TDPM bookkeeping (locks).
pub const PROJECT_STATE_DIR: &str = ".tdpm";

/// Default directory, relative to the project root, where artifacts are written.
pub const DEFAULT_ARTIFACT_DIR: &str = "typings";

/// File name used for an artifact when its header does not declare `main`.
pub const DEFAULT_ARTIFACT_MAIN: &str = "index.d.ts";

/// Name of the per-artifact header document served by the registry.
pub const ARTIFACT_HEADER_FILE: &str = "tdpm.json";

/// Selector used in registry URLs when a declaration carries no ref.
pub const LATEST_REF: &str = "latest";

/// Default registry base URL.
pub const DEFAULT_REGISTRY: &str = "https://registry.tdpm.dev";

/// Indentation used when writing a manifest that had no prior file.
pub const DEFAULT_INDENT: &str = "  ";

/// Maximum backoff delay for exponential backoff (500ms).
pub const MAX_BACKOFF_DELAY_MS: u64 = 500;

/// Starting delay for exponential backoff (10ms).
///
/// Doubles on each retry attempt up to [`MAX_BACKOFF_DELAY_MS`].
pub const STARTING_BACKOFF_DELAY_MS: u64 = 10;

/// Number of retries for transient fetch failures.
pub const DEFAULT_FETCH_RETRIES: usize = 3;

/// Whole-request timeout for registry fetches (30 seconds).
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection establishment timeout for registry fetches (10 seconds).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Minimum number of parallel fetches regardless of CPU count.
pub const MIN_PARALLELISM: usize = 10;

/// Multiplier applied to CPU core count for default parallelism.
pub const PARALLELISM_CORE_MULTIPLIER: usize = 2;

/// Default fan-out for concurrent fetches: `max(10, 2 × cores)`.
#[must_use]
pub fn default_parallelism() -> usize {
    let cores = std::thread::available_parallelism().map(std::num::NonZeroUsize::get).unwrap_or(1);
    std::cmp::max(MIN_PARALLELISM, cores * PARALLELISM_CORE_MULTIPLIER)
}
