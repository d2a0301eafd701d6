//! Shared utilities
//!
//! - [`fs`] - atomic writes, artifact cleanup and content checksums
//! - [`progress`] - terminal spinners for long-running commands

pub mod fs;
pub mod progress;

pub use fs::{atomic_write, atomic_write_async, content_checksum, remove_file_and_empty_parents};
pub use progress::{Spinner, is_progress_disabled};
