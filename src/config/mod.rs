//! Configuration management for TDPM
//!
//! User-wide settings live in a TOML file, by default `~/.tdpm/config.toml`:
//!
//! ```toml
//! registry = "https://registry.tdpm.dev"
//! cache_dir = "/var/cache/tdpm"
//! artifact_dir = "typings"
//! max_parallel = 16
//!
//! [fetch]
//! timeout_secs = 30
//! connect_timeout_secs = 10
//! retries = 3
//! ```
//!
//! Every field is optional. The file location can be changed with `--config` or the
//! `TDPM_CONFIG` environment variable, and `TDPM_REGISTRY` / `TDPM_CACHE_DIR` override
//! the corresponding settings. Project state never lives here; it is all in
//! `tdpm.json`.

pub mod global;

pub use global::{CONFIG_ENV, FetchConfig, GlobalConfig, REGISTRY_ENV};
