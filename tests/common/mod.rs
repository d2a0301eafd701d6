//! Common test utilities for TDPM integration tests
//!
//! A [`TestProject`] is a temporary directory holding a project directory and a private
//! content cache. Libraries are driven through [`TestProject::installer`], the binary
//! through [`TestProject::run_tdpm`].

// Not every suite uses every helper.
#![allow(dead_code)]

use anyhow::{Context, Result};
use assert_cmd::Command;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tdpm_cli::cache::ContentStore;
use tdpm_cli::fetch::{FetchSettings, RemoteFetcher};
use tdpm_cli::installer::{Installer, InstallerConfig};
use tdpm_cli::source::RegistrySource;
use tempfile::TempDir;

/// Renders a registry header document.
pub fn header(name: &str, version: &str, dependencies: &[(&str, Option<&str>)]) -> String {
    let deps: serde_json::Map<String, Value> = dependencies
        .iter()
        .map(|(dep, selector)| {
            (dep.to_string(), selector.map_or(Value::Null, |s| Value::String(s.to_string())))
        })
        .collect();
    serde_json::json!({ "name": name, "version": version, "dependencies": deps }).to_string()
}

/// Fetch settings with short timeouts and a single retry.
pub fn fast_settings() -> FetchSettings {
    FetchSettings {
        timeout: Duration::from_secs(5),
        connect_timeout: Duration::from_secs(2),
        retries: 1,
    }
}

/// A temporary project with its own cache directory.
pub struct TestProject {
    _temp_dir: TempDir,
    project_dir: PathBuf,
    cache_dir: PathBuf,
    config_path: PathBuf,
}

impl TestProject {
    /// Creates an empty project directory (no manifest yet).
    pub fn new() -> Result<Self> {
        tdpm_cli::test_utils::init_test_logging(None);
        let temp_dir = TempDir::new()?;
        let project_dir = temp_dir.path().join("project");
        let cache_dir = temp_dir.path().join("cache");
        std::fs::create_dir_all(&project_dir)?;
        std::fs::create_dir_all(&cache_dir)?;
        let config_path = temp_dir.path().join("config.toml");

        Ok(Self {
            _temp_dir: temp_dir,
            project_dir,
            cache_dir,
            config_path,
        })
    }

    pub fn project_path(&self) -> &Path {
        &self.project_dir
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_dir
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.project_dir.join("tdpm.json")
    }

    /// Writes `tdpm.json` verbatim.
    pub fn write_manifest(&self, content: &str) -> Result<()> {
        std::fs::write(self.manifest_path(), content).context("Failed to write manifest")
    }

    /// Raw manifest bytes.
    pub fn manifest_bytes(&self) -> Result<Vec<u8>> {
        std::fs::read(self.manifest_path()).context("Failed to read manifest")
    }

    /// The manifest parsed as untyped JSON.
    pub fn manifest_json(&self) -> Result<Value> {
        Ok(serde_json::from_slice(&self.manifest_bytes()?)?)
    }

    /// Names in the manifest's `resolved` map, sorted.
    pub fn resolved_names(&self) -> Result<Vec<String>> {
        let json = self.manifest_json()?;
        let resolved = json["resolved"].as_object().context("resolved is not an object")?;
        Ok(resolved.keys().cloned().collect())
    }

    /// Reads an installed file relative to the project root.
    pub fn read_file(&self, relative: &str) -> Result<String> {
        std::fs::read_to_string(self.project_dir.join(relative))
            .with_context(|| format!("Failed to read {relative}"))
    }

    pub fn file_exists(&self, relative: &str) -> bool {
        self.project_dir.join(relative).exists()
    }

    /// An installer against `registry` using this project's cache.
    pub fn installer(&self, registry: &str) -> Result<Installer<RegistrySource>> {
        let fetcher =
            RemoteFetcher::with_settings(ContentStore::new(&self.cache_dir), &fast_settings())?;
        let source = RegistrySource::new(registry, fetcher);
        Ok(Installer::new(
            source,
            InstallerConfig {
                max_parallel: 4,
                ..InstallerConfig::default()
            },
        ))
    }

    /// Runs the `tdpm` binary in the project directory against `registry`.
    ///
    /// Call from a multi-threaded runtime so a [`TestRegistry`] keeps serving while
    /// this blocks.
    ///
    /// [`TestRegistry`]: tdpm_cli::test_utils::TestRegistry
    pub fn run_tdpm(&self, registry: &str, args: &[&str]) -> Result<CommandOutput> {
        std::fs::write(
            &self.config_path,
            format!("registry = \"{registry}\"\n\n[fetch]\nretries = 1\ntimeout_secs = 5\n"),
        )?;
        let output = Command::cargo_bin("tdpm")?
            .arg("--config")
            .arg(&self.config_path)
            .arg("-C")
            .arg(&self.project_dir)
            .args(args)
            .env("TDPM_CACHE_DIR", &self.cache_dir)
            .env_remove("TDPM_REGISTRY")
            .env_remove("TDPM_CONFIG")
            .env_remove("RUST_LOG")
            .env("TDPM_NO_PROGRESS", "1")
            .env("NO_COLOR", "1")
            .output()?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            success: output.status.success(),
            code: output.status.code(),
        })
    }
}

/// Captured result of a CLI run.
#[derive(Debug)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    pub code: Option<i32>,
}

impl CommandOutput {
    /// Assert the command succeeded
    pub fn assert_success(&self) -> &Self {
        assert!(
            self.success,
            "Command failed with code {:?}\nStdout: {}\nStderr: {}",
            self.code, self.stdout, self.stderr
        );
        self
    }

    /// Assert the command failed with `code`
    pub fn assert_code(&self, code: i32) -> &Self {
        assert_eq!(
            self.code,
            Some(code),
            "Unexpected exit code\nStdout: {}\nStderr: {}",
            self.stdout,
            self.stderr
        );
        self
    }

    /// Assert stdout contains the given text
    pub fn assert_stdout_contains(&self, text: &str) -> &Self {
        assert!(
            self.stdout.contains(text),
            "Expected stdout to contain '{}'\nActual stdout: {}",
            text,
            self.stdout
        );
        self
    }

    /// Assert stderr contains the given text
    pub fn assert_stderr_contains(&self, text: &str) -> &Self {
        assert!(
            self.stderr.contains(text),
            "Expected stderr to contain '{}'\nActual stderr: {}",
            text,
            self.stderr
        );
        self
    }
}
