//! The global (per-user) configuration file.

use crate::cache::{CACHE_DIR_ENV, ContentStore};
use crate::constants::{
    DEFAULT_ARTIFACT_DIR, DEFAULT_CONNECT_TIMEOUT, DEFAULT_FETCH_RETRIES, DEFAULT_FETCH_TIMEOUT,
    DEFAULT_REGISTRY, PROJECT_STATE_DIR, default_parallelism,
};
use crate::fetch::FetchSettings;
use crate::installer::InstallerConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "TDPM_CONFIG";

/// Environment variable overriding the registry URL.
pub const REGISTRY_ENV: &str = "TDPM_REGISTRY";

fn default_registry() -> String {
    DEFAULT_REGISTRY.to_string()
}

fn default_artifact_dir() -> String {
    DEFAULT_ARTIFACT_DIR.to_string()
}

/// HTTP transport settings (`[fetch]`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Whole-request timeout in seconds
    pub timeout_secs: u64,
    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,
    /// Retries after the first attempt for transient failures
    pub retries: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_FETCH_TIMEOUT.as_secs(),
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT.as_secs(),
            retries: DEFAULT_FETCH_RETRIES,
        }
    }
}

/// User-wide TDPM settings.
///
/// # Examples
///
/// ```rust,no_run
/// use tdpm_cli::config::GlobalConfig;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = GlobalConfig::load(None).await?;
/// println!("Registry: {}", config.registry);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Base URL of the artifact registry
    #[serde(default = "default_registry")]
    pub registry: String,

    /// Content cache root; defaults to `~/.tdpm/cache/http`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,

    /// Project-relative directory artifacts are installed under
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: String,

    /// Maximum concurrent fetches; defaults to `max(10, 2 × cores)`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_parallel: Option<usize>,

    /// HTTP transport settings
    #[serde(default)]
    pub fetch: FetchConfig,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            registry: default_registry(),
            cache_dir: None,
            artifact_dir: default_artifact_dir(),
            max_parallel: None,
            fetch: FetchConfig::default(),
        }
    }
}

impl GlobalConfig {
    /// Loads the configuration and applies environment overrides.
    ///
    /// The file is `explicit` if given, else `$TDPM_CONFIG`, else
    /// [`default_path`](Self::default_path). A missing file means defaults, except
    /// when the path was given explicitly.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicit file is missing, or if the file cannot be read or
    /// is not valid TOML of the expected shape.
    pub async fn load(explicit: Option<PathBuf>) -> Result<Self> {
        let (path, required) = match explicit {
            Some(path) => (path, true),
            None => match std::env::var_os(CONFIG_ENV) {
                Some(path) if !path.is_empty() => (PathBuf::from(path), true),
                _ => (Self::default_path()?, false),
            },
        };

        let mut config = if required || fs::try_exists(&path).await.unwrap_or(false) {
            Self::load_from(&path).await?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Loads the configuration from `path` without environment overrides.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// `~/.tdpm/config.toml`.
    pub fn default_path() -> Result<PathBuf> {
        let home =
            dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Unable to determine home directory"))?;
        Ok(home.join(PROJECT_STATE_DIR).join("config.toml"))
    }

    /// Applies `TDPM_REGISTRY` and `TDPM_CACHE_DIR`.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(registry) = std::env::var(REGISTRY_ENV)
            && !registry.is_empty()
        {
            self.registry = registry;
        }
        if let Some(dir) = std::env::var_os(CACHE_DIR_ENV)
            && !dir.is_empty()
        {
            self.cache_dir = Some(PathBuf::from(dir));
        }
    }

    fn validate(&self) -> Result<()> {
        if self.registry.trim().is_empty() {
            anyhow::bail!("registry must not be empty");
        }
        if self.max_parallel == Some(0) {
            anyhow::bail!("max_parallel must be at least 1");
        }
        let artifact_dir = Path::new(&self.artifact_dir);
        if self.artifact_dir.is_empty()
            || artifact_dir.is_absolute()
            || artifact_dir.components().any(|c| !matches!(c, std::path::Component::Normal(_)))
        {
            anyhow::bail!("artifact_dir must be a relative path inside the project");
        }
        Ok(())
    }

    /// The content cache root to use.
    pub fn cache_root(&self) -> Result<PathBuf> {
        match &self.cache_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(ContentStore::default_root()?),
        }
    }

    /// Transport settings for the fetcher.
    #[must_use]
    pub const fn fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            timeout: Duration::from_secs(self.fetch.timeout_secs),
            connect_timeout: Duration::from_secs(self.fetch.connect_timeout_secs),
            retries: self.fetch.retries,
        }
    }

    /// Installer settings.
    #[must_use]
    pub fn installer_config(&self) -> InstallerConfig {
        InstallerConfig {
            artifact_dir: self.artifact_dir.replace('\\', "/"),
            max_parallel: self.max_parallel.unwrap_or_else(default_parallelism),
        }
    }
}
