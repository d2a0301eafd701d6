//! Disk-backed content cache for remote fetches.
//!
//! The [`ContentStore`] maps a normalized fetch key (the request URL without
//! credentials or fragment) to the bytes last retrieved for it, the HTTP validator the
//! server attached (`ETag` or `Last-Modified`) and the time of retrieval. The
//! [`RemoteFetcher`](crate::fetch::RemoteFetcher) consults it before going to the
//! network.
//!
//! # Cache Directory Structure
//!
//! Entries are namespaced by the SHA-256 of their key, which sidesteps path length and
//! character restrictions for arbitrary URLs:
//!
//! ```text
//! ~/.tdpm/cache/http/
//! ├── 3f/
//! │   ├── 3fa9…c1.body      # raw bytes
//! │   └── 3fa9…c1.json      # key, validator, fetched_at, size
//! └── b2/
//!     └── …
//! ```
//!
//! # Consistency
//!
//! - Both files are written atomically; the body is written before its metadata so a
//!   metadata file never describes a body that has not landed yet
//! - An entry whose body size disagrees with its metadata is treated as a miss
//! - Concurrent readers are safe; concurrent writers of one key are last-write-wins,
//!   which is acceptable because content for a pinned ref is byte-identical
//! - There is no eviction: artifacts are small and immutable once pinned
//!
//! The cache is an optimization. Unreadable entries degrade to a miss and are logged;
//! they never fail a fetch.

use crate::constants::PROJECT_STATE_DIR;
use crate::core::{FetchError, TdpmError};
use crate::utils::fs::atomic_write_async;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable overriding the cache root.
pub const CACHE_DIR_ENV: &str = "TDPM_CACHE_DIR";

/// HTTP cache validator remembered for conditional requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "kebab-case")]
pub enum Validator {
    /// Value of the `ETag` response header, sent back as `If-None-Match`
    ETag(String),
    /// Value of the `Last-Modified` response header, sent back as `If-Modified-Since`
    LastModified(String),
}

/// A cached response body and its metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Normalized fetch key
    pub key: String,
    /// Response body
    pub bytes: Vec<u8>,
    /// Validator for conditional revalidation
    pub validator: Option<Validator>,
    /// When the entry was last stored or revalidated
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct EntryMetadata {
    key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    validator: Option<Validator>,
    fetched_at: DateTime<Utc>,
    size: u64,
}

/// Number of entries and total body bytes in the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cached entries
    pub entries: usize,
    /// Sum of cached body sizes
    pub bytes: u64,
}

/// Disk-backed cache from fetch key to previously retrieved bytes.
///
/// The store is an explicit object handed to the fetcher, so tests can point it at a
/// disposable directory.
///
/// # Examples
///
/// ```rust,no_run
/// use tdpm_cli::cache::ContentStore;
///
/// # async fn example() -> anyhow::Result<()> {
/// let store = ContentStore::new(ContentStore::default_root()?);
/// let key = ContentStore::normalize_key("https://user:pw@registry.example/a/1.0/index.d.ts#x")?;
/// assert_eq!(key, "https://registry.example/a/1.0/index.d.ts");
///
/// store.put(&key, b"declare module 'a';".to_vec(), None).await?;
/// assert!(store.get(&key).await.is_some());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ContentStore {
    root: PathBuf,
}

impl ContentStore {
    /// Creates a store rooted at `root`. The directory is created lazily on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
        }
    }

    /// Default cache root: `$TDPM_CACHE_DIR`, else `~/.tdpm/cache/http`.
    pub fn default_root() -> Result<PathBuf, TdpmError> {
        if let Ok(dir) = std::env::var(CACHE_DIR_ENV)
            && !dir.is_empty()
        {
            return Ok(PathBuf::from(dir));
        }
        let home = dirs::home_dir().ok_or_else(|| TdpmError::Config {
            message: "Unable to determine home directory for the content cache".to_string(),
        })?;
        Ok(home.join(PROJECT_STATE_DIR).join("cache").join("http"))
    }

    /// Root directory of this store.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Normalizes a URL into a fetch key.
    ///
    /// Keeps scheme, host, port, path and query. Credentials and the fragment are
    /// dropped so secrets never reach the disk and equivalent URLs share an entry.
    pub fn normalize_key(url: &str) -> Result<String, FetchError> {
        let mut parsed = reqwest::Url::parse(url).map_err(|e| FetchError::Request {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        // Both setters only fail for cannot-be-a-base URLs, which carry no credentials.
        let _ = parsed.set_username("");
        let _ = parsed.set_password(None);
        parsed.set_fragment(None);
        Ok(parsed.to_string())
    }

    fn entry_paths(&self, key: &str) -> (PathBuf, PathBuf) {
        let digest = hex::encode(Sha256::digest(key.as_bytes()));
        let dir = self.root.join(&digest[..2]);
        (dir.join(format!("{digest}.body")), dir.join(format!("{digest}.json")))
    }

    /// Looks up the entry for `key`.
    ///
    /// Missing, unreadable or inconsistent entries all return `None`.
    pub async fn get(&self, key: &str) -> Option<CacheEntry> {
        let (body_path, meta_path) = self.entry_paths(key);

        let raw_meta = match tokio::fs::read(&meta_path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(key, error = %e, "Failed to read cache metadata, treating as miss");
                return None;
            }
        };
        let meta: EntryMetadata = match serde_json::from_slice(&raw_meta) {
            Ok(meta) => meta,
            Err(e) => {
                warn!(key, error = %e, "Corrupt cache metadata, treating as miss");
                return None;
            }
        };
        if meta.key != key {
            warn!(key, stored = %meta.key, "Cache key mismatch, treating as miss");
            return None;
        }

        let bytes = match tokio::fs::read(&body_path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key, error = %e, "Failed to read cached body, treating as miss");
                return None;
            }
        };
        if bytes.len() as u64 != meta.size {
            warn!(key, expected = meta.size, actual = bytes.len(), "Truncated cache body");
            return None;
        }

        debug!(key, size = bytes.len(), "Content cache hit");
        Some(CacheEntry {
            key: key.to_string(),
            bytes,
            validator: meta.validator,
            fetched_at: meta.fetched_at,
        })
    }

    /// Stores or overwrites the entry for `key`.
    pub async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        validator: Option<Validator>,
    ) -> io::Result<CacheEntry> {
        let (body_path, meta_path) = self.entry_paths(key);
        let fetched_at = Utc::now();
        let meta = EntryMetadata {
            key: key.to_string(),
            validator: validator.clone(),
            fetched_at,
            size: bytes.len() as u64,
        };
        let meta_bytes = serde_json::to_vec_pretty(&meta).map_err(io::Error::other)?;

        atomic_write_async(body_path, bytes.clone()).await?;
        atomic_write_async(meta_path, meta_bytes).await?;
        debug!(key, size = bytes.len(), "Stored content in cache");

        Ok(CacheEntry {
            key: key.to_string(),
            bytes,
            validator,
            fetched_at,
        })
    }

    /// Marks an entry as revalidated now, optionally replacing its validator.
    ///
    /// Returns the refreshed entry, or `None` if there was nothing to refresh.
    pub async fn refresh(
        &self,
        key: &str,
        validator: Option<Validator>,
    ) -> io::Result<Option<CacheEntry>> {
        let Some(entry) = self.get(key).await else {
            return Ok(None);
        };
        let (_, meta_path) = self.entry_paths(key);
        let validator = validator.or(entry.validator);
        let fetched_at = Utc::now();
        let meta = EntryMetadata {
            key: key.to_string(),
            validator: validator.clone(),
            fetched_at,
            size: entry.bytes.len() as u64,
        };
        let meta_bytes = serde_json::to_vec_pretty(&meta).map_err(io::Error::other)?;
        atomic_write_async(meta_path, meta_bytes).await?;

        Ok(Some(CacheEntry {
            validator,
            fetched_at,
            ..entry
        }))
    }

    /// Counts entries and body bytes.
    pub async fn stats(&self) -> io::Result<CacheStats> {
        let mut stats = CacheStats::default();
        let mut shards = match tokio::fs::read_dir(&self.root).await {
            Ok(shards) => shards,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(stats),
            Err(e) => return Err(e),
        };

        while let Some(shard) = shards.next_entry().await? {
            if !shard.file_type().await?.is_dir() {
                continue;
            }
            let mut files = tokio::fs::read_dir(shard.path()).await?;
            while let Some(file) = files.next_entry().await? {
                if file.path().extension().is_some_and(|ext| ext == "body") {
                    stats.entries += 1;
                    stats.bytes += file.metadata().await?.len();
                }
            }
        }
        Ok(stats)
    }

    /// Deletes every entry.
    pub async fn clear(&self) -> io::Result<()> {
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}
