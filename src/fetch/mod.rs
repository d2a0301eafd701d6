//! HTTP(S) retrieval backed by the content cache.
//!
//! [`RemoteFetcher::fetch`] is the only place TDPM talks to the network. It decides,
//! per request, whether the [`ContentStore`] can answer on its own:
//!
//! | Freshness   | Cached | Behaviour                                                    |
//! |-------------|--------|--------------------------------------------------------------|
//! | `Pinned`    | yes    | cached bytes, no network call                                |
//! | `Pinned`    | no     | GET, store on 200                                            |
//! | `Mutable`   | yes    | conditional GET with the stored validator, 304 reuses bytes  |
//! | `Mutable`   | no     | GET, store on 200                                            |
//!
//! Any status other than 2xx/304 fails with [`FetchError::Status`]. Transport failures
//! (timeouts, DNS, refused connections, broken bodies) fail with
//! [`FetchError::Transient`]. Transient failures and 5xx responses are retried with
//! exponential backoff a bounded number of times; 4xx responses are returned at once.
//!
//! `file://` URLs and bare paths are read straight from disk without caching.
//!
//! # Cancellation
//!
//! Dropping the future returned by [`RemoteFetcher::fetch`] drops the in-flight
//! `reqwest` request, which closes the connection.

use crate::cache::{CacheEntry, ContentStore, Validator};
use crate::constants::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_FETCH_RETRIES, DEFAULT_FETCH_TIMEOUT, MAX_BACKOFF_DELAY_MS,
    STARTING_BACKOFF_DELAY_MS,
};
use crate::core::FetchError;
use reqwest::StatusCode;
use reqwest::header::{ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_retry::RetryIf;
use tokio_retry::strategy::ExponentialBackoff;
use tracing::{debug, warn};

/// Whether the requested content can change under the same URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// The URL names an immutable version or commit; a cached copy is authoritative.
    Pinned,
    /// The URL names a moving target (branch, `latest`); revalidate on every fetch.
    Mutable,
}

impl Freshness {
    /// `Pinned` when `pinned` is true, `Mutable` otherwise.
    #[must_use]
    pub const fn from_pinned(pinned: bool) -> Self {
        if pinned { Self::Pinned } else { Self::Mutable }
    }
}

/// Transport settings for [`RemoteFetcher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchSettings {
    /// Whole-request timeout
    pub timeout: Duration,
    /// Connection establishment timeout
    pub connect_timeout: Duration,
    /// Retries after the first attempt for transient failures
    pub retries: usize,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_FETCH_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            retries: DEFAULT_FETCH_RETRIES,
        }
    }
}

/// Cache-aware HTTP client.
///
/// Cloning is cheap: the underlying connection pool, store handle and request counter
/// are shared.
///
/// # Examples
///
/// ```rust,no_run
/// use tdpm_cli::cache::ContentStore;
/// use tdpm_cli::fetch::{Freshness, RemoteFetcher};
///
/// # async fn example() -> anyhow::Result<()> {
/// let fetcher = RemoteFetcher::new(ContentStore::new("/tmp/tdpm-cache"))?;
/// let bytes = fetcher
///     .fetch("https://registry.tdpm.dev/node/18.0.0/index.d.ts", Freshness::Pinned)
///     .await?;
/// println!("{} bytes", bytes.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct RemoteFetcher {
    client: reqwest::Client,
    store: ContentStore,
    retries: usize,
    network_requests: Arc<AtomicUsize>,
}

impl RemoteFetcher {
    /// Creates a fetcher with default timeouts and retry count.
    pub fn new(store: ContentStore) -> Result<Self, FetchError> {
        Self::with_settings(store, &FetchSettings::default())
    }

    /// Creates a fetcher with explicit transport settings.
    pub fn with_settings(store: ContentStore, settings: &FetchSettings) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("tdpm/", env!("CARGO_PKG_VERSION")))
            .timeout(settings.timeout)
            .connect_timeout(settings.connect_timeout)
            .build()
            .map_err(|e| FetchError::Request {
                url: String::new(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            store,
            retries: settings.retries,
            network_requests: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// The content store backing this fetcher.
    #[must_use]
    pub const fn store(&self) -> &ContentStore {
        &self.store
    }

    /// Number of HTTP requests sent so far, retries included.
    #[must_use]
    pub fn network_requests(&self) -> usize {
        self.network_requests.load(Ordering::SeqCst)
    }

    /// Retrieves the content at `location`.
    ///
    /// `location` is an `http(s)://` URL, a `file://` URL or a local path.
    pub async fn fetch(&self, location: &str, freshness: Freshness) -> Result<Vec<u8>, FetchError> {
        if let Some(path) = local_path(location)? {
            return read_local(location, path).await;
        }

        let key = ContentStore::normalize_key(location)?;
        let cached = self.store.get(&key).await;

        if freshness == Freshness::Pinned
            && let Some(entry) = cached.as_ref()
        {
            debug!(url = %key, "Serving pinned content from cache");
            return Ok(entry.bytes.clone());
        }

        let strategy = ExponentialBackoff::from_millis(STARTING_BACKOFF_DELAY_MS)
            .max_delay(Duration::from_millis(MAX_BACKOFF_DELAY_MS))
            .take(self.retries);

        RetryIf::spawn(
            strategy,
            || self.request(location, &key, cached.as_ref()),
            |error: &FetchError| {
                let retry = error.is_transient();
                if retry {
                    warn!(url = %key, %error, "Transient fetch failure, retrying");
                }
                retry
            },
        )
        .await
    }

    async fn request(
        &self,
        url: &str,
        key: &str,
        cached: Option<&CacheEntry>,
    ) -> Result<Vec<u8>, FetchError> {
        self.network_requests.fetch_add(1, Ordering::SeqCst);

        let mut request = self.client.get(url);
        match cached.and_then(|entry| entry.validator.as_ref()) {
            Some(Validator::ETag(tag)) => request = request.header(IF_NONE_MATCH, tag),
            Some(Validator::LastModified(date)) => request = request.header(IF_MODIFIED_SINCE, date),
            None => {}
        }

        debug!(url = %key, conditional = cached.is_some(), "Sending GET");
        let response = request.send().await.map_err(|e| classify(key, &e))?;
        let status = response.status();
        let validator = header_value(&response, ETAG)
            .map(Validator::ETag)
            .or_else(|| header_value(&response, LAST_MODIFIED).map(Validator::LastModified));

        if status == StatusCode::NOT_MODIFIED {
            if let Some(entry) = cached {
                debug!(url = %key, "Not modified, reusing cached content");
                if let Err(e) = self.store.refresh(key, validator).await {
                    warn!(url = %key, error = %e, "Failed to refresh cache entry");
                }
                return Ok(entry.bytes.clone());
            }
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: key.to_string(),
            });
        }

        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: key.to_string(),
            });
        }

        let bytes = response.bytes().await.map_err(|e| classify(key, &e))?.to_vec();

        if let Err(e) = self.store.put(key, bytes.clone(), validator).await {
            warn!(url = %key, error = %e, "Failed to store fetched content in cache");
        }
        Ok(bytes)
    }
}

fn header_value(response: &reqwest::Response, name: reqwest::header::HeaderName) -> Option<String> {
    response.headers().get(name).and_then(|v| v.to_str().ok()).map(str::to_string)
}

fn classify(url: &str, error: &reqwest::Error) -> FetchError {
    if let Some(status) = error.status() {
        return FetchError::Status {
            status: status.as_u16(),
            url: url.to_string(),
        };
    }
    if error.is_builder() {
        return FetchError::Request {
            url: url.to_string(),
            reason: error.to_string(),
        };
    }
    FetchError::Transient {
        url: url.to_string(),
        reason: error.to_string(),
    }
}

/// Maps `file://` URLs and scheme-less locations to a path.
fn local_path(location: &str) -> Result<Option<PathBuf>, FetchError> {
    if location.starts_with("file://") {
        let url = reqwest::Url::parse(location).map_err(|e| FetchError::Request {
            url: location.to_string(),
            reason: e.to_string(),
        })?;
        let path = url.to_file_path().map_err(|()| FetchError::Request {
            url: location.to_string(),
            reason: "not a local file URL".to_string(),
        })?;
        return Ok(Some(path));
    }
    if location.contains("://") {
        return Ok(None);
    }
    Ok(Some(PathBuf::from(location)))
}

async fn read_local(location: &str, path: PathBuf) -> Result<Vec<u8>, FetchError> {
    tokio::fs::read(&path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            FetchError::Status {
                status: 404,
                url: location.to_string(),
            }
        } else {
            FetchError::Request {
                url: location.to_string(),
                reason: e.to_string(),
            }
        }
    })
}
