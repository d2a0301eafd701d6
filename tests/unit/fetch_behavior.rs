//! Retry, revalidation and caching behavior of `RemoteFetcher`.

use crate::common::fast_settings;
use tdpm_cli::cache::ContentStore;
use tdpm_cli::fetch::{FetchSettings, Freshness, RemoteFetcher};
use tdpm_cli::test_utils::TestRegistry;
use tempfile::TempDir;

fn fetcher(cache: &TempDir, retries: usize) -> RemoteFetcher {
    let settings = FetchSettings {
        retries,
        ..fast_settings()
    };
    RemoteFetcher::with_settings(ContentStore::new(cache.path()), &settings).unwrap()
}

#[tokio::test]
async fn test_mutable_fetch_revalidates_with_etag() {
    let registry = TestRegistry::start().await.unwrap();
    let cache = TempDir::new().unwrap();
    let path = "/a/latest/tdpm.json";
    registry.set_with_etag(path, "v1", Some("\"one\""));
    let url = format!("{}{path}", registry.url());
    let fetcher = fetcher(&cache, 0);

    assert_eq!(fetcher.fetch(&url, Freshness::Mutable).await.unwrap(), b"v1");

    // Same validator: the server answers 304 and the cached bytes are served.
    registry.set_with_etag(path, "changed body, same etag", Some("\"one\""));
    assert_eq!(fetcher.fetch(&url, Freshness::Mutable).await.unwrap(), b"v1");

    // New validator: fresh bytes replace the cached copy.
    registry.set_with_etag(path, "v2", Some("\"two\""));
    assert_eq!(fetcher.fetch(&url, Freshness::Mutable).await.unwrap(), b"v2");

    assert_eq!(registry.requests(path), 3);
    assert_eq!(fetcher.network_requests(), 3);
}

#[tokio::test]
async fn test_not_modified_response_updates_the_validator() {
    let registry = TestRegistry::start().await.unwrap();
    let cache = TempDir::new().unwrap();
    let path = "/a/latest/tdpm.json";
    registry.set_with_etag(path, "v1", Some("\"one\""));
    let url = format!("{}{path}", registry.url());
    let fetcher = fetcher(&cache, 0);

    assert_eq!(fetcher.fetch(&url, Freshness::Mutable).await.unwrap(), b"v1");

    // 304 for "one", carrying the new ETag "two".
    registry.rotate_etag(path, "\"two\"");
    assert_eq!(fetcher.fetch(&url, Freshness::Mutable).await.unwrap(), b"v1");

    // Only "two" is fresh now; a client still sending "one" would get this body.
    registry.set_with_etag(path, "v3", Some("\"two\""));
    assert_eq!(fetcher.fetch(&url, Freshness::Mutable).await.unwrap(), b"v1");
    assert_eq!(registry.requests(path), 3);
}

#[tokio::test]
async fn test_pinned_fetch_uses_cache_without_network() {
    let registry = TestRegistry::start().await.unwrap();
    let cache = TempDir::new().unwrap();
    let path = "/a/1.0.0/index.d.ts";
    registry.set(path, "declare const a: 1;");
    let url = format!("{}{path}", registry.url());

    let first = fetcher(&cache, 0);
    first.fetch(&url, Freshness::Pinned).await.unwrap();

    // A new fetcher over the same cache directory, as in a second process.
    let second = fetcher(&cache, 0);
    let bytes = second.fetch(&url, Freshness::Pinned).await.unwrap();

    assert_eq!(bytes, b"declare const a: 1;");
    assert_eq!(second.network_requests(), 0);
    assert_eq!(registry.requests(path), 1);
}

#[tokio::test]
async fn test_server_errors_are_retried() {
    let registry = TestRegistry::start().await.unwrap();
    let cache = TempDir::new().unwrap();
    let path = "/a/1.0.0/index.d.ts";
    registry.set(path, "ok");
    registry.fail_next(path, 503, 2);
    let url = format!("{}{path}", registry.url());

    let bytes = fetcher(&cache, 2).fetch(&url, Freshness::Mutable).await.unwrap();

    assert_eq!(bytes, b"ok");
    assert_eq!(registry.requests(path), 3);
}

#[tokio::test]
async fn test_retries_are_bounded() {
    let registry = TestRegistry::start().await.unwrap();
    let cache = TempDir::new().unwrap();
    let path = "/a/1.0.0/index.d.ts";
    registry.set_status(path, 500);
    let url = format!("{}{path}", registry.url());

    let err = fetcher(&cache, 2).fetch(&url, Freshness::Mutable).await.unwrap_err();

    assert_eq!(err.status(), Some(500));
    assert!(err.is_transient());
    assert_eq!(registry.requests(path), 3);
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let registry = TestRegistry::start().await.unwrap();
    let cache = TempDir::new().unwrap();
    let url = format!("{}/missing/1.0.0/index.d.ts", registry.url());

    let err = fetcher(&cache, 3).fetch(&url, Freshness::Pinned).await.unwrap_err();

    assert_eq!(err.status(), Some(404));
    assert!(!err.is_transient());
    assert_eq!(registry.requests("/missing/1.0.0/index.d.ts"), 1);
}

#[tokio::test]
async fn test_failed_responses_are_not_cached() {
    let registry = TestRegistry::start().await.unwrap();
    let cache = TempDir::new().unwrap();
    let path = "/a/1.0.0/index.d.ts";
    registry.fail_next(path, 500, 1);
    registry.set(path, "ok");
    let url = format!("{}{path}", registry.url());
    let fetcher = fetcher(&cache, 0);

    assert!(fetcher.fetch(&url, Freshness::Pinned).await.is_err());
    assert_eq!(fetcher.fetch(&url, Freshness::Pinned).await.unwrap(), b"ok");
    assert_eq!(registry.requests(path), 2);
}

#[tokio::test]
async fn test_credentials_are_not_persisted() {
    let registry = TestRegistry::start().await.unwrap();
    let cache = TempDir::new().unwrap();
    let path = "/a/1.0.0/index.d.ts";
    registry.set(path, "declare const a: 1;");
    let authority = registry.url().trim_start_matches("http://").to_string();
    let with_credentials = format!("http://user:s3cr3t-token@{authority}{path}");
    let fetcher = fetcher(&cache, 0);

    fetcher.fetch(&with_credentials, Freshness::Pinned).await.unwrap();

    // The credential-free URL shares the cache entry.
    let plain = format!("{}{path}", registry.url());
    fetcher.fetch(&plain, Freshness::Pinned).await.unwrap();
    assert_eq!(registry.requests(path), 1);

    let mut pending = vec![cache.path().to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir).unwrap() {
            let entry = entry.unwrap();
            if entry.file_type().unwrap().is_dir() {
                pending.push(entry.path());
            } else {
                let bytes = std::fs::read(entry.path()).unwrap();
                let text = String::from_utf8_lossy(&bytes);
                assert!(!text.contains("s3cr3t-token"), "credential leaked into {:?}", entry.path());
            }
        }
    }
}

#[tokio::test]
async fn test_unreachable_host_is_transient() {
    let cache = TempDir::new().unwrap();
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = fetcher(&cache, 0)
        .fetch(&format!("http://{addr}/a/1.0.0/index.d.ts"), Freshness::Mutable)
        .await
        .unwrap_err();

    assert!(err.is_transient());
    assert_eq!(err.status(), None);
}
