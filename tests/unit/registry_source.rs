//! `RegistrySource` against an HTTP registry and a local directory registry.

use crate::common::{fast_settings, header};
use tdpm_cli::cache::ContentStore;
use tdpm_cli::core::FetchError;
use tdpm_cli::fetch::RemoteFetcher;
use tdpm_cli::manifest::ResolvedReference;
use tdpm_cli::source::{ArtifactSource, RegistrySource};
use tdpm_cli::test_utils::TestRegistry;
use tempfile::TempDir;

fn source(registry: &str, cache: &TempDir) -> RegistrySource {
    let fetcher =
        RemoteFetcher::with_settings(ContentStore::new(cache.path()), &fast_settings()).unwrap();
    RegistrySource::new(registry, fetcher)
}

fn reference(name: &str, header: &tdpm_cli::source::ArtifactHeader) -> ResolvedReference {
    ResolvedReference {
        name: name.to_string(),
        resolved_ref: header.resolved_ref.clone(),
        url: header.url.clone(),
        path: format!("typings/{name}/{}", header.main),
        checksum: None,
    }
}

#[tokio::test]
async fn test_latest_resolves_to_published_version() {
    let registry = TestRegistry::start().await.unwrap();
    let cache = TempDir::new().unwrap();
    registry.set("/a/latest/tdpm.json", header("a", "2.1.0", &[("b", Some("1.0.0"))]));
    registry.publish("a", "2.1.0", &header("a", "2.1.0", &[]), "declare const a: 2;");
    let source = source(&registry.url(), &cache);

    let resolved = source.header("a", None).await.unwrap();

    assert_eq!(resolved.resolved_ref, "2.1.0");
    assert_eq!(resolved.url, format!("{}/a/2.1.0/index.d.ts", registry.url()));
    assert_eq!(resolved.dependencies.get("b"), Some(&Some("1.0.0".to_string())));

    let bytes = source.content(&reference("a", &resolved)).await.unwrap();
    assert_eq!(bytes, b"declare const a: 2;");
}

#[tokio::test]
async fn test_pinned_header_is_served_from_cache() {
    let registry = TestRegistry::start().await.unwrap();
    let cache = TempDir::new().unwrap();
    registry.publish("a", "1.0.0", &header("a", "1.0.0", &[]), "a");

    source(&registry.url(), &cache).header("a", Some("1.0.0")).await.unwrap();
    let second = source(&registry.url(), &cache);
    second.header("a", Some("1.0.0")).await.unwrap();

    assert_eq!(registry.requests("/a/1.0.0/tdpm.json"), 1);
    assert_eq!(second.fetcher().network_requests(), 0);
}

#[tokio::test]
async fn test_moving_selector_is_revalidated() {
    let registry = TestRegistry::start().await.unwrap();
    let cache = TempDir::new().unwrap();
    registry.set("/a/main/tdpm.json", header("a", "main", &[]));

    source(&registry.url(), &cache).header("a", Some("main")).await.unwrap();
    source(&registry.url(), &cache).header("a", Some("main")).await.unwrap();

    assert_eq!(registry.requests("/a/main/tdpm.json"), 2);
}

#[tokio::test]
async fn test_header_for_wrong_name_is_rejected() {
    let registry = TestRegistry::start().await.unwrap();
    let cache = TempDir::new().unwrap();
    registry.set("/a/1.0.0/tdpm.json", header("b", "1.0.0", &[]));

    let err = source(&registry.url(), &cache).header("a", Some("1.0.0")).await.unwrap_err();

    assert!(matches!(err, FetchError::InvalidHeader { .. }), "{err:?}");
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_unknown_artifact_is_404() {
    let registry = TestRegistry::start().await.unwrap();
    let cache = TempDir::new().unwrap();

    let err = source(&registry.url(), &cache).header("ghost", None).await.unwrap_err();

    assert_eq!(err.status(), Some(404));
    assert!(err.url().ends_with("/ghost/latest/tdpm.json"));
}

#[tokio::test]
async fn test_local_directory_registry() {
    let root = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    let artifact = root.path().join("a").join("1.0.0");
    std::fs::create_dir_all(&artifact).unwrap();
    std::fs::write(artifact.join("tdpm.json"), header("a", "1.0.0", &[])).unwrap();
    std::fs::write(artifact.join("index.d.ts"), "declare const a: 1;").unwrap();
    let registry = root.path().to_string_lossy().into_owned();
    let source = source(&registry, &cache);

    let resolved = source.header("a", Some("1.0.0")).await.unwrap();
    let bytes = source.content(&reference("a", &resolved)).await.unwrap();

    assert_eq!(bytes, b"declare const a: 1;");
    assert_eq!(source.fetcher().network_requests(), 0);
}
