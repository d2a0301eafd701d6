//! Where artifact headers and content come from.
//!
//! The resolver and installer are generic over [`ArtifactSource`], which answers two
//! questions:
//!
//! - `header(name, selector)`: what concrete reference does this selector resolve to,
//!   and what does that artifact depend on?
//! - `content(reference)`: what are the bytes of a resolved reference?
//!
//! [`RegistrySource`] implements the registry wire convention on top of
//! [`RemoteFetcher`]:
//!
//! ```text
//! GET {registry}/{name}/{selector or "latest"}/tdpm.json   → header document
//! GET {registry}/{name}/{resolved ref}/{main}              → content
//! ```
//!
//! A header document is a JSON object:
//!
//! ```json
//! { "name": "a", "version": "1.0.0", "main": "index.d.ts",
//!   "dependencies": { "b": "2.0", "c": null } }
//! ```
//!
//! Every field is optional. The resolved ref is `version`, else the requested selector,
//! else `latest`; `main` defaults to `index.d.ts`.

use crate::constants::{ARTIFACT_HEADER_FILE, DEFAULT_ARTIFACT_MAIN, LATEST_REF};
use crate::core::FetchError;
use crate::fetch::{Freshness, RemoteFetcher};
use crate::manifest::{ResolvedReference, validate_name, validate_ref};
use crate::version::is_pinned;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::future::Future;
use tracing::debug;

/// Resolution metadata of one artifact revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactHeader {
    /// Concrete ref the selector resolved to
    pub resolved_ref: String,
    /// Fetch location of the content
    pub url: String,
    /// File name of the content inside the artifact directory
    pub main: String,
    /// Sub-dependencies by name, with their optional selector
    pub dependencies: BTreeMap<String, Option<String>>,
}

/// A provider of artifact headers and content.
///
/// Implementations must be cheap to share across concurrent requests.
pub trait ArtifactSource: Send + Sync {
    /// Resolves `selector` (absent = latest) for `name`.
    fn header(
        &self,
        name: &str,
        selector: Option<&str>,
    ) -> impl Future<Output = Result<ArtifactHeader, FetchError>> + Send;

    /// Retrieves the bytes of a resolved reference.
    fn content(
        &self,
        reference: &ResolvedReference,
    ) -> impl Future<Output = Result<Vec<u8>, FetchError>> + Send;
}

/// Wire shape of a registry header document.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HeaderDocument {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    main: Option<String>,
    #[serde(default)]
    dependencies: BTreeMap<String, Option<String>>,
}

/// [`ArtifactSource`] backed by an HTTP registry (or a local directory laid out the
/// same way, addressed through `file://`).
#[derive(Debug, Clone)]
pub struct RegistrySource {
    registry: String,
    fetcher: RemoteFetcher,
}

impl RegistrySource {
    /// Creates a source for the registry at `registry`.
    pub fn new(registry: impl Into<String>, fetcher: RemoteFetcher) -> Self {
        let registry = registry.into().trim_end_matches('/').to_string();
        Self {
            registry,
            fetcher,
        }
    }

    /// The registry base URL, without trailing slash.
    #[must_use]
    pub fn registry(&self) -> &str {
        &self.registry
    }

    /// The fetcher used for every request.
    #[must_use]
    pub const fn fetcher(&self) -> &RemoteFetcher {
        &self.fetcher
    }

    /// URL of the header document for `name` at `selector`.
    #[must_use]
    pub fn header_url(&self, name: &str, selector: Option<&str>) -> String {
        format!(
            "{}/{name}/{}/{ARTIFACT_HEADER_FILE}",
            self.registry,
            selector.unwrap_or(LATEST_REF)
        )
    }

    fn parse_header(
        &self,
        name: &str,
        selector: Option<&str>,
        url: &str,
        bytes: &[u8],
    ) -> Result<ArtifactHeader, FetchError> {
        let invalid = |reason: String| FetchError::InvalidHeader {
            url: url.to_string(),
            reason,
        };

        let document: HeaderDocument =
            serde_json::from_slice(bytes).map_err(|e| invalid(e.to_string()))?;

        if let Some(declared) = &document.name
            && declared != name
        {
            return Err(invalid(format!("header names '{declared}', expected '{name}'")));
        }
        for (dependency, selector) in &document.dependencies {
            validate_name(dependency).map_err(|e| invalid(e.to_string()))?;
            if let Some(selector) = selector {
                validate_ref(selector).map_err(|e| invalid(e.to_string()))?;
            }
        }

        let main = document.main.unwrap_or_else(|| DEFAULT_ARTIFACT_MAIN.to_string());
        validate_main(&main).map_err(invalid)?;

        let resolved_ref = document
            .version
            .filter(|v| !v.is_empty())
            .or_else(|| selector.map(str::to_string))
            .unwrap_or_else(|| LATEST_REF.to_string());
        validate_ref(&resolved_ref).map_err(|e| invalid(e.to_string()))?;

        Ok(ArtifactHeader {
            url: format!("{}/{name}/{resolved_ref}/{main}", self.registry),
            resolved_ref,
            main,
            dependencies: document.dependencies,
        })
    }
}

/// `main` must stay inside the artifact's directory.
fn validate_main(main: &str) -> Result<(), String> {
    if main.is_empty()
        || main.starts_with('/')
        || main.contains('\\')
        || main.split('/').any(|part| part.is_empty() || part == "." || part == "..")
    {
        return Err(format!("invalid main file '{main}'"));
    }
    Ok(())
}

impl ArtifactSource for RegistrySource {
    async fn header(&self, name: &str, selector: Option<&str>) -> Result<ArtifactHeader, FetchError> {
        let url = self.header_url(name, selector);
        if let Some(selector) = selector {
            validate_ref(selector).map_err(|e| FetchError::Request {
                url: url.clone(),
                reason: e.to_string(),
            })?;
        }
        let bytes = self.fetcher.fetch(&url, Freshness::from_pinned(is_pinned(selector))).await?;
        let header = self.parse_header(name, selector, &url, &bytes)?;
        debug!(
            name,
            selector = selector.unwrap_or(LATEST_REF),
            resolved = %header.resolved_ref,
            dependencies = header.dependencies.len(),
            "Fetched artifact header"
        );
        Ok(header)
    }

    async fn content(&self, reference: &ResolvedReference) -> Result<Vec<u8>, FetchError> {
        let freshness = Freshness::from_pinned(is_pinned(Some(&reference.resolved_ref)));
        self.fetcher.fetch(&reference.url, freshness).await
    }
}
