//! Test fixtures: an in-memory artifact source and sample manifests.

use crate::constants::{DEFAULT_ARTIFACT_MAIN, LATEST_REF, MANIFEST_FILE};
use crate::core::FetchError;
use crate::manifest::ResolvedReference;
use crate::source::{ArtifactHeader, ArtifactSource};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone)]
struct MemoryArtifact {
    dependencies: BTreeMap<String, Option<String>>,
    content: Vec<u8>,
}

/// An [`ArtifactSource`] answering from memory.
///
/// Artifacts are registered per `(name, ref)`; a request without selector (or with
/// `latest`) is served by the ref set with [`with_latest`](Self::with_latest), or by an
/// artifact registered under the literal ref `latest`.
#[derive(Debug, Default)]
pub struct MemorySource {
    artifacts: BTreeMap<(String, String), MemoryArtifact>,
    latest: HashMap<String, String>,
    header_failures: HashMap<String, FetchError>,
    content_failures: HashMap<String, FetchError>,
    delays: HashMap<String, Duration>,
    header_calls: Mutex<HashMap<String, usize>>,
    content_calls: Mutex<HashMap<String, usize>>,
}

impl MemorySource {
    /// An empty source; every request is a 404.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `name@reference` with its dependencies and content.
    #[must_use]
    pub fn with_artifact(
        mut self,
        name: &str,
        reference: &str,
        dependencies: &[(&str, Option<&str>)],
        content: &str,
    ) -> Self {
        self.add_artifact(name, reference, dependencies, content);
        self
    }

    /// Non-consuming form of [`with_artifact`](Self::with_artifact).
    pub fn add_artifact(
        &mut self,
        name: &str,
        reference: &str,
        dependencies: &[(&str, Option<&str>)],
        content: &str,
    ) {
        let dependencies = dependencies
            .iter()
            .map(|(dep, selector)| ((*dep).to_string(), selector.map(str::to_string)))
            .collect();
        self.artifacts.insert(
            (name.to_string(), reference.to_string()),
            MemoryArtifact {
                dependencies,
                content: content.as_bytes().to_vec(),
            },
        );
    }

    /// Makes `latest` (and an absent selector) of `name` resolve to `reference`.
    #[must_use]
    pub fn with_latest(mut self, name: &str, reference: &str) -> Self {
        self.latest.insert(name.to_string(), reference.to_string());
        self
    }

    /// Every header request for `name` fails with `error`.
    #[must_use]
    pub fn with_header_failure(mut self, name: &str, error: FetchError) -> Self {
        self.header_failures.insert(name.to_string(), error);
        self
    }

    /// Every content request for `name` fails with `error`.
    #[must_use]
    pub fn with_content_failure(mut self, name: &str, error: FetchError) -> Self {
        self.content_failures.insert(name.to_string(), error);
        self
    }

    /// Header and content requests for `name` take `delay` before answering.
    #[must_use]
    pub fn with_delay(mut self, name: &str, delay: Duration) -> Self {
        self.delays.insert(name.to_string(), delay);
        self
    }

    /// Number of header requests made for `name`.
    #[must_use]
    pub fn header_calls(&self, name: &str) -> usize {
        count(&self.header_calls, name)
    }

    /// Number of content requests made for `name`.
    #[must_use]
    pub fn content_calls(&self, name: &str) -> usize {
        count(&self.content_calls, name)
    }

    /// Header plus content requests across all names.
    #[must_use]
    pub fn total_calls(&self) -> usize {
        total(&self.header_calls) + total(&self.content_calls)
    }

    async fn pause(&self, name: &str) {
        if let Some(delay) = self.delays.get(name) {
            tokio::time::sleep(*delay).await;
        }
    }

    fn content_url(name: &str, reference: &str) -> String {
        format!("memory://{name}/{reference}/{DEFAULT_ARTIFACT_MAIN}")
    }
}

fn record(calls: &Mutex<HashMap<String, usize>>, name: &str) {
    if let Ok(mut calls) = calls.lock() {
        *calls.entry(name.to_string()).or_default() += 1;
    }
}

fn count(calls: &Mutex<HashMap<String, usize>>, name: &str) -> usize {
    calls.lock().map(|calls| calls.get(name).copied().unwrap_or_default()).unwrap_or_default()
}

fn total(calls: &Mutex<HashMap<String, usize>>) -> usize {
    calls.lock().map(|calls| calls.values().sum()).unwrap_or_default()
}

impl ArtifactSource for MemorySource {
    async fn header(&self, name: &str, selector: Option<&str>) -> Result<ArtifactHeader, FetchError> {
        record(&self.header_calls, name);
        self.pause(name).await;
        if let Some(error) = self.header_failures.get(name) {
            return Err(error.clone());
        }

        let requested = selector.unwrap_or(LATEST_REF);
        let resolved = if requested == LATEST_REF {
            self.latest.get(name).map_or(requested, String::as_str)
        } else {
            requested
        };
        let artifact = self.artifacts.get(&(name.to_string(), resolved.to_string())).ok_or_else(|| {
            FetchError::Status {
                status: 404,
                url: format!("memory://{name}/{requested}/tdpm.json"),
            }
        })?;

        Ok(ArtifactHeader {
            resolved_ref: resolved.to_string(),
            url: Self::content_url(name, resolved),
            main: DEFAULT_ARTIFACT_MAIN.to_string(),
            dependencies: artifact.dependencies.clone(),
        })
    }

    async fn content(&self, reference: &ResolvedReference) -> Result<Vec<u8>, FetchError> {
        record(&self.content_calls, &reference.name);
        self.pause(&reference.name).await;
        if let Some(error) = self.content_failures.get(&reference.name) {
            return Err(error.clone());
        }
        self.artifacts
            .get(&(reference.name.clone(), reference.resolved_ref.clone()))
            .map(|artifact| artifact.content.clone())
            .ok_or_else(|| FetchError::Status {
                status: 404,
                url: reference.url.clone(),
            })
    }
}

/// Sample `tdpm.json` documents.
#[derive(Clone, Debug)]
pub struct ManifestFixture {
    /// File content
    pub content: String,
}

impl ManifestFixture {
    /// A manifest with no declarations, two-space indented.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            content: "{\n  \"declarations\": [],\n  \"resolved\": {}\n}\n".to_string(),
        }
    }

    /// A manifest declaring `a@1.0` at runtime, four-space indented, with an unknown
    /// field and no trailing newline.
    #[must_use]
    pub fn four_space() -> Self {
        Self {
            content: concat!(
                "{\n",
                "    \"declarations\": [\n",
                "        {\n",
                "            \"name\": \"a\",\n",
                "            \"ref\": \"1.0\",\n",
                "            \"kind\": \"runtime\"\n",
                "        }\n",
                "    ],\n",
                "    \"resolved\": {},\n",
                "    \"x-custom\": {\n",
                "        \"keep\": true\n",
                "    }\n",
                "}"
            )
            .to_string(),
        }
    }

    /// A file that is not JSON.
    #[must_use]
    pub fn malformed() -> Self {
        Self {
            content: "{ \"declarations\": [".to_string(),
        }
    }

    /// Writes the fixture as `tdpm.json` in `dir`, returning its path.
    pub fn write_to(&self, dir: &Path) -> std::io::Result<PathBuf> {
        let path = dir.join(MANIFEST_FILE);
        std::fs::write(&path, &self.content)?;
        Ok(path)
    }
}
