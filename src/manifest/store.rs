//! Reading, writing and transforming `tdpm.json`.
//!
//! The store owns formatting policy only as far as round-trip fidelity requires:
//!
//! - The indent of the existing file is detected on read and reused on write
//!   (two spaces when there was no file)
//! - Trailing newline, CRLF line endings and a UTF-8 BOM are remembered
//! - A document that was not modified since it was read is written back byte for byte
//!
//! [`ManifestStore::transform`] runs read → change → write as one logical step under
//! the project's [`ManifestLock`]. The write only happens when the change succeeds; an
//! error or a dropped future leaves the file exactly as it was.

use super::{Manifest, ManifestLock};
use crate::constants::DEFAULT_INDENT;
use crate::core::{ManifestError, TdpmError};
use crate::utils::fs::atomic_write_async;
use serde::Serialize;
use std::future::Future;
use std::path::{Path, PathBuf};
use tracing::debug;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Textual conventions of a JSON file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonFormat {
    /// One level of indentation (spaces or tabs)
    pub indent: String,
    /// Whether the file ends with a line break
    pub trailing_newline: bool,
    /// Whether lines end with `\r\n`
    pub crlf: bool,
    /// Whether the file starts with a UTF-8 byte order mark
    pub bom: bool,
}

impl Default for JsonFormat {
    fn default() -> Self {
        Self {
            indent: DEFAULT_INDENT.to_string(),
            trailing_newline: true,
            crlf: false,
            bom: false,
        }
    }
}

impl JsonFormat {
    /// Detects the conventions of `text` (BOM already removed).
    ///
    /// The indent is the leading whitespace of the first indented line.
    #[must_use]
    pub fn detect(text: &str) -> Self {
        let indent = text
            .lines()
            .map(|line| {
                let trimmed = line.trim_start_matches([' ', '\t']);
                (&line[..line.len() - trimmed.len()], trimmed)
            })
            .find(|(leading, rest)| !leading.is_empty() && !rest.trim().is_empty())
            .map_or_else(|| DEFAULT_INDENT.to_string(), |(leading, _)| leading.to_string());

        Self {
            indent,
            trailing_newline: text.ends_with('\n'),
            crlf: text.contains("\r\n"),
            bom: false,
        }
    }
}

/// A manifest together with the formatting it was read with.
#[derive(Debug, Clone, Default)]
pub struct ManifestDocument {
    /// The parsed manifest, free to be modified
    pub manifest: Manifest,
    /// Formatting applied on write
    pub format: JsonFormat,
    original: Option<(Manifest, Vec<u8>)>,
}

impl ManifestDocument {
    /// A new, never-persisted document with default formatting.
    #[must_use]
    pub fn new(manifest: Manifest) -> Self {
        Self {
            manifest,
            format: JsonFormat::default(),
            original: None,
        }
    }

    /// Whether the manifest differs from what was read.
    #[must_use]
    pub fn is_modified(&self) -> bool {
        self.original.as_ref().is_none_or(|(original, _)| *original != self.manifest)
    }

    /// Parses manifest bytes read from `path`.
    pub fn parse(path: &Path, bytes: Vec<u8>) -> Result<Self, TdpmError> {
        let malformed = |reason: String| {
            TdpmError::from(ManifestError::Malformed {
                path: path.to_path_buf(),
                reason,
            })
        };

        let (bom, body) = match bytes.strip_prefix(UTF8_BOM) {
            Some(body) => (true, body),
            None => (false, bytes.as_slice()),
        };
        let text = std::str::from_utf8(body).map_err(|e| malformed(e.to_string()))?;
        let mut manifest: Manifest =
            serde_json::from_str(text).map_err(|e| malformed(e.to_string()))?;
        manifest.hydrate_resolved_names();
        for declaration in &manifest.declarations {
            declaration.validate().map_err(|e| malformed(e.to_string()))?;
        }

        let format = JsonFormat {
            bom,
            ..JsonFormat::detect(text)
        };

        Ok(Self {
            original: Some((manifest.clone(), bytes)),
            manifest,
            format,
        })
    }

    /// Serializes the document.
    ///
    /// Unmodified documents return the bytes they were parsed from.
    pub fn to_bytes(&self) -> Result<Vec<u8>, TdpmError> {
        if let Some((original, bytes)) = &self.original
            && *original == self.manifest
        {
            return Ok(bytes.clone());
        }

        let mut buffer = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(self.format.indent.as_bytes());
        let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
        self.manifest.serialize(&mut serializer).map_err(|e| TdpmError::Config {
            message: format!("Failed to serialize manifest: {e}"),
        })?;
        if self.format.trailing_newline {
            buffer.push(b'\n');
        }

        let mut output = Vec::with_capacity(buffer.len() + UTF8_BOM.len());
        if self.format.bom {
            output.extend_from_slice(UTF8_BOM);
        }
        if self.format.crlf {
            for byte in buffer {
                if byte == b'\n' {
                    output.push(b'\r');
                }
                output.push(byte);
            }
        } else {
            output.extend_from_slice(&buffer);
        }
        Ok(output)
    }
}

/// Reads, writes and transforms manifest files.
///
/// # Examples
///
/// ```rust,no_run
/// use tdpm_cli::manifest::{Declaration, ManifestStore, SaveKind};
/// use std::path::Path;
///
/// # async fn example() -> Result<(), tdpm_cli::core::TdpmError> {
/// let store = ManifestStore::new();
/// let count = store
///     .transform(Path::new("/project/tdpm.json"), |mut manifest| async move {
///         manifest.upsert_declaration(Declaration::new("a", Some("1.0"), SaveKind::Runtime));
///         let count = manifest.declarations.len();
///         Ok((manifest, count))
///     })
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct ManifestStore;

impl ManifestStore {
    /// Creates a store.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Reads and validates the manifest at `path`.
    ///
    /// # Errors
    ///
    /// - [`ManifestError::NotFound`] if the file does not exist
    /// - [`ManifestError::Malformed`] if it is not UTF-8 JSON of the manifest shape
    pub async fn read(&self, path: &Path) -> Result<ManifestDocument, TdpmError> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ManifestError::NotFound {
                    path: path.to_path_buf(),
                }
                .into());
            }
            Err(e) => return Err(TdpmError::file_system("read manifest", path, e)),
        };
        debug!(path = %path.display(), size = bytes.len(), "Read manifest");
        ManifestDocument::parse(path, bytes)
    }

    /// Writes `document` to `path` atomically.
    pub async fn write(&self, path: &Path, document: &ManifestDocument) -> Result<(), TdpmError> {
        let bytes = document.to_bytes()?;
        atomic_write_async(path.to_path_buf(), bytes)
            .await
            .map_err(|e| TdpmError::file_system("write manifest", path, e))?;
        debug!(path = %path.display(), modified = document.is_modified(), "Wrote manifest");
        Ok(())
    }

    /// Locks, reads, transforms and writes an existing manifest.
    ///
    /// `change` receives the current manifest and returns the manifest to persist plus
    /// a value handed back to the caller. Nothing is written if `change` fails or the
    /// returned future is dropped before completion.
    ///
    /// # Errors
    ///
    /// - [`TdpmError::ManifestLocked`] if another operation holds the lock
    /// - any error of [`read`](Self::read), `change` or [`write`](Self::write)
    pub async fn transform<F, Fut, T>(&self, path: &Path, change: F) -> Result<T, TdpmError>
    where
        F: FnOnce(Manifest) -> Fut,
        Fut: Future<Output = Result<(Manifest, T), TdpmError>>,
    {
        self.transform_inner(path, false, change).await
    }

    /// Like [`transform`](Self::transform), but starts from an empty manifest with
    /// default formatting when the file does not exist yet.
    pub async fn transform_or_create<F, Fut, T>(
        &self,
        path: &Path,
        change: F,
    ) -> Result<T, TdpmError>
    where
        F: FnOnce(Manifest) -> Fut,
        Fut: Future<Output = Result<(Manifest, T), TdpmError>>,
    {
        self.transform_inner(path, true, change).await
    }

    async fn transform_inner<F, Fut, T>(
        &self,
        path: &Path,
        create: bool,
        change: F,
    ) -> Result<T, TdpmError>
    where
        F: FnOnce(Manifest) -> Fut,
        Fut: Future<Output = Result<(Manifest, T), TdpmError>>,
    {
        let project_dir = project_dir_of(path);
        let _lock = ManifestLock::try_acquire(&project_dir, path).await?;

        let mut document = match self.read(path).await {
            Ok(document) => document,
            Err(TdpmError::Manifest(ManifestError::NotFound { .. })) if create => {
                debug!(path = %path.display(), "Creating new manifest");
                ManifestDocument::default()
            }
            Err(e) => return Err(e),
        };

        let (manifest, output) = change(document.manifest.clone()).await?;
        document.manifest = manifest;
        self.write(path, &document).await?;
        Ok(output)
    }
}

fn project_dir_of(manifest_path: &Path) -> PathBuf {
    match manifest_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
