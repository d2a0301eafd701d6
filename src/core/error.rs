//! Error handling for TDPM
//!
//! This module provides the typed error taxonomy of the resolution, fetch and cache
//! engine together with user-friendly error reporting for the CLI. The error system
//! follows two principles:
//! 1. **Strongly-typed errors** so callers can react to specific failures
//!    (a locked manifest, a 404 on a transitive dependency, a malformed manifest)
//! 2. **User-friendly messages** that name the dependency path that caused a failure
//!
//! # Architecture
//!
//! - [`FetchError`] - failures of a single remote retrieval, classified as retryable or not
//! - [`ManifestError`] - the manifest file is absent or does not have the expected shape
//! - [`ResolutionError`] - a fetch failure wrapped with its position in the dependency graph
//! - [`TdpmError`] - the umbrella type returned by the manifest store, resolver and installer
//! - [`ErrorContext`] - wrapper adding details and a suggestion for terminal display
//!
//! Lower layers return their own typed failure, the resolver adds graph context and the
//! installer surfaces the result unchanged. The command layer works with [`anyhow`] and
//! turns whatever bubbles up into an [`ErrorContext`] through [`user_friendly_error`].
//!
//! # Examples
//!
//! ```rust,no_run
//! use tdpm_cli::core::{FetchError, ResolutionError, TdpmError, user_friendly_error};
//!
//! let error = TdpmError::from(ResolutionError::new(
//!     vec!["a".to_string(), "b".to_string()],
//!     FetchError::Status { status: 404, url: "https://registry.example/b/1.0/tdpm.json".into() },
//! ));
//! assert_eq!(
//!     error.to_string(),
//!     "root -> a -> b: HTTP 404 fetching https://registry.example/b/1.0/tdpm.json"
//! );
//!
//! user_friendly_error(anyhow::Error::from(error)).display();
//! ```

use colored::Colorize;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Failure of a single remote retrieval.
///
/// The variants separate failures worth retrying ([`FetchError::is_transient`]) from
/// failures that will not change on a second attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The server answered with a status other than 2xx or 304.
    #[error("HTTP {status} fetching {url}")]
    Status {
        /// HTTP status code returned by the server
        status: u16,
        /// The URL that was requested
        url: String,
    },

    /// Timeout, DNS or connection failure, or an interrupted response body.
    #[error("Network failure fetching {url}: {reason}")]
    Transient {
        /// The URL that was requested
        url: String,
        /// Underlying transport error message
        reason: String,
    },

    /// The request could not be made at all (invalid URL, unsupported scheme, unreadable
    /// local file).
    #[error("Cannot fetch {url}: {reason}")]
    Request {
        /// The URL or path that was requested
        url: String,
        /// Why the request could not be made
        reason: String,
    },

    /// The artifact header was retrieved but is not a valid header document.
    #[error("Invalid artifact header at {url}: {reason}")]
    InvalidHeader {
        /// The URL of the header document
        url: String,
        /// Parse error message
        reason: String,
    },
}

impl FetchError {
    /// Returns `true` when retrying the same request may succeed.
    ///
    /// Server errors (5xx) and transport failures are transient; client errors (4xx),
    /// request construction failures and invalid headers are not.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Status { status, .. } => *status >= 500,
            Self::Transient { .. } => true,
            Self::Request { .. } | Self::InvalidHeader { .. } => false,
        }
    }

    /// The URL this failure refers to.
    #[must_use]
    pub fn url(&self) -> &str {
        match self {
            Self::Status { url, .. }
            | Self::Transient { url, .. }
            | Self::Request { url, .. }
            | Self::InvalidHeader { url, .. } => url,
        }
    }

    /// The HTTP status, if the server answered.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// The manifest file is absent or does not have the expected shape.
///
/// Malformed manifests are reported, never repaired.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ManifestError {
    /// No manifest file exists at the given path.
    #[error("Manifest not found at {}", .path.display())]
    NotFound {
        /// Path that was read
        path: PathBuf,
    },

    /// The file is not valid JSON or does not match the manifest shape.
    #[error("Malformed manifest {}: {reason}", .path.display())]
    Malformed {
        /// Path that was read
        path: PathBuf,
        /// Parser message, including line and column
        reason: String,
    },
}

/// A fetch failure at a specific position in the dependency graph.
///
/// `path` is the chain of names from a root declaration down to `failed_node`, so the
/// message reads `root -> a -> b: HTTP 404 fetching …` and points the user at the
/// reference that needs fixing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("root -> {trail}: {cause}", trail = .path.join(" -> "))]
pub struct ResolutionError {
    /// Name of the node whose artifact could not be retrieved
    pub failed_node: String,
    /// Names from the root declaration to `failed_node`, inclusive
    pub path: Vec<String>,
    /// The innermost failure
    #[source]
    pub cause: FetchError,
}

impl ResolutionError {
    /// Builds a resolution error for the last element of `path`.
    #[must_use]
    pub fn new(path: Vec<String>, cause: FetchError) -> Self {
        Self {
            failed_node: path.last().cloned().unwrap_or_default(),
            path,
            cause,
        }
    }
}

/// The main error type for TDPM operations.
///
/// Returned by the manifest store, the resolver (through [`ResolutionError`]) and the
/// installer. Every variant is cloneable so results can be shared between tasks.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TdpmError {
    /// No project root was found and there was nothing to bootstrap one with.
    #[error("No tdpm.json found in {} or any parent directory", .cwd.display())]
    ProjectNotFound {
        /// Directory the search started from
        cwd: PathBuf,
    },

    /// The manifest could not be read.
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// Another operation is currently transforming this manifest.
    #[error("Manifest {} is locked by another tdpm operation", .path.display())]
    ManifestLocked {
        /// Path of the manifest being protected
        path: PathBuf,
    },

    /// A remote retrieval failed outside of resolution (content download).
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Resolution aborted; no partial graph is produced.
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// A declaration's name or ref is not usable in registry paths.
    #[error("Invalid dependency '{name}': {reason}")]
    InvalidDeclaration {
        /// The rejected name
        name: String,
        /// Why it was rejected
        reason: String,
    },

    /// A local file system operation failed.
    #[error("Failed to {operation} {path}: {reason}")]
    FileSystem {
        /// Short description of the operation, e.g. "write artifact"
        operation: String,
        /// Path involved
        path: String,
        /// Underlying I/O error message
        reason: String,
    },

    /// Configuration could not be loaded or is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the problem
        message: String,
    },
}

impl TdpmError {
    /// Wraps an I/O failure on `path`.
    pub fn file_system(operation: &str, path: &Path, error: impl fmt::Display) -> Self {
        Self::FileSystem {
            operation: operation.to_string(),
            path: path.display().to_string(),
            reason: error.to_string(),
        }
    }
}

/// Error context wrapper that provides user-friendly error information
///
/// Pairs a [`TdpmError`] with optional details explaining what happened and a
/// suggestion telling the user what to do about it.
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying TDPM error
    pub error: TdpmError,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Creates a new error context without suggestion or details.
    #[must_use]
    pub const fn new(error: TdpmError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    /// Adds a suggestion for resolving the error.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Adds details explaining the error.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Prints the error to stderr with colors.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

/// Converts any error into an [`ErrorContext`] with details and a suggestion.
///
/// Typed TDPM errors anywhere in the chain get tailored advice; anything else is
/// reported as a generic failure carrying the full `anyhow` chain as details.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    if let Some(tdpm_error) = error.chain().find_map(|e| e.downcast_ref::<TdpmError>()) {
        return create_error_context(tdpm_error.clone());
    }
    if let Some(resolution) = error.chain().find_map(|e| e.downcast_ref::<ResolutionError>()) {
        return create_error_context(TdpmError::Resolution(resolution.clone()));
    }
    if let Some(fetch) = error.chain().find_map(|e| e.downcast_ref::<FetchError>()) {
        return create_error_context(TdpmError::Fetch(fetch.clone()));
    }

    let chain: Vec<String> = error.chain().skip(1).map(ToString::to_string).collect();
    let context = ErrorContext::new(TdpmError::Config {
        message: error.to_string(),
    });
    if chain.is_empty() {
        context
    } else {
        context.with_details(chain.join(": "))
    }
}

fn create_error_context(error: TdpmError) -> ErrorContext {
    match &error {
        TdpmError::ProjectNotFound { .. } => ErrorContext::new(error)
            .with_suggestion("Run 'tdpm install <name>' to create a tdpm.json in this directory")
            .with_details("tdpm searches for tdpm.json in the current and parent directories"),
        TdpmError::Manifest(ManifestError::Malformed { .. }) => ErrorContext::new(error)
            .with_suggestion("Fix the JSON syntax in tdpm.json; it is never rewritten while malformed")
            .with_details(
                "tdpm.json must be an object with a 'declarations' array and a 'resolved' object",
            ),
        TdpmError::Manifest(ManifestError::NotFound { .. }) => ErrorContext::new(error)
            .with_suggestion("Check the path, or run 'tdpm install <name>' to create a manifest"),
        TdpmError::ManifestLocked { .. } => ErrorContext::new(error)
            .with_suggestion("Wait for the other tdpm command in this project to finish and retry")
            .with_details("Only one install or uninstall may modify a manifest at a time"),
        TdpmError::Resolution(resolution) => {
            let suggestion = resolution_suggestion(&resolution.cause, &resolution.failed_node);
            ErrorContext::new(error).with_suggestion(suggestion)
        }
        TdpmError::Fetch(fetch) => {
            let suggestion = resolution_suggestion(fetch, "the artifact");
            ErrorContext::new(error).with_suggestion(suggestion)
        }
        TdpmError::InvalidDeclaration { .. } => ErrorContext::new(error).with_suggestion(
            "Names may contain letters, digits, '.', '_' and '-', with an optional '@scope/' prefix; refs may not contain '/', '\\', '?', '#', '%' or whitespace",
        ),
        TdpmError::FileSystem { .. } => ErrorContext::new(error)
            .with_suggestion("Check file permissions and available disk space"),
        TdpmError::Config { .. } => ErrorContext::new(error)
            .with_suggestion("Check ~/.tdpm/config.toml or the file passed with --config"),
    }
}

fn resolution_suggestion(cause: &FetchError, node: &str) -> String {
    match cause {
        FetchError::Status { status: 404, .. } => {
            format!("Check that '{node}' exists in the registry at the requested version")
        }
        FetchError::Status { status: 401 | 403, .. } => {
            "The registry refused access; check the registry URL and credentials".to_string()
        }
        error if error.is_transient() => {
            "The registry could not be reached; check your network connection and retry"
                .to_string()
        }
        FetchError::InvalidHeader { .. } => {
            format!("The registry served an invalid header for '{node}'; report it upstream")
        }
        _ => format!("Check the reference used for '{node}'"),
    }
}
