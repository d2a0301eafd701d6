//! Manifest data model (`tdpm.json`).
//!
//! The manifest records what the user asked for and what was resolved for it:
//!
//! ```json
//! {
//!   "declarations": [
//!     { "name": "a", "ref": "1.0", "kind": "runtime" },
//!     { "name": "node", "kind": "ambient" }
//!   ],
//!   "resolved": {
//!     "a": {
//!       "ref": "1.0",
//!       "url": "https://registry.tdpm.dev/a/1.0/index.d.ts",
//!       "path": "typings/a/index.d.ts",
//!       "checksum": "sha256:…"
//!     }
//!   }
//! }
//! ```
//!
//! - `declarations` are root-level intents, unique by name within a [`SaveKind`]
//! - `resolved` maps every installed name (roots and transitive dependencies) to the
//!   [`ResolvedReference`] chosen for it, sorted by name
//! - any other top-level field is preserved verbatim across rewrites
//!
//! Reading, writing and locking live in [`store`] and [`lock`]; project discovery in
//! [`helpers`].

pub mod helpers;
pub mod lock;
pub mod store;

pub use helpers::{find_project_root, manifest_path, require_project_root};
pub use lock::ManifestLock;
pub use store::{JsonFormat, ManifestDocument, ManifestStore};

use crate::core::TdpmError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Which dependency group a declaration belongs to.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum SaveKind {
    /// Needed by the project at runtime (`--save`)
    #[default]
    Runtime,
    /// Needed only during development (`--save-dev`)
    Dev,
    /// Global/ambient definitions (`--save-ambient`)
    Ambient,
}

impl fmt::Display for SaveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Runtime => write!(f, "runtime"),
            Self::Dev => write!(f, "dev"),
            Self::Ambient => write!(f, "ambient"),
        }
    }
}

/// A root-level request for a named artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Declaration {
    /// Artifact name
    pub name: String,
    /// Version or commit selector; `None` means latest
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    /// Dependency group
    #[serde(default)]
    pub kind: SaveKind,
}

impl Declaration {
    /// Creates a declaration.
    pub fn new(name: impl Into<String>, reference: Option<&str>, kind: SaveKind) -> Self {
        Self {
            name: name.into(),
            reference: reference.map(str::to_string),
            kind,
        }
    }

    /// Parses `name` or `name@ref` (`@scope/name@ref` for scoped names) and validates
    /// both parts.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use tdpm_cli::manifest::{Declaration, SaveKind};
    ///
    /// let decl = Declaration::parse("@types/node@18.0.0", SaveKind::Ambient).unwrap();
    /// assert_eq!(decl.name, "@types/node");
    /// assert_eq!(decl.reference.as_deref(), Some("18.0.0"));
    ///
    /// assert!(Declaration::parse("../evil", SaveKind::Runtime).is_err());
    /// assert!(Declaration::parse("a@../../evil", SaveKind::Runtime).is_err());
    /// ```
    pub fn parse(spec: &str, kind: SaveKind) -> Result<Self, TdpmError> {
        // Skip a leading '@' so the scope marker is not mistaken for the ref separator.
        let split = spec.char_indices().skip(1).filter(|(_, c)| *c == '@').map(|(i, _)| i).last();
        let (name, reference) = match split {
            Some(index) => {
                let reference = &spec[index + 1..];
                if reference.is_empty() {
                    return Err(TdpmError::InvalidDeclaration {
                        name: spec.to_string(),
                        reason: "empty ref after '@'".to_string(),
                    });
                }
                (&spec[..index], Some(reference))
            }
            None => (spec, None),
        };
        let declaration = Self::new(name, reference, kind);
        declaration.validate()?;
        Ok(declaration)
    }

    /// Checks the name and, if present, the ref.
    pub fn validate(&self) -> Result<(), TdpmError> {
        validate_name(&self.name)?;
        if let Some(reference) = &self.reference {
            validate_ref(reference).map_err(|e| match e {
                TdpmError::InvalidDeclaration { reason, .. } => TdpmError::InvalidDeclaration {
                    name: self.to_string(),
                    reason,
                },
                other => other,
            })?;
        }
        Ok(())
    }
}

impl fmt::Display for Declaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reference {
            Some(reference) => write!(f, "{}@{reference}", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

impl FromStr for Declaration {
    type Err = TdpmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s, SaveKind::default())
    }
}

/// Checks that `name` can be used as a registry path segment and local directory.
///
/// Allowed: `[A-Za-z0-9._-]` segments not starting with `.`, with an optional
/// `@scope/` prefix.
pub fn validate_name(name: &str) -> Result<(), TdpmError> {
    let invalid = |reason: &str| TdpmError::InvalidDeclaration {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("name is empty"));
    }

    let segments: Vec<&str> = match name.strip_prefix('@') {
        Some(scoped) => {
            let Some((scope, rest)) = scoped.split_once('/') else {
                return Err(invalid("scoped names must look like '@scope/name'"));
            };
            vec![scope, rest]
        }
        None => vec![name],
    };

    for segment in segments {
        if segment.is_empty() {
            return Err(invalid("empty path segment"));
        }
        if segment.starts_with('.') {
            return Err(invalid("segments may not start with '.'"));
        }
        if let Some(c) =
            segment.chars().find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
        {
            return Err(invalid(&format!("unexpected character '{c}'")));
        }
    }
    Ok(())
}

/// Checks that a ref (selector or resolved version) is a single registry path segment.
///
/// Rejects empty refs, `.`/`..`, separators (`/`, `\`), URL delimiters (`?`, `#`,
/// `%`), whitespace and control characters.
pub fn validate_ref(reference: &str) -> Result<(), TdpmError> {
    let invalid = |reason: String| TdpmError::InvalidDeclaration {
        name: reference.to_string(),
        reason,
    };

    if reference.is_empty() {
        return Err(invalid("ref is empty".to_string()));
    }
    if reference.starts_with('.') {
        return Err(invalid(format!("ref '{reference}' may not start with '.'")));
    }
    if let Some(c) = reference
        .chars()
        .find(|c| matches!(c, '/' | '\\' | '?' | '#' | '%') || c.is_whitespace() || c.is_control())
    {
        return Err(invalid(format!("ref '{reference}' contains {c:?}")));
    }
    Ok(())
}

/// The concrete artifact chosen for a name.
///
/// The name is the key of the manifest's `resolved` map and is not repeated inside the
/// serialized entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedReference {
    /// Artifact name
    #[serde(skip)]
    pub name: String,
    /// Concrete version or commit
    #[serde(rename = "ref")]
    pub resolved_ref: String,
    /// Fetch key of the artifact content
    pub url: String,
    /// Install location relative to the project root, `/`-separated
    pub path: String,
    /// `sha256:<hex>` of the installed bytes, recorded by the installer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

/// In-memory form of `tdpm.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Root declarations in file order
    #[serde(default)]
    pub declarations: Vec<Declaration>,
    /// Currently installed references keyed by name
    #[serde(default)]
    pub resolved: BTreeMap<String, ResolvedReference>,
    /// Unknown top-level fields, kept verbatim
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Manifest {
    /// Adds a declaration, replacing any existing one with the same name and kind.
    ///
    /// A replaced declaration keeps its position; a new one is appended. Returns the
    /// declaration that was replaced.
    pub fn upsert_declaration(&mut self, declaration: Declaration) -> Option<Declaration> {
        match self
            .declarations
            .iter_mut()
            .find(|d| d.name == declaration.name && d.kind == declaration.kind)
        {
            Some(existing) => Some(std::mem::replace(existing, declaration)),
            None => {
                self.declarations.push(declaration);
                None
            }
        }
    }

    /// Removes the declarations named in `names`, restricted to `kind` when given.
    ///
    /// Returns the removed declarations and the names that matched nothing.
    pub fn remove_declarations(
        &mut self,
        names: &[String],
        kind: Option<SaveKind>,
    ) -> (Vec<Declaration>, Vec<String>) {
        let matches = |d: &Declaration, name: &str| d.name == name && kind.is_none_or(|k| d.kind == k);

        let not_declared: Vec<String> = names
            .iter()
            .filter(|name| !self.declarations.iter().any(|d| matches(d, name)))
            .cloned()
            .collect();

        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.declarations)
            .into_iter()
            .partition(|d| names.iter().any(|name| matches(d, name)));
        self.declarations = kept;

        (removed, not_declared)
    }

    /// Finds the declaration for `name` in `kind`.
    #[must_use]
    pub fn declaration(&self, name: &str, kind: SaveKind) -> Option<&Declaration> {
        self.declarations.iter().find(|d| d.name == name && d.kind == kind)
    }

    /// Restores the `name` field of resolved entries from their map keys.
    pub(crate) fn hydrate_resolved_names(&mut self) {
        for (name, reference) in &mut self.resolved {
            reference.name.clone_from(name);
        }
    }
}
