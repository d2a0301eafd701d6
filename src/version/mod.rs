//! Reference selector classification and ordering.
//!
//! A reference selector (the `ref` of a declaration) names either an immutable
//! artifact revision or a moving target:
//!
//! - **Versions**: `1`, `1.0`, `1.0.0`, `v2.1.3`, `1.0.0-beta.1` — pinned
//! - **Commits**: 7 to 40 hexadecimal characters — pinned
//! - **Everything else** (`latest`, `master`, `next`, an absent ref) — mutable
//!
//! Pinned content may be served from the content cache without revalidation; mutable
//! content is always revalidated.
//!
//! [`compare_refs`] defines the total order used to pick a winner when one name is
//! resolved to several refs in a single pass: versions compare semantically and rank
//! above non-version refs, which compare lexically.

use semver::Version;
use std::cmp::Ordering;

/// Parses a ref leniently as a semantic version.
///
/// Accepts an optional `v`/`V` prefix and one to three numeric components
/// (`1` → `1.0.0`, `1.2` → `1.2.0`), with optional pre-release and build suffixes.
#[must_use]
pub fn parse_lenient(reference: &str) -> Option<Version> {
    let cleaned = reference
        .strip_prefix('v')
        .or_else(|| reference.strip_prefix('V'))
        .unwrap_or(reference);
    if let Ok(version) = Version::parse(cleaned) {
        return Some(version);
    }

    // Pad missing minor/patch components before the pre-release/build suffix.
    let split = cleaned.find(['-', '+']).unwrap_or(cleaned.len());
    let (core, suffix) = cleaned.split_at(split);
    let components: Vec<&str> = core.split('.').collect();
    if components.is_empty()
        || components.len() > 2
        || components.iter().any(|c| c.is_empty() || !c.chars().all(|ch| ch.is_ascii_digit()))
    {
        return None;
    }
    let padded = match components.len() {
        1 => format!("{core}.0.0{suffix}"),
        _ => format!("{core}.0{suffix}"),
    };
    Version::parse(&padded).ok()
}

/// Returns `true` for refs that look like a commit hash.
#[must_use]
pub fn is_commit_sha(reference: &str) -> bool {
    (7..=40).contains(&reference.len()) && reference.chars().all(|c| c.is_ascii_hexdigit())
}

/// Returns `true` if content addressed by `reference` can never change.
///
/// An absent ref means "latest" and is therefore mutable.
#[must_use]
pub fn is_pinned(reference: Option<&str>) -> bool {
    reference.is_some_and(|r| parse_lenient(r).is_some() || is_commit_sha(r))
}

/// Total order over refs used for deterministic conflict resolution.
///
/// Versions compare by semver precedence (ties broken lexically so `v1.0` and `1.0`
/// stay distinct); any version is greater than any non-version ref; non-version refs
/// compare lexically.
#[must_use]
pub fn compare_refs(a: &str, b: &str) -> Ordering {
    match (parse_lenient(a), parse_lenient(b)) {
        (Some(va), Some(vb)) => va.cmp(&vb).then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => a.cmp(b),
    }
}
