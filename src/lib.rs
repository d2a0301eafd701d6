//! TDPM - Type Definition Package Manager
//!
//! Installs named, versioned definition files (such as `.d.ts` typings) from a remote
//! registry into a project, resolving their transitive dependencies and pinning the
//! result in the project's manifest.
//!
//! # Architecture Overview
//!
//! A project is any directory containing `tdpm.json`. The manifest holds two things:
//! - `declarations` - what the user asked for: a name, an optional ref and a kind
//!   (runtime, dev or ambient)
//! - `resolved` - what was installed: the concrete ref, content URL, install path and
//!   checksum of every artifact in the dependency graph
//!
//! An install reads the declarations, resolves the full graph against the registry,
//! fetches every artifact's content, writes the files under the artifact directory
//! (`typings/` by default), deletes files of artifacts that dropped out of the graph and
//! finally rewrites `resolved`. The manifest is locked for the whole operation and is
//! written only after every file was fetched, so a failed or cancelled install leaves it
//! untouched.
//!
//! # Core Modules
//!
//! - [`manifest`] - manifest model, format-preserving load/save and the project lock
//! - [`resolver`] - breadth-first dependency resolution and conflict handling
//! - [`installer`] - install and uninstall on top of the resolver
//! - [`source`] - the registry convention for artifact headers and content
//! - [`fetch`] - HTTP retrieval with retries and conditional revalidation
//! - [`cache`] - the on-disk content store keyed by normalized URL
//! - [`version`] - ref comparison used to pick conflict winners
//! - [`config`] - global configuration (`~/.tdpm/config.toml`)
//! - [`cli`] - the `tdpm` command line
//! - [`core`] - error types and user-facing error rendering
//! - [`utils`] - atomic file writes, checksums and progress spinners
//!
//! # Manifest Format (tdpm.json)
//!
//! ```json
//! {
//!   "declarations": [
//!     { "name": "lodash", "ref": "4.17.21", "kind": "runtime" },
//!     { "name": "node", "kind": "ambient" }
//!   ],
//!   "resolved": {
//!     "lodash": {
//!       "ref": "4.17.21",
//!       "url": "https://registry.tdpm.dev/lodash/4.17.21/index.d.ts",
//!       "path": "typings/lodash/index.d.ts",
//!       "checksum": "sha256:..."
//!     }
//!   }
//! }
//! ```
//!
//! Unknown top-level fields are kept, and an unchanged manifest is written back byte
//! for byte.
//!
//! # Command-Line Usage
//!
//! ```bash
//! tdpm install lodash@4.17.21
//! tdpm install -A node
//! tdpm install                 # re-sync with tdpm.json
//! tdpm uninstall lodash
//! tdpm cache info
//! ```

pub mod cache;
pub mod cli;
pub mod config;
pub mod constants;
pub mod core;
pub mod fetch;
pub mod installer;
pub mod manifest;
pub mod resolver;
pub mod source;
pub mod utils;
pub mod version;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
