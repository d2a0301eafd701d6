//! Core types for TDPM
//!
//! This module holds the error taxonomy shared by every layer of the engine.
//!
//! # Error Management
//! - **Strongly-typed errors** ([`TdpmError`], [`FetchError`], [`ManifestError`],
//!   [`ResolutionError`]) for precise handling in code
//! - **User-friendly contexts** ([`ErrorContext`]) with actionable suggestions for CLI users
//! - [`user_friendly_error`] converts any `anyhow::Error` into that format

pub mod error;

pub use error::{
    ErrorContext, FetchError, ManifestError, ResolutionError, TdpmError, user_friendly_error,
};
