//! Shared data model for the embedpack workspace.
//!
//! This crate provides the types every other crate agrees on:
//! - The target runtime version triple and its parse/format rules.
//! - The target platform identifier.
//! - The explicit build configuration (roots, derived paths, artifact
//!   names) that one pipeline run operates against.

mod config;
mod version;

pub use config::{BuildConfig, DEFAULT_BOOTSTRAP_BASE, Platform};
pub use version::{PythonVersion, VersionComponent, VersionParseError};
