//! # CLI Errors

use archetype_core::{ArchetypeError, DescriptorLoadError, QueryBuildError};
use std::path::PathBuf;
use thiserror::Error;

/// Everything a CLI command can fail with.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Cannot read '{}': {reason}", .path.display())]
    Io { path: PathBuf, reason: String },

    #[error("File '{}' is {size} bytes, larger than the {max} byte limit", .path.display())]
    TooLarge { path: PathBuf, size: u64, max: u64 },

    #[error("Malformed document '{}': {reason}", .path.display())]
    Document { path: PathBuf, reason: String },

    #[error("Invalid configuration '{}': {reason}", .path.display())]
    Config { path: PathBuf, reason: String },

    #[error("Invalid archetype pattern '{pattern}': {reason}")]
    Pattern { pattern: String, reason: String },

    #[error("No descriptor paths configured (use --descriptors or [descriptors] paths)")]
    NoDescriptors,

    /// Validation ran and reported violations.
    #[error("{0} validation error(s)")]
    Violations(usize),

    #[error(transparent)]
    Load(#[from] DescriptorLoadError),

    #[error(transparent)]
    Query(#[from] QueryBuildError),

    #[error(transparent)]
    Archetype(#[from] ArchetypeError),
}
