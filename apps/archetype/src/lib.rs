//! # archetype
//!
//! Library half of the archetype binary: CLI definitions, configuration and
//! the filesystem descriptor source. Split out so integration tests can
//! drive commands without spawning a process.

pub mod cli;
pub mod config;
pub mod error;
pub mod source;

pub use config::{Config, LogFormat};
pub use error::CliError;
pub use source::DirectorySource;
