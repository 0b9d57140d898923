//! # Archetype CLI Module
//!
//! This module implements the CLI interface for the archetype tool.
//!
//! ## Available Commands
//!
//! - `check` - Load every descriptor file and summarise the cache
//! - `list` - List archetype short names, optionally filtered by a pattern
//! - `describe` - Show the nodes and assertions of one archetype
//! - `validate` - Validate a JSON object document
//! - `compile` - Compile a JSON query document into query text and parameters

mod commands;

use crate::config::Config;
use crate::error::CliError;
use crate::source::DirectorySource;
use archetype_core::ArchetypeDescriptorCache;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Archetype - metadata-driven objects
///
/// Checks archetype descriptor files, validates object documents against
/// them and compiles polymorphic query documents.
#[derive(Parser, Debug)]
#[command(name = "archetype")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file (defaults to ./archetype.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Descriptor directory or file; repeat to load several, in order
    #[arg(short, long = "descriptors", global = true)]
    pub descriptors: Vec<PathBuf>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load descriptors and print a summary
    Check,

    /// List archetypes
    List {
        /// Short name pattern, e.g. `party.customer*`
        pattern: Option<String>,

        /// Only primary archetypes
        #[arg(short, long)]
        primary: bool,
    },

    /// Describe one archetype
    Describe {
        /// Short or qualified archetype name
        short_name: String,
    },

    /// Validate an object document
    Validate {
        /// Path to the JSON object document
        #[arg(short, long)]
        file: PathBuf,

        /// Validate against this archetype instead of the document's own
        #[arg(short, long)]
        archetype: Option<String>,
    },

    /// Compile a query document
    Compile {
        /// Path to the JSON query document
        #[arg(short, long)]
        file: PathBuf,
    },
}

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Resolve configuration: file, then environment, then flags.
pub fn load_config(cli: &Cli) -> Result<Config, CliError> {
    let cwd = std::env::current_dir().map_err(|e| CliError::Io {
        path: PathBuf::from("."),
        reason: e.to_string(),
    })?;

    let mut config = Config::load(cli.config.as_deref(), &cwd)?;
    config.apply_env(|key| std::env::var(key).ok());
    if !cli.descriptors.is_empty() {
        config.descriptors.paths.clone_from(&cli.descriptors);
    }
    Ok(config)
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Load the descriptor cache named by the configuration.
pub fn load_cache(config: &Config) -> Result<ArchetypeDescriptorCache, CliError> {
    if config.descriptors.paths.is_empty() {
        return Err(CliError::NoDescriptors);
    }
    let source = DirectorySource::new(config.descriptors.paths.clone());
    Ok(ArchetypeDescriptorCache::load(&source)?)
}

/// Execute the CLI with parsed arguments, returning the command's output.
pub fn execute(cli: &Cli, config: &Config) -> Result<Report, CliError> {
    let cache = load_cache(config)?;
    let json_mode = cli.json_mode;

    match &cli.command {
        Some(Commands::List { pattern, primary }) => {
            cmd_list(&cache, pattern.as_deref(), *primary, json_mode)
        }
        Some(Commands::Describe { short_name }) => cmd_describe(&cache, short_name, json_mode),
        Some(Commands::Validate { file, archetype }) => {
            cmd_validate(&cache, config, file, archetype.as_deref(), json_mode)
        }
        Some(Commands::Compile { file }) => cmd_compile(&cache, config, file, json_mode),
        // No subcommand - check by default
        Some(Commands::Check) | None => Ok(cmd_check(&cache, json_mode)),
    }
}

/// Execute and print. Validation violations become `CliError::Violations`.
pub fn run(cli: &Cli, config: &Config) -> Result<(), CliError> {
    let report = execute(cli, config)?;
    println!("{}", report.output);
    if report.violations > 0 {
        return Err(CliError::Violations(report.violations));
    }
    Ok(())
}
