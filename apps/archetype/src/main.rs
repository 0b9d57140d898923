//! # Archetype - metadata-driven objects
//!
//! The command-line front end of the archetype engine.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                 apps/archetype (THE BINARY)               │
//! │                                                           │
//! │  ┌─────────────┐   ┌──────────────┐   ┌───────────────┐   │
//! │  │    CLI      │   │    Config    │   │  Descriptor   │   │
//! │  │   (clap)    │   │    (toml)    │   │  files (fs)   │   │
//! │  └──────┬──────┘   └──────┬───────┘   └───────┬───────┘   │
//! │         └─────────────────┼───────────────────┘           │
//! │                           ▼                               │
//! │                  ┌────────────────┐                       │
//! │                  │ archetype-core │                       │
//! │                  │  (THE LOGIC)   │                       │
//! │                  └────────────────┘                       │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! archetype -d archetypes check
//! archetype -d archetypes list 'party.customer*'
//! archetype -d archetypes validate -f customer.json
//! archetype -d archetypes --json-mode compile -f query.json
//! ```

use archetype::cli;
use archetype::config::{LogFormat, LoggingConfig};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    let cli = cli::Cli::parse();

    let config = match cli::load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    init_tracing(&config.logging, cli.verbose);

    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    if let Err(e) = cli::run(&cli, &config) {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Install the subscriber. `RUST_LOG` wins over the configured filter;
/// logs go to stderr so stdout stays parseable.
fn init_tracing(logging: &LoggingConfig, verbose: bool) {
    let default_filter = if verbose {
        "archetype=debug,archetype_core=debug"
    } else {
        "archetype=info,archetype_core=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        logging
            .filter
            .as_deref()
            .unwrap_or(default_filter)
            .into()
    });

    match logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

/// Print the startup banner.
fn print_banner() {
    eprintln!("archetype v{}", env!("CARGO_PKG_VERSION"));
}
