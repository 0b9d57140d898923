//! # Configuration
//!
//! Settings come from three layers, later layers winning:
//!
//! 1. `archetype.toml` (explicit `--config`, else the working directory)
//! 2. Environment (`ARCHETYPE_LOG_FORMAT`)
//! 3. Command-line flags
//!
//! ```toml
//! [descriptors]
//! paths = ["archetypes", "local/overrides.toml"]
//!
//! [logging]
//! format = "json"
//! filter = "archetype=debug"
//!
//! [query]
//! default_max_results = 100
//!
//! [lookups]
//! "lookup.species" = ["CANINE", "FELINE"]
//! ```

use crate::error::CliError;
use crate::source::read_limited;
use archetype_core::StaticLookups;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Default configuration file name, looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "archetype.toml";

/// Environment variable selecting the log format (`text` or `json`).
pub const LOG_FORMAT_ENV: &str = "ARCHETYPE_LOG_FORMAT";

/// Maximum configuration file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub descriptors: DescriptorsConfig,
    pub logging: LoggingConfig,
    pub query: QueryConfig,
    /// Codes of remote lookup sources, keyed by source name.
    pub lookups: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DescriptorsConfig {
    /// Directories or individual files, loaded in order.
    pub paths: Vec<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "text" => Some(Self::Text),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// `EnvFilter` directives; `RUST_LOG` takes precedence.
    pub filter: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QueryConfig {
    /// Row limit applied to compiled queries that set none.
    pub default_max_results: Option<usize>,
}

impl Config {
    /// Parse configuration text. Relative descriptor paths resolve against `base`.
    pub fn from_toml_str(text: &str, origin: &Path, base: &Path) -> Result<Self, CliError> {
        let mut config: Self = toml::from_str(text).map_err(|e| CliError::Config {
            path: origin.to_path_buf(),
            reason: e.to_string(),
        })?;
        for path in &mut config.descriptors.paths {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
        Ok(config)
    }

    /// Load the explicit file, else `archetype.toml` in `cwd` if present,
    /// else defaults.
    pub fn load(explicit: Option<&Path>, cwd: &Path) -> Result<Self, CliError> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let candidate = cwd.join(CONFIG_FILE_NAME);
                if !candidate.is_file() {
                    tracing::debug!("no configuration file, using defaults");
                    return Ok(Self::default());
                }
                candidate
            }
        };

        let text = read_limited(&path, MAX_CONFIG_FILE_SIZE)?;
        let base = path.parent().map_or_else(|| cwd.to_path_buf(), Path::to_path_buf);
        Self::from_toml_str(&text, &path, &base)
    }

    /// Apply environment overrides read through `var`.
    ///
    /// Any log format other than `json` selects text.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(value) = var(LOG_FORMAT_ENV) {
            self.logging.format = LogFormat::parse(&value).unwrap_or_default();
        }
    }

    /// Lookup resolver over the `[lookups]` table.
    #[must_use]
    pub fn lookups(&self) -> StaticLookups {
        self.lookups
            .iter()
            .fold(StaticLookups::new(), |lookups, (source, codes)| {
                lookups.with(source, codes.iter().cloned())
            })
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use archetype_core::LookupResolver;

    fn parse(text: &str) -> Result<Config, CliError> {
        Config::from_toml_str(text, Path::new("archetype.toml"), Path::new("/etc/practice"))
    }

    #[test]
    fn empty_text_is_default() {
        assert_eq!(parse("").expect("parse"), Config::default());
    }

    #[test]
    fn full_file() {
        let config = parse(
            r#"
[descriptors]
paths = ["archetypes", "/opt/shared"]

[logging]
format = "json"
filter = "archetype=debug"

[query]
default_max_results = 50

[lookups]
"lookup.species" = ["CANINE", "FELINE"]
"#,
        )
        .expect("parse");

        assert_eq!(
            config.descriptors.paths,
            vec![
                PathBuf::from("/etc/practice/archetypes"),
                PathBuf::from("/opt/shared")
            ]
        );
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.filter.as_deref(), Some("archetype=debug"));
        assert_eq!(config.query.default_max_results, Some(50));

        let lookups = config.lookups();
        assert!(lookups.contains("lookup.species", "FELINE"));
        assert!(!lookups.contains("lookup.species", "EQUINE"));
    }

    #[test]
    fn unknown_keys_rejected() {
        let err = parse("[query]\nmax = 3\n").expect_err("unknown key");
        assert!(matches!(err, CliError::Config { .. }));
    }

    #[test]
    fn env_overrides_log_format() {
        let mut config = Config::default();
        config.apply_env(|key| (key == LOG_FORMAT_ENV).then(|| "JSON".to_string()));
        assert_eq!(config.logging.format, LogFormat::Json);

        config.apply_env(|_| None);
        assert_eq!(config.logging.format, LogFormat::Json);

        config.apply_env(|_| Some("yaml".to_string()));
        assert_eq!(config.logging.format, LogFormat::Text);
    }

    #[test]
    fn missing_default_file_gives_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert_eq!(
            Config::load(None, dir.path()).expect("load"),
            Config::default()
        );
    }

    #[test]
    fn explicit_file_must_exist() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("missing.toml");
        assert!(matches!(
            Config::load(Some(&missing), dir.path()),
            Err(CliError::Io { .. })
        ));
    }

    #[test]
    fn default_file_in_working_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "[descriptors]\npaths = [\"defs\"]\n",
        )
        .expect("write");

        let config = Config::load(None, dir.path()).expect("load");
        assert_eq!(config.descriptors.paths, vec![dir.path().join("defs")]);
    }
}
