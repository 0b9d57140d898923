//! # Filesystem Descriptor Source
//!
//! Reads descriptor files from disk for the core cache.
//!
//! Each configured path is either a single `.toml`/`.json` file or a
//! directory whose descriptor files are loaded in file-name order. Paths
//! are processed in the order given, so declaration order (and therefore
//! wildcard result order) is stable between runs.

use crate::error::CliError;
use archetype_core::{DescriptorLoadError, DescriptorSet, DescriptorSource};
use archetype_core::descriptor::SourceFormat;
use std::path::{Path, PathBuf};

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum size of one descriptor file (16 MB).
pub const MAX_DESCRIPTOR_FILE_SIZE: u64 = 16 * 1024 * 1024;

/// Read a text file after checking it is a regular file under `max_size` bytes.
pub fn read_limited(path: &Path, max_size: u64) -> Result<String, CliError> {
    let io_error = |e: std::io::Error| CliError::Io {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };

    let metadata = std::fs::metadata(path).map_err(io_error)?;
    if !metadata.is_file() {
        return Err(CliError::Io {
            path: path.to_path_buf(),
            reason: "not a regular file".to_string(),
        });
    }
    if metadata.len() > max_size {
        return Err(CliError::TooLarge {
            path: path.to_path_buf(),
            size: metadata.len(),
            max: max_size,
        });
    }

    std::fs::read_to_string(path).map_err(io_error)
}

// =============================================================================
// DIRECTORY SOURCE
// =============================================================================

/// Descriptor source over files and directories on disk.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    paths: Vec<PathBuf>,
}

impl DirectorySource {
    #[must_use]
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths }
    }

    /// Descriptor files under the configured paths, in load order.
    pub fn files(&self) -> Result<Vec<(PathBuf, SourceFormat)>, CliError> {
        let mut files = Vec::new();
        for path in &self.paths {
            if path.is_dir() {
                let mut entries = std::fs::read_dir(path)
                    .map_err(|e| CliError::Io {
                        path: path.clone(),
                        reason: e.to_string(),
                    })?
                    .filter_map(Result::ok)
                    .map(|entry| entry.path())
                    .filter(|p| p.is_file())
                    .filter_map(|p| format_of(&p).map(|format| (p, format)))
                    .collect::<Vec<_>>();
                entries.sort_by(|(a, _), (b, _)| a.file_name().cmp(&b.file_name()));
                files.extend(entries);
            } else {
                let format = format_of(path).ok_or_else(|| CliError::Document {
                    path: path.clone(),
                    reason: "expected a .toml or .json descriptor file".to_string(),
                })?;
                files.push((path.clone(), format));
            }
        }
        Ok(files)
    }

    fn read_set(&self) -> Result<DescriptorSet, CliError> {
        let mut set = DescriptorSet::new();
        for (path, format) in self.files()? {
            let text = read_limited(&path, MAX_DESCRIPTOR_FILE_SIZE)?;
            let part = DescriptorSet::parse(&text, format).map_err(|e| CliError::Document {
                path: path.clone(),
                reason: e.to_string(),
            })?;
            tracing::debug!(
                file = %path.display(),
                archetypes = part.archetypes.len(),
                "read descriptor file"
            );
            set.merge(part);
        }
        Ok(set)
    }
}

impl DescriptorSource for DirectorySource {
    fn read(&self) -> Result<DescriptorSet, DescriptorLoadError> {
        self.read_set().map_err(|e| match e {
            CliError::Document { .. } => DescriptorLoadError::Malformed(e.to_string()),
            other => DescriptorLoadError::Source(other.to_string()),
        })
    }

    fn describe(&self) -> String {
        let paths: Vec<String> = self
            .paths
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        format!("descriptor files under [{}]", paths.join(", "))
    }
}

fn format_of(path: &Path) -> Option<SourceFormat> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .and_then(SourceFormat::from_extension)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use archetype_core::ArchetypeDescriptorCache;
    use std::fs;

    const PET: &str = r#"
[[archetype]]
name = "party.patientpet"
type = "Party"

[[archetype.node]]
name = "name"
min_cardinality = 1
"#;

    const LOCATION: &str = r#"{
        "archetype": [
            {"name": "contact.location", "type": "Contact", "node": [{"name": "address"}]}
        ]
    }"#;

    #[test]
    fn directory_files_load_in_name_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("b_pet.toml"), PET).expect("write");
        fs::write(dir.path().join("a_location.json"), LOCATION).expect("write");
        fs::write(dir.path().join("notes.txt"), "ignored").expect("write");

        let source = DirectorySource::new(vec![dir.path().to_path_buf()]);
        let files = source.files().expect("files");
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].1, SourceFormat::Json);

        let cache = ArchetypeDescriptorCache::load(&source).expect("load");
        let names: Vec<&str> = cache.iter().map(|d| d.short_name()).collect();
        assert_eq!(names, vec!["contact.location", "party.patientpet"]);
    }

    #[test]
    fn single_file_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("pet.toml");
        fs::write(&file, PET).expect("write");

        let cache =
            ArchetypeDescriptorCache::load(&DirectorySource::new(vec![file])).expect("load");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn malformed_file_names_the_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("broken.toml"), "[[archetype]\n").expect("write");

        let err = DirectorySource::new(vec![dir.path().to_path_buf()])
            .read()
            .expect_err("malformed");
        assert!(matches!(&err, DescriptorLoadError::Malformed(m) if m.contains("broken.toml")));
    }

    #[test]
    fn missing_path_is_a_source_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = DirectorySource::new(vec![dir.path().join("absent.toml")])
            .read()
            .expect_err("missing");
        assert!(matches!(err, DescriptorLoadError::Source(_)));
    }

    #[test]
    fn oversized_files_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("big.toml");
        fs::write(&file, "x".repeat(64)).expect("write");
        assert!(matches!(
            read_limited(&file, 16),
            Err(CliError::TooLarge { size: 64, .. })
        ));
    }
}
