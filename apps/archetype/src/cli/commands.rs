//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.
//! Each command renders its output to a `Report`; printing is left to the caller.

use crate::config::Config;
use crate::error::CliError;
use crate::source::read_limited;
use archetype_core::{
    ArchetypeDescriptor, ArchetypeDescriptorCache, ArchetypeError, ArchetypeQuery, DynamicObject,
    NodeDescriptor, NodeType, QueryCompiler, ShortNamePattern, Validator,
};
use serde::de::DeserializeOwned;
use std::fmt::Write;
use std::path::Path;
use std::sync::Arc;

/// Maximum size of an object or query document (16 MB).
const MAX_DOCUMENT_SIZE: u64 = 16 * 1024 * 1024;

/// Rendered command output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    pub output: String,
    /// Validation violations found; non-zero makes the run fail.
    pub violations: usize,
}

impl Report {
    fn text(output: String) -> Self {
        Self {
            output,
            violations: 0,
        }
    }

    fn json(value: &serde_json::Value) -> Self {
        Self::text(serde_json::to_string_pretty(value).unwrap_or_default())
    }
}

fn read_document<T: DeserializeOwned>(path: &Path) -> Result<T, CliError> {
    let text = read_limited(path, MAX_DOCUMENT_SIZE)?;
    serde_json::from_str(&text).map_err(|e| CliError::Document {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn type_name(node_type: NodeType) -> String {
    serde_json::to_value(node_type)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}

// =============================================================================
// CHECK COMMAND
// =============================================================================

/// Summarise the loaded cache.
pub fn cmd_check(cache: &ArchetypeDescriptorCache, json_mode: bool) -> Report {
    let primary = cache.iter().filter(|d| d.is_primary()).count();
    let nodes: usize = cache.iter().map(|d| d.node_count()).sum();
    let assertion_types: Vec<&str> = cache.assertion_types().map(|t| t.name.as_str()).collect();

    if json_mode {
        return Report::json(&serde_json::json!({
            "archetypes": cache.len(),
            "primary": primary,
            "nodes": nodes,
            "assertion_types": assertion_types,
        }));
    }

    let mut out = String::new();
    let _ = writeln!(out, "Archetype Descriptors");
    let _ = writeln!(out, "=====================");
    let _ = writeln!(out, "Archetypes:      {} ({} primary)", cache.len(), primary);
    let _ = writeln!(out, "Nodes:           {}", nodes);
    let _ = write!(out, "Assertion types: {}", assertion_types.join(", "));
    Report::text(out)
}

// =============================================================================
// LIST COMMAND
// =============================================================================

/// List archetypes matching a pattern, in declaration order.
pub fn cmd_list(
    cache: &ArchetypeDescriptorCache,
    pattern: Option<&str>,
    primary_only: bool,
    json_mode: bool,
) -> Result<Report, CliError> {
    let text = pattern.unwrap_or("*");
    let pattern = ShortNamePattern::parse(text).map_err(|reason| CliError::Pattern {
        pattern: text.to_string(),
        reason,
    })?;
    let matches = cache.matching(&pattern, primary_only);

    if json_mode {
        let entries: Vec<serde_json::Value> = matches
            .iter()
            .map(|d| {
                serde_json::json!({
                    "short_name": d.short_name(),
                    "display_name": d.display_name(),
                    "type": d.backing_type(),
                    "primary": d.is_primary(),
                })
            })
            .collect();
        return Ok(Report::json(&serde_json::Value::Array(entries)));
    }

    if matches.is_empty() {
        return Ok(Report::text(format!("No archetypes match '{}'", text)));
    }

    let lines: Vec<String> = matches
        .iter()
        .map(|d| {
            format!(
                "{:<40} {:<20} {}",
                d.short_name(),
                d.backing_type(),
                d.display_name()
            )
        })
        .collect();
    Ok(Report::text(lines.join("\n")))
}

// =============================================================================
// DESCRIBE COMMAND
// =============================================================================

fn node_json(node: &NodeDescriptor) -> serde_json::Value {
    let assertions: Vec<&str> = node.assertions.iter().map(|a| a.name.as_str()).collect();
    serde_json::json!({
        "name": node.name,
        "display_name": node.display_name,
        "type": node.node_type,
        "path": node.path,
        "min_cardinality": node.min_cardinality,
        "max_cardinality": node.max_cardinality,
        "derived": node.derived,
        "read_only": node.read_only,
        "hidden": node.hidden,
        "default": node.default_value,
        "assertions": assertions,
    })
}

fn node_line(node: &NodeDescriptor) -> String {
    let mut flags: Vec<&str> = Vec::new();
    if node.derived {
        flags.push("derived");
    }
    if node.read_only {
        flags.push("read-only");
    }
    if node.hidden {
        flags.push("hidden");
    }
    flags.extend(node.assertions.iter().map(|a| a.name.as_str()));

    let mut line = format!(
        "    {:<20} {:<10} {:<24} {}..{}",
        node.name,
        type_name(node.node_type),
        node.path,
        node.min_cardinality,
        node.max_cardinality
    );
    if !flags.is_empty() {
        let _ = write!(line, "  [{}]", flags.join(", "));
    }
    line
}

fn describe_text(descriptor: &ArchetypeDescriptor) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} ({})",
        descriptor.short_name(),
        descriptor.display_name()
    );
    let _ = writeln!(out, "  Qualified: {}", descriptor.id().qualified_name());
    let _ = writeln!(out, "  Type:      {}", descriptor.backing_type());
    let _ = writeln!(
        out,
        "  Primary:   {}",
        if descriptor.is_primary() { "yes" } else { "no" }
    );
    let _ = write!(out, "  Nodes:");
    for node in descriptor.nodes() {
        let _ = write!(out, "\n{}", node_line(node));
    }
    out
}

/// Show one archetype's nodes and assertions.
pub fn cmd_describe(
    cache: &ArchetypeDescriptorCache,
    short_name: &str,
    json_mode: bool,
) -> Result<Report, CliError> {
    let descriptor = cache
        .get(short_name)
        .ok_or_else(|| ArchetypeError::UnknownArchetype(short_name.to_string()))?;

    if json_mode {
        let nodes: Vec<serde_json::Value> = descriptor.nodes().map(node_json).collect();
        return Ok(Report::json(&serde_json::json!({
            "short_name": descriptor.short_name(),
            "qualified_name": descriptor.id().qualified_name(),
            "display_name": descriptor.display_name(),
            "type": descriptor.backing_type(),
            "primary": descriptor.is_primary(),
            "nodes": nodes,
        })));
    }

    Ok(Report::text(describe_text(descriptor)))
}

// =============================================================================
// VALIDATE COMMAND
// =============================================================================

/// Validate an object document, counting violations into the report.
pub fn cmd_validate(
    cache: &ArchetypeDescriptorCache,
    config: &Config,
    file: &Path,
    archetype: Option<&str>,
    json_mode: bool,
) -> Result<Report, CliError> {
    let object: DynamicObject = read_document(file)?;
    let validator = Validator::new(cache).with_lookups(Arc::new(config.lookups()));

    let errors = match archetype {
        Some(short_name) => validator.validate_as(&object, short_name)?,
        None => validator.validate(&object)?,
    };
    let archetype = archetype.map_or_else(|| object.archetype_id().to_string(), str::to_string);
    tracing::debug!(file = %file.display(), %archetype, errors = errors.len(), "validated document");

    let output = if json_mode {
        serde_json::to_string_pretty(&serde_json::json!({
            "file": file.display().to_string(),
            "archetype": archetype,
            "valid": errors.is_empty(),
            "errors": errors,
        }))
        .unwrap_or_default()
    } else if errors.is_empty() {
        format!("{}: valid {}", file.display(), archetype)
    } else {
        let mut out = format!(
            "{}: {} error(s) validating {}",
            file.display(),
            errors.len(),
            archetype
        );
        for error in &errors {
            let _ = write!(out, "\n  {} [{}] {}", error.archetype, error.kind, error);
        }
        out
    };

    Ok(Report {
        output,
        violations: errors.len(),
    })
}

// =============================================================================
// COMPILE COMMAND
// =============================================================================

/// Compile a query document; the configured default row limit applies
/// when the document sets none.
pub fn cmd_compile(
    cache: &ArchetypeDescriptorCache,
    config: &Config,
    file: &Path,
    json_mode: bool,
) -> Result<Report, CliError> {
    let query: ArchetypeQuery = read_document(file)?;
    let mut compiled = QueryCompiler::new(cache).compile(&query)?;
    if compiled.max_results.is_none() {
        compiled.max_results = config.query.default_max_results;
    }

    if json_mode {
        return Ok(Report::text(
            serde_json::to_string_pretty(&compiled).unwrap_or_default(),
        ));
    }

    let mut out = compiled.text.clone();
    if !compiled.parameters.is_empty() {
        let _ = write!(out, "\n\nParameters:");
        for (name, value) in compiled.parameters.iter() {
            let _ = write!(
                out,
                "\n  {} = {}",
                name,
                serde_json::to_string(value).unwrap_or_default()
            );
        }
    }
    let _ = write!(out, "\n\nFirst result: {}", compiled.first_result);
    match compiled.max_results {
        Some(max) => {
            let _ = write!(out, "\nMax results:  {}", max);
        }
        None => {
            let _ = write!(out, "\nMax results:  all");
        }
    }
    Ok(Report::text(out))
}
