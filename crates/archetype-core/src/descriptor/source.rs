//! # Descriptor Sources
//!
//! Raw archetype definitions as they appear in descriptor files, and the
//! `DescriptorSource` seam through which a cache receives them.
//!
//! Parsing text is a pure transformation and lives here. Reading files is
//! I/O and lives in the app layer, which implements `DescriptorSource`.
//!
//! ## TOML layout
//!
//! ```toml
//! [[assertion_type]]
//! name = "uniqueIdentity"
//!
//! [[archetype]]
//! name = "party.customerperson"
//! type = "Party"
//!
//! [[archetype.node]]
//! name = "lastName"
//! min_cardinality = 1
//!
//! [[archetype.node.assertion]]
//! name = "regularExpression"
//! properties = { expression = "[A-Za-z' -]+" }
//! ```

use super::{AssertionDescriptor, AssertionTypeDescriptor, Cardinality, NodeType};
use crate::{DescriptorLoadError, Value};
use serde::{Deserialize, Serialize};

// =============================================================================
// RAW DEFINITIONS
// =============================================================================

fn default_true() -> bool {
    true
}

/// Raw node definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDef {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default, rename = "type")]
    pub node_type: NodeType,
    /// Defaults to `/<name>`.
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub min_cardinality: u32,
    #[serde(default)]
    pub max_cardinality: Cardinality,
    #[serde(default)]
    pub derived: bool,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default, rename = "default")]
    pub default_value: Option<Value>,
    #[serde(default, rename = "assertion")]
    pub assertions: Vec<AssertionDescriptor>,
}

/// Raw archetype definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchetypeDef {
    /// Short or qualified archetype name.
    pub name: String,
    /// Backing storage class/table.
    #[serde(rename = "type")]
    pub backing_type: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default = "default_true")]
    pub primary: bool,
    #[serde(default, rename = "node")]
    pub nodes: Vec<NodeDef>,
}

/// Everything one source supplies: assertion types and archetypes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptorSet {
    #[serde(default, rename = "assertion_type")]
    pub assertion_types: Vec<AssertionTypeDescriptor>,
    #[serde(default, rename = "archetype")]
    pub archetypes: Vec<ArchetypeDef>,
}

impl DescriptorSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_toml_str(text: &str) -> Result<Self, DescriptorLoadError> {
        toml::from_str(text).map_err(|e| DescriptorLoadError::Malformed(e.to_string()))
    }

    pub fn from_json_str(text: &str) -> Result<Self, DescriptorLoadError> {
        serde_json::from_str(text).map_err(|e| DescriptorLoadError::Malformed(e.to_string()))
    }

    /// Parse text in the given format.
    pub fn parse(text: &str, format: SourceFormat) -> Result<Self, DescriptorLoadError> {
        match format {
            SourceFormat::Toml => Self::from_toml_str(text),
            SourceFormat::Json => Self::from_json_str(text),
        }
    }

    /// Append another set, keeping declaration order (self first).
    pub fn merge(&mut self, other: DescriptorSet) {
        self.assertion_types.extend(other.assertion_types);
        self.archetypes.extend(other.archetypes);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.assertion_types.is_empty() && self.archetypes.is_empty()
    }
}

/// Text formats a descriptor source may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Toml,
    Json,
}

impl SourceFormat {
    /// Guess the format from a file extension.
    #[must_use]
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

// =============================================================================
// SOURCE TRAIT
// =============================================================================

/// Supplies raw definitions to a cache at load or reload time.
///
/// Implementations may read files, bundled resources or anything else;
/// the cache only ever sees the resulting `DescriptorSet`.
pub trait DescriptorSource {
    fn read(&self) -> Result<DescriptorSet, DescriptorLoadError>;

    /// Human-readable description used in log events.
    fn describe(&self) -> String {
        "descriptor source".to_string()
    }
}

/// A source over an already-built set.
#[derive(Debug, Clone, Default)]
pub struct StaticSource(pub DescriptorSet);

impl DescriptorSource for StaticSource {
    fn read(&self) -> Result<DescriptorSet, DescriptorLoadError> {
        Ok(self.0.clone())
    }

    fn describe(&self) -> String {
        format!("static set of {} archetype(s)", self.0.archetypes.len())
    }
}

/// A source over descriptor text held in memory.
#[derive(Debug, Clone)]
pub struct TextSource {
    text: String,
    format: SourceFormat,
}

impl TextSource {
    #[must_use]
    pub fn toml(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            format: SourceFormat::Toml,
        }
    }

    #[must_use]
    pub fn json(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            format: SourceFormat::Json,
        }
    }
}

impl DescriptorSource for TextSource {
    fn read(&self) -> Result<DescriptorSet, DescriptorLoadError> {
        DescriptorSet::parse(&self.text, self.format)
    }

    fn describe(&self) -> String {
        format!("in-memory {:?} text", self.format)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const TOML: &str = r#"
[[assertion_type]]
name = "uniqueIdentity"

[[archetype]]
name = "party.customerperson"
type = "Party"
display_name = "Customer"

[[archetype.node]]
name = "lastName"
min_cardinality = 1

[[archetype.node]]
name = "contacts"
type = "object"
max_cardinality = "*"

[[archetype.node.assertion]]
name = "archetypeRange"
properties = { archetypes = ["contact.location", "contact.phoneNumber"] }
"#;

    #[test]
    fn parse_toml_set() {
        let set = DescriptorSet::from_toml_str(TOML).expect("parse");
        assert_eq!(set.assertion_types.len(), 1);
        assert_eq!(set.archetypes.len(), 1);

        let archetype = &set.archetypes[0];
        assert_eq!(archetype.backing_type, "Party");
        assert!(archetype.primary);
        assert_eq!(archetype.nodes.len(), 2);
        assert_eq!(archetype.nodes[0].min_cardinality, 1);
        assert_eq!(archetype.nodes[0].max_cardinality, Cardinality::Bounded(1));
        assert_eq!(archetype.nodes[1].max_cardinality, Cardinality::Unbounded);
        assert_eq!(archetype.nodes[1].node_type, NodeType::Object);
        assert_eq!(archetype.nodes[1].assertions[0].name, "archetypeRange");
    }

    #[test]
    fn parse_json_set() {
        let json = r#"{"archetype":[{"name":"act.customerNote","type":"Act","node":[{"name":"note"}]}]}"#;
        let set = DescriptorSet::from_json_str(json).expect("parse");
        assert_eq!(set.archetypes[0].nodes[0].name, "note");
    }

    #[test]
    fn malformed_text_is_reported() {
        let err = DescriptorSet::from_toml_str("[[archetype]]\nname = 1").expect_err("malformed");
        assert!(matches!(err, DescriptorLoadError::Malformed(_)));
    }

    #[test]
    fn merge_keeps_order() {
        let mut first = DescriptorSet::from_toml_str(TOML).expect("parse");
        let second = DescriptorSet::from_json_str(
            r#"{"archetype":[{"name":"act.customerNote","type":"Act"}]}"#,
        )
        .expect("parse");
        first.merge(second);

        let names: Vec<_> = first.archetypes.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["party.customerperson", "act.customerNote"]);
    }

    #[test]
    fn format_from_extension() {
        assert_eq!(SourceFormat::from_extension("TOML"), Some(SourceFormat::Toml));
        assert_eq!(SourceFormat::from_extension("json"), Some(SourceFormat::Json));
        assert_eq!(SourceFormat::from_extension("adl"), None);
    }
}
