//! # Descriptor Model
//!
//! In-memory archetype metadata: what nodes an archetype has and which
//! assertions constrain them.
//!
//! Descriptors are immutable once a cache is built and are shared by `Arc`
//! across every consumer for the lifetime of the snapshot that owns them.
//!
//! ## Submodules
//!
//! - `assertion`: typed views over the generic assertion properties
//! - `source`: raw definitions and the `DescriptorSource` seam
//! - `cache`: the indexed snapshot and the atomically swapped registry

pub mod assertion;
pub mod cache;
pub mod source;

pub use assertion::{ArchetypeRange, LookupAssertion, LookupSource, RangeEntry, RegexAssertion};
pub use cache::{ArchetypeDescriptorCache, DescriptorRegistry};
pub use source::{
    ArchetypeDef, DescriptorSet, DescriptorSource, NodeDef, SourceFormat, StaticSource, TextSource,
};

use crate::primitives::ARCHETYPE_RANGE;
use crate::{ArchetypeId, Value};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

// =============================================================================
// CARDINALITY
// =============================================================================

/// Upper bound on the number of values a node may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Cardinality {
    Bounded(u32),
    Unbounded,
}

impl Cardinality {
    /// Does `count` stay within this bound?
    #[must_use]
    pub fn admits(self, count: usize) -> bool {
        match self {
            Self::Bounded(max) => count <= max as usize,
            Self::Unbounded => true,
        }
    }

    #[must_use]
    pub fn is_unbounded(self) -> bool {
        matches!(self, Self::Unbounded)
    }
}

impl Default for Cardinality {
    fn default() -> Self {
        Self::Bounded(1)
    }
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bounded(n) => write!(f, "{}", n),
            Self::Unbounded => f.write_str("*"),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawCardinality {
    Int(i64),
    Text(String),
}

impl<'de> Deserialize<'de> for Cardinality {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::Error;

        match RawCardinality::deserialize(deserializer)? {
            // -1 is the conventional "unbounded" marker in descriptor files.
            RawCardinality::Int(-1) => Ok(Self::Unbounded),
            RawCardinality::Int(n) => u32::try_from(n)
                .map(Self::Bounded)
                .map_err(|_| D::Error::custom(format!("invalid cardinality {}", n))),
            RawCardinality::Text(s) if s == "*" || s == "unbounded" => Ok(Self::Unbounded),
            RawCardinality::Text(s) => s
                .parse::<u32>()
                .map(Self::Bounded)
                .map_err(|_| D::Error::custom(format!("invalid cardinality '{}'", s))),
        }
    }
}

impl Serialize for Cardinality {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Bounded(n) => serializer.serialize_u32(*n),
            Self::Unbounded => serializer.serialize_str("*"),
        }
    }
}

// =============================================================================
// NODE TYPE
// =============================================================================

/// Declared value type of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    #[default]
    String,
    Integer,
    Boolean,
    /// Reference to an independently persisted object.
    Reference,
    /// Object composed into (owned by) its parent.
    Object,
}

// =============================================================================
// ASSERTIONS
// =============================================================================

/// A generic assertion property: text, number, flag, list or map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Property {
    Bool(bool),
    Int(i64),
    Text(String),
    List(Vec<Property>),
    Map(BTreeMap<String, Property>),
}

impl Property {
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&[Property]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_map(&self) -> Option<&BTreeMap<String, Property>> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }
}

/// A named rule attached to a node, with its parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionDescriptor {
    pub name: String,
    #[serde(default)]
    pub properties: BTreeMap<String, Property>,
}

impl AssertionDescriptor {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: Property) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn property(&self, key: &str) -> Option<&Property> {
        self.properties.get(key)
    }
}

/// A declared assertion type. Nodes may only use declared types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionTypeDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

// =============================================================================
// NODE DESCRIPTOR
// =============================================================================

/// A named field or relationship of an archetype.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeDescriptor {
    pub name: String,
    pub display_name: String,
    pub node_type: NodeType,
    /// Path expression of the node on the stored object, e.g. `/details/species`.
    pub path: String,
    pub min_cardinality: u32,
    pub max_cardinality: Cardinality,
    pub derived: bool,
    pub read_only: bool,
    pub hidden: bool,
    pub default_value: Option<Value>,
    pub assertions: Vec<AssertionDescriptor>,
    /// `regularExpression` assertions compiled at load, keyed by expression.
    pub(crate) regexes: BTreeMap<String, Arc<RegexAssertion>>,
}

impl NodeDescriptor {
    /// A node holds a collection when it may hold more than one value.
    #[must_use]
    pub fn is_collection(&self) -> bool {
        match self.max_cardinality {
            Cardinality::Unbounded => true,
            Cardinality::Bounded(max) => max > 1,
        }
    }

    /// The node must hold at least one value.
    #[must_use]
    pub fn is_required(&self) -> bool {
        self.min_cardinality > 0
    }

    #[must_use]
    pub fn assertion(&self, name: &str) -> Option<&AssertionDescriptor> {
        self.assertions.iter().find(|a| a.name == name)
    }

    /// The load-time compiled form of a `regularExpression` assertion.
    ///
    /// `None` for descriptors built by hand rather than loaded by a cache.
    #[must_use]
    pub fn compiled_regex(&self, assertion: &AssertionDescriptor) -> Option<&RegexAssertion> {
        RegexAssertion::expression_of(assertion)
            .and_then(|expression| self.regexes.get(expression))
            .map(AsRef::as_ref)
    }

    /// The `archetypeRange` assertion, if the node declares one.
    ///
    /// Shape was checked when the cache loaded, so a parse failure here
    /// only happens for hand-built descriptors and is reported as `None`.
    #[must_use]
    pub fn archetype_range(&self) -> Option<ArchetypeRange> {
        self.assertion(ARCHETYPE_RANGE)
            .and_then(|a| ArchetypeRange::from_descriptor(a).ok())
    }

    /// Store property path: `/details/species` becomes `details.species`.
    #[must_use]
    pub fn store_path(&self) -> String {
        self.path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .collect::<Vec<_>>()
            .join(".")
    }
}

// =============================================================================
// ARCHETYPE DESCRIPTOR
// =============================================================================

/// Metadata of one archetype.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchetypeDescriptor {
    id: ArchetypeId,
    display_name: String,
    backing_type: String,
    primary: bool,
    nodes: Vec<NodeDescriptor>,
    index: BTreeMap<String, usize>,
}

impl ArchetypeDescriptor {
    /// Assemble a descriptor. Node names must already be unique.
    #[must_use]
    pub fn new(
        id: ArchetypeId,
        display_name: impl Into<String>,
        backing_type: impl Into<String>,
        primary: bool,
        nodes: Vec<NodeDescriptor>,
    ) -> Self {
        let index = nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (node.name.clone(), i))
            .collect();
        Self {
            id,
            display_name: display_name.into(),
            backing_type: backing_type.into(),
            primary,
            nodes,
            index,
        }
    }

    #[must_use]
    pub fn id(&self) -> &ArchetypeId {
        &self.id
    }

    #[must_use]
    pub fn short_name(&self) -> &str {
        self.id.short_name()
    }

    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Storage class/table the archetype's instances live in.
    #[must_use]
    pub fn backing_type(&self) -> &str {
        &self.backing_type
    }

    /// Non-primary archetypes are only reachable through their parents.
    #[must_use]
    pub fn is_primary(&self) -> bool {
        self.primary
    }

    #[must_use]
    pub fn node(&self, name: &str) -> Option<&NodeDescriptor> {
        self.index.get(name).map(|&i| &self.nodes[i])
    }

    /// Nodes in declaration order.
    pub fn nodes(&self) -> impl Iterator<Item = &NodeDescriptor> {
        self.nodes.iter()
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

// =============================================================================
// TESTS
// =============================================================================
