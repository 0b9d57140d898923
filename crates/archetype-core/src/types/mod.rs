//! # Core Type Definitions
//!
//! This module contains the identifiers, values and errors shared by every
//! part of the engine:
//! - Archetype identity (`ArchetypeId`)
//! - Node values and object references (`Value`, `ObjectReference`)
//! - Error types (`DescriptorLoadError`, `QueryBuildError`, `ArchetypeError`)
//!
//! ## Determinism Guarantees
//!
//! All types in this module:
//! - Use integer values only (no floating-point)
//! - Implement `Ord` where they are used as ordered keys
//! - Render identically on every call (`Display` has no hidden state)

use crate::object::DynamicObject;
use crate::primitives::{DEFAULT_VERSION, MAX_NAME_SEGMENT_LENGTH, WILDCARD};
use crate::validation::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// =============================================================================
// ARCHETYPE IDENTITY
// =============================================================================

/// Identity of an archetype.
///
/// The short name `<entity>.<concept>` is what callers use day to day; the
/// qualified form `[<rm>-]<entity>.<concept>.<version>` additionally names the
/// reference model and version.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ArchetypeId {
    rm_name: Option<String>,
    entity_name: String,
    concept: String,
    version: String,
    short_name: String,
}

impl ArchetypeId {
    /// Build an id from its components.
    pub fn new(
        rm_name: Option<&str>,
        entity_name: &str,
        concept: &str,
        version: Option<&str>,
    ) -> Result<Self, ArchetypeError> {
        let display = format!("{}.{}", entity_name, concept);
        check_segment(&display, "entity name", entity_name)?;
        check_segment(&display, "concept", concept)?;
        if let Some(rm) = rm_name {
            check_segment(&display, "reference model name", rm)?;
        }
        let version = version.unwrap_or(DEFAULT_VERSION);
        if version.is_empty() || version.contains(WILDCARD) {
            return Err(ArchetypeError::InvalidArchetypeId {
                name: display,
                reason: "invalid version".to_string(),
            });
        }

        Ok(Self {
            rm_name: rm_name.map(str::to_string),
            entity_name: entity_name.to_string(),
            concept: concept.to_string(),
            version: version.to_string(),
            short_name: display,
        })
    }

    /// Parse a short name (`party.customerperson`) or a qualified name
    /// (`openvpms-party-party.customerperson.1.0`).
    pub fn parse(name: &str) -> Result<Self, ArchetypeError> {
        let name = name.trim();
        let (head, rest) = name
            .split_once('.')
            .ok_or_else(|| ArchetypeError::InvalidArchetypeId {
                name: name.to_string(),
                reason: "expected <entity>.<concept>".to_string(),
            })?;
        let (concept, version) = match rest.split_once('.') {
            Some((concept, version)) => (concept, Some(version)),
            None => (rest, None),
        };
        let (rm_name, entity_name) = match head.rsplit_once('-') {
            Some((rm, entity)) => (Some(rm), entity),
            None => (None, head),
        };

        Self::new(rm_name, entity_name, concept, version)
    }

    /// The `<entity>.<concept>` short name.
    #[must_use]
    pub fn short_name(&self) -> &str {
        &self.short_name
    }

    /// Reference-model name, if one was declared.
    #[must_use]
    pub fn rm_name(&self) -> Option<&str> {
        self.rm_name.as_deref()
    }

    #[must_use]
    pub fn entity_name(&self) -> &str {
        &self.entity_name
    }

    #[must_use]
    pub fn concept(&self) -> &str {
        &self.concept
    }

    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// The fully qualified name.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        match &self.rm_name {
            Some(rm) => format!("{}-{}.{}", rm, self.short_name, self.version),
            None => format!("{}.{}", self.short_name, self.version),
        }
    }
}

fn check_segment(name: &str, what: &str, segment: &str) -> Result<(), ArchetypeError> {
    let reason = if segment.is_empty() {
        Some(format!("empty {}", what))
    } else if segment.len() > MAX_NAME_SEGMENT_LENGTH {
        Some(format!("{} longer than {} bytes", what, MAX_NAME_SEGMENT_LENGTH))
    } else if segment.contains(WILDCARD) || segment.chars().any(char::is_whitespace) {
        Some(format!("{} contains a wildcard or whitespace", what))
    } else {
        None
    };

    match reason {
        Some(reason) => Err(ArchetypeError::InvalidArchetypeId {
            name: name.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

impl fmt::Display for ArchetypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.short_name)
    }
}

impl TryFrom<String> for ArchetypeId {
    type Error = ArchetypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ArchetypeId> for String {
    fn from(id: ArchetypeId) -> Self {
        // Unqualified ids round-trip through the short name.
        if id.rm_name.is_none() && id.version == DEFAULT_VERSION {
            id.short_name
        } else {
            id.qualified_name()
        }
    }
}

// =============================================================================
// OBJECT REFERENCE
// =============================================================================

/// Reference to a persistent object of some archetype.
///
/// `link_id` is the opaque relationship identifier used to correlate
/// records that are not joined by a conventional foreign key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ObjectReference {
    pub archetype: ArchetypeId,
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_id: Option<String>,
}

impl ObjectReference {
    #[must_use]
    pub fn new(archetype: ArchetypeId, id: u64) -> Self {
        Self {
            archetype,
            id,
            link_id: None,
        }
    }

    /// Attach the relationship identifier.
    #[must_use]
    pub fn with_link_id(mut self, link_id: impl Into<String>) -> Self {
        self.link_id = Some(link_id.into());
        self
    }
}

// =============================================================================
// VALUE
// =============================================================================

/// The value held by a node, or bound to a query parameter.
///
/// Money and dates travel as text; the engine never does float arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
    List(Vec<Value>),
    Reference(ObjectReference),
    Object(Box<DynamicObject>),
}

impl Value {
    /// `Null`, empty text and empty lists count as "no value".
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Text(s) => s.is_empty(),
            Self::List(items) => items.is_empty(),
            _ => false,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Textual form of a scalar value, used by pattern and lookup checks.
    #[must_use]
    pub fn scalar_text(&self) -> Option<String> {
        match self {
            Self::Text(s) => Some(s.clone()),
            Self::Int(i) => Some(i.to_string()),
            Self::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Archetype of a related object, for references and composed objects.
    #[must_use]
    pub fn archetype(&self) -> Option<&ArchetypeId> {
        match self {
            Self::Reference(reference) => Some(&reference.archetype),
            Self::Object(object) => Some(object.archetype_id()),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Text(s) => write!(f, "'{}'", s),
            Self::List(items) => write!(f, "[{} item(s)]", items.len()),
            Self::Reference(r) => write!(f, "{}#{}", r.archetype, r.id),
            Self::Object(o) => write!(f, "<{}>", o.archetype_id()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<ObjectReference> for Value {
    fn from(r: ObjectReference) -> Self {
        Self::Reference(r)
    }
}

impl From<DynamicObject> for Value {
    fn from(o: DynamicObject) -> Self {
        Self::Object(Box::new(o))
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Failures while turning a descriptor source into a cache.
///
/// Fatal at startup: a cache that failed to load is never published.
#[derive(Debug, Error)]
pub enum DescriptorLoadError {
    /// The source text could not be parsed.
    #[error("Malformed descriptor source: {0}")]
    Malformed(String),

    /// The source could not be read at all.
    #[error("Descriptor source unavailable: {0}")]
    Source(String),

    #[error("Invalid archetype name '{name}': {reason}")]
    InvalidArchetypeName { name: String, reason: String },

    #[error("Duplicate archetype: {0}")]
    DuplicateArchetype(String),

    #[error("Duplicate node '{node}' in archetype {archetype}")]
    DuplicateNode { archetype: String, node: String },

    #[error("Invalid cardinality on {archetype}/{node}: min {min} exceeds max {max}")]
    InvalidCardinality {
        archetype: String,
        node: String,
        min: u32,
        max: u32,
    },

    /// A node references an assertion type that was never declared.
    #[error("Unknown assertion type '{assertion}' on {archetype}/{node}")]
    UnknownAssertionType {
        archetype: String,
        node: String,
        assertion: String,
    },

    #[error("Invalid assertion '{assertion}' on {archetype}/{node}: {reason}")]
    InvalidAssertion {
        archetype: String,
        node: String,
        assertion: String,
        reason: String,
    },
}

/// Failures while compiling a constraint tree.
///
/// A caller error: fatal to the one query, never to the cache.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryBuildError {
    #[error("Query has no root archetype selector")]
    NoRootSelector,

    #[error("Alias '{0}' is declared more than once")]
    DuplicateAlias(String),

    /// An alias was referenced before a selector or collection introduced it.
    #[error("Unknown alias: {0}")]
    UnknownAlias(String),

    #[error("Invalid archetype selector '{name}': {reason}")]
    InvalidSelector { name: String, reason: String },

    #[error("No archetypes match selector {0}")]
    NoMatchingArchetypes(String),

    #[error("Archetypes selected by '{alias}' map to different types: {types}")]
    IncompatibleTypes { alias: String, types: String },

    #[error("Unknown node '{node}' for alias '{alias}'")]
    UnknownNode { alias: String, node: String },

    #[error("Node '{node}' has different paths across the archetypes of '{alias}'")]
    InconsistentNodePath { alias: String, node: String },

    #[error("Operator {operator} on '{node}' expects {expected} operand(s), got {actual}")]
    InvalidOperandCount {
        node: String,
        operator: String,
        expected: &'static str,
        actual: usize,
    },

    #[error("Node '{node}' of '{alias}' has no archetype range to select from")]
    NoArchetypeRange { alias: String, node: String },

    #[error("Constraint tree deeper than {0} levels")]
    TooDeep(usize),
}

/// Errors that can occur in the archetype engine.
///
/// - No silent failures
/// - Validation violations are returned as data; `Invalid` only appears when
///   a caller asked for an object to be persisted
#[derive(Debug, Error)]
pub enum ArchetypeError {
    #[error(transparent)]
    Load(#[from] DescriptorLoadError),

    #[error(transparent)]
    Query(#[from] QueryBuildError),

    #[error("Invalid archetype id '{name}': {reason}")]
    InvalidArchetypeId { name: String, reason: String },

    /// No descriptor exists for the archetype (a programmer error).
    #[error("Unknown archetype: {0}")]
    UnknownArchetype(String),

    #[error("Unknown node '{node}' on {archetype}")]
    UnknownNode { archetype: String, node: String },

    #[error("{archetype} failed validation with {} error(s)", .errors.len())]
    Invalid {
        archetype: String,
        errors: Vec<ValidationError>,
    },

    /// The external persistence executor failed.
    #[error("Executor error: {0}")]
    Executor(String),
}

// =============================================================================
// TESTS
// =============================================================================
