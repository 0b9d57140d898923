//! # Engine Primitives
//!
//! Fixed names and limits shared by the descriptor, validation and query
//! modules. These are compiled in and never change at runtime.

// =============================================================================
// ARCHETYPE NAMES
// =============================================================================

/// Wildcard character accepted in archetype short names and patterns.
pub const WILDCARD: char = '*';

/// Wildcard character of the target store's `LIKE` operator.
pub const STORE_WILDCARD: char = '%';

/// Version assigned to archetypes that do not declare one.
pub const DEFAULT_VERSION: &str = "1.0";

/// Maximum length of an archetype entity name or concept.
pub const MAX_NAME_SEGMENT_LENGTH: usize = 64;

// =============================================================================
// ASSERTION TYPES
// =============================================================================

/// Full-match regular expression over string node values.
pub const REGULAR_EXPRESSION: &str = "regularExpression";

/// Restricts the archetypes of related objects, optionally with per-range cardinality.
pub const ARCHETYPE_RANGE: &str = "archetypeRange";

/// Restricts values to an enumerated lookup set.
pub const LOOKUP: &str = "lookup";

/// Assertion types every cache knows without them being declared by a source.
pub const BUILTIN_ASSERTION_TYPES: [&str; 3] = [REGULAR_EXPRESSION, ARCHETYPE_RANGE, LOOKUP];

// =============================================================================
// STORE PROPERTY PATHS
// =============================================================================

/// Path of the reference-model name on a stored object.
pub const RM_NAME_PATH: &str = "archetypeId.rmName";

/// Path of the entity name on a stored object.
pub const ENTITY_NAME_PATH: &str = "archetypeId.entityName";

/// Path of the concept on a stored object.
pub const CONCEPT_PATH: &str = "archetypeId.concept";

/// Path of the active flag on a stored object.
pub const ACTIVE_PATH: &str = "active";

/// Path of the opaque relationship identifier on a stored object.
pub const LINK_ID_PATH: &str = "linkId";

/// Path of the surrogate id on a stored object.
pub const ID_PATH: &str = "id";

// =============================================================================
// QUERY LIMITS
// =============================================================================

/// Alias base used when no usable base can be derived from a selector.
pub const DEFAULT_ALIAS_BASE: &str = "x";

/// Maximum nesting depth of a constraint tree.
///
/// Compilation is recursive; this bounds the stack for hostile query documents.
pub const MAX_CONSTRAINT_DEPTH: usize = 64;

/// Maximum nesting depth followed when validating composed objects.
pub const MAX_VALIDATION_DEPTH: usize = 32;
