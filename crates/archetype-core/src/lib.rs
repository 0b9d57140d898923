//! # archetype-core
//!
//! The archetype metadata, validation and query engine - THE LOGIC.
//!
//! Business objects are instances of archetypes: types declared by
//! metadata at runtime rather than compiled in. This crate owns:
//! - the descriptor model and its cache (`descriptor`)
//! - validation of instances against that metadata (`validation`)
//! - compilation of declarative constraint trees into store queries (`query`)
//! - a thin service facade over an external persistence executor (`service`)
//!
//! ## Architectural Constraints
//!
//! - No disk or network I/O: descriptors arrive through `DescriptorSource`,
//!   persistence through `PersistenceExecutor`, lookups through `LookupResolver`
//! - No async: validation and compilation are synchronous, CPU-bound calls
//! - The cache is an immutable snapshot; reloads publish a replacement
//! - Deterministic: same input, same errors, same query text, same parameter order

// =============================================================================
// MODULES
// =============================================================================

pub mod descriptor;
pub mod object;
pub mod pattern;
pub mod primitives;
pub mod query;
pub mod service;
pub mod types;
pub mod validation;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    ArchetypeError, ArchetypeId, DescriptorLoadError, ObjectReference, QueryBuildError, Value,
};

// =============================================================================
// RE-EXPORTS: Engine
// =============================================================================

pub use descriptor::{
    ArchetypeDescriptor, ArchetypeDescriptorCache, AssertionDescriptor, Cardinality,
    DescriptorRegistry, DescriptorSet, DescriptorSource, NodeDescriptor, NodeType, StaticSource,
    TextSource,
};
pub use object::{ArchetypeObject, DynamicObject};
pub use pattern::ShortNamePattern;
pub use query::{
    ArchetypeQuery, ArchetypeSelector, CollectionConstraint, CompiledQuery, Constraint,
    QueryCompiler, SelectConstraint, SortConstraint,
};
pub use service::{ArchetypeService, PersistenceExecutor, Row};
pub use validation::{
    AssertionEvaluator, LookupResolver, StaticLookups, ValidationError, ValidationErrorKind,
    Validator,
};
