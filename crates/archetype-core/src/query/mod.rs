//! # Archetype Queries
//!
//! - `constraint`: the declarative constraint tree callers build
//! - `params`: ordered bound parameters
//! - `compiler`: turns a tree into query text for the persistence executor
//!
//! The engine never runs queries itself; it only produces the text and
//! metadata an executor needs.

pub mod compiler;
pub mod constraint;
pub mod params;

pub use compiler::{CompiledQuery, QueryCompiler};
pub use constraint::{
    ArchetypeProperty, ArchetypeQuery, ArchetypeSelector, ArchetypeTarget, CollectionConstraint,
    Constraint, IdConstraint, IdOperator, JoinType, MaxResults, NodeConstraint, Operator,
    SelectConstraint, SortConstraint,
};
pub use params::Parameters;
