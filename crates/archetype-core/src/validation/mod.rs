//! # Validation Engine
//!
//! Checks an instance against its archetype's descriptor and returns every
//! violation in one pass. Bad data is never an `Err`; only missing
//! metadata or a malformed hand-built descriptor is.
//!
//! Per node, in declaration order:
//! 1. derived nodes are skipped
//! 2. values are resolved through `ArchetypeObject` (empties dropped)
//! 3. at most one cardinality error
//! 4. every attached assertion is handed to its evaluator
//! 5. composed objects with their own descriptor are validated in turn,
//!    their errors tagged with a nested path such as `/items[0]/quantity`
//!
//! The same object validated twice yields the same list in the same order.

pub mod assertion;
pub mod lookup;

pub use assertion::{
    ArchetypeRangeEvaluator, AssertionContext, AssertionEvaluator, LookupEvaluator,
    RegexEvaluator,
};
pub use lookup::{LookupResolver, NoLookups, StaticLookups};

use crate::descriptor::{ArchetypeDescriptor, ArchetypeDescriptorCache, NodeDescriptor};
use crate::object::ArchetypeObject;
use crate::primitives::MAX_VALIDATION_DEPTH;
use crate::{ArchetypeError, Value};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

// =============================================================================
// VALIDATION ERROR
// =============================================================================

/// What kind of rule a node violated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationErrorKind {
    MinCardinality,
    MaxCardinality,
    Pattern,
    ArchetypeRange,
    Lookup,
    /// Violation reported by a custom evaluator, named after its assertion type.
    Custom(String),
}

impl fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MinCardinality => f.write_str("min cardinality"),
            Self::MaxCardinality => f.write_str("max cardinality"),
            Self::Pattern => f.write_str("pattern"),
            Self::ArchetypeRange => f.write_str("archetype range"),
            Self::Lookup => f.write_str("lookup"),
            Self::Custom(name) => f.write_str(name),
        }
    }
}

/// One violated node or assertion.
///
/// Accumulated and returned, never raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    /// Short name of the archetype that declares the node.
    pub archetype: String,
    pub node: String,
    /// Path from the validated root, e.g. `/contacts[1]/telephoneNumber`.
    pub path: String,
    pub kind: ValidationErrorKind,
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

// =============================================================================
// VALIDATOR
// =============================================================================

/// Validation engine bound to one cache snapshot.
///
/// Holds no mutable state; one validator may serve any number of threads.
pub struct Validator<'a> {
    cache: &'a ArchetypeDescriptorCache,
    lookups: Arc<dyn LookupResolver>,
    evaluators: BTreeMap<String, Arc<dyn AssertionEvaluator>>,
}

impl<'a> Validator<'a> {
    /// Validator with the built-in evaluators and no lookup sources.
    #[must_use]
    pub fn new(cache: &'a ArchetypeDescriptorCache) -> Self {
        let builtins: [Arc<dyn AssertionEvaluator>; 3] = [
            Arc::new(RegexEvaluator),
            Arc::new(ArchetypeRangeEvaluator),
            Arc::new(LookupEvaluator),
        ];
        Self {
            cache,
            lookups: Arc::new(NoLookups),
            evaluators: builtins
                .into_iter()
                .map(|e| (e.name().to_string(), e))
                .collect(),
        }
    }

    #[must_use]
    pub fn with_lookups(mut self, lookups: Arc<dyn LookupResolver>) -> Self {
        self.lookups = lookups;
        self
    }

    /// Register an evaluator, replacing any existing one of the same name.
    #[must_use]
    pub fn with_evaluator(mut self, evaluator: Arc<dyn AssertionEvaluator>) -> Self {
        self.evaluators
            .insert(evaluator.name().to_string(), evaluator);
        self
    }

    /// Validate against the descriptor of the object's declared archetype.
    pub fn validate(
        &self,
        object: &dyn ArchetypeObject,
    ) -> Result<Vec<ValidationError>, ArchetypeError> {
        let descriptor = self
            .cache
            .get_by_id(object.archetype())
            .ok_or_else(|| ArchetypeError::UnknownArchetype(object.archetype().to_string()))?;
        self.run(object, descriptor)
    }

    /// Validate against a named archetype, whatever the object declares.
    pub fn validate_as(
        &self,
        object: &dyn ArchetypeObject,
        short_name: &str,
    ) -> Result<Vec<ValidationError>, ArchetypeError> {
        let descriptor = self
            .cache
            .get(short_name)
            .ok_or_else(|| ArchetypeError::UnknownArchetype(short_name.to_string()))?;
        self.run(object, descriptor)
    }

    fn run(
        &self,
        object: &dyn ArchetypeObject,
        descriptor: &ArchetypeDescriptor,
    ) -> Result<Vec<ValidationError>, ArchetypeError> {
        let mut errors = Vec::new();
        self.validate_object(object, descriptor, "", 0, &mut errors)?;

        tracing::debug!(
            archetype = %descriptor.short_name(),
            errors = errors.len(),
            "validated object"
        );
        Ok(errors)
    }

    fn validate_object(
        &self,
        object: &dyn ArchetypeObject,
        descriptor: &ArchetypeDescriptor,
        prefix: &str,
        depth: usize,
        errors: &mut Vec<ValidationError>,
    ) -> Result<(), ArchetypeError> {
        if depth > MAX_VALIDATION_DEPTH {
            tracing::warn!(
                path = %prefix,
                max = MAX_VALIDATION_DEPTH,
                "composition too deep, nested objects not validated"
            );
            return Ok(());
        }

        for node in descriptor.nodes().filter(|n| !n.derived) {
            let path = format!("{}/{}", prefix, node.name);
            let values: Vec<Value> = object
                .collection(&node.name)
                .into_iter()
                .filter(|v| !v.is_empty())
                .collect();

            let cardinality = check_cardinality(descriptor, node, &path, values.len());
            let cardinality_failed = cardinality.is_some();
            errors.extend(cardinality);

            let ctx = AssertionContext {
                cache: self.cache,
                lookups: self.lookups.as_ref(),
                archetype: descriptor,
                node,
                path: &path,
                cardinality_failed,
            };
            for assertion in &node.assertions {
                match self.evaluators.get(&assertion.name) {
                    Some(evaluator) => errors.extend(evaluator.evaluate(&ctx, assertion, &values)?),
                    None => tracing::debug!(
                        assertion = %assertion.name,
                        node = %path,
                        "no evaluator registered, assertion skipped"
                    ),
                }
            }

            for (index, value) in values.iter().enumerate() {
                let Value::Object(child) = value else {
                    continue;
                };
                let Some(child_descriptor) = self.cache.get_by_id(child.archetype_id()) else {
                    continue;
                };
                let child_prefix = if node.is_collection() {
                    format!("{}[{}]", path, index)
                } else {
                    path.clone()
                };
                self.validate_object(
                    &**child,
                    child_descriptor,
                    &child_prefix,
                    depth + 1,
                    errors,
                )?;
            }
        }

        Ok(())
    }
}

/// At most one error: min wins when both bounds fail.
fn check_cardinality(
    descriptor: &ArchetypeDescriptor,
    node: &NodeDescriptor,
    path: &str,
    count: usize,
) -> Option<ValidationError> {
    let (kind, message) = if count < node.min_cardinality as usize {
        (
            ValidationErrorKind::MinCardinality,
            if node.min_cardinality == 1 {
                format!("{} is required", node.display_name)
            } else {
                format!(
                    "{} requires at least {} value(s), found {}",
                    node.display_name, node.min_cardinality, count
                )
            },
        )
    } else if !node.max_cardinality.admits(count) {
        (
            ValidationErrorKind::MaxCardinality,
            format!(
                "{} allows at most {} value(s), found {}",
                node.display_name, node.max_cardinality, count
            ),
        )
    } else {
        return None;
    };

    Some(ValidationError {
        archetype: descriptor.short_name().to_string(),
        node: node.name.clone(),
        path: path.to_string(),
        kind,
        message,
    })
}

// =============================================================================
// TESTS
// =============================================================================
