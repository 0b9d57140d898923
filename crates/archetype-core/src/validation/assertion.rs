//! # Assertion Evaluators
//!
//! One evaluator per assertion type. The engine looks evaluators up by the
//! assertion's name and hands each the node's resolved values.
//!
//! Built-ins:
//! - `regularExpression`: one error per non-matching value
//! - `archetypeRange`: at most one error per node, however many ranges fail;
//!   values that are neither objects nor references fail the range
//! - `lookup`: one error per value outside the enumerated set

use super::lookup::LookupResolver;
use super::{ValidationError, ValidationErrorKind};
use crate::descriptor::{
    ArchetypeDescriptor, ArchetypeDescriptorCache, ArchetypeRange, AssertionDescriptor,
    LookupAssertion, LookupSource, NodeDescriptor, RangeEntry, RegexAssertion,
};
use crate::pattern::ShortNamePattern;
use crate::primitives::{ARCHETYPE_RANGE, LOOKUP, REGULAR_EXPRESSION};
use crate::{ArchetypeError, DescriptorLoadError, Value};
use std::collections::BTreeSet;

// =============================================================================
// CONTEXT
// =============================================================================

/// What an evaluator may consult while checking one node.
pub struct AssertionContext<'a> {
    pub cache: &'a ArchetypeDescriptorCache,
    pub lookups: &'a dyn LookupResolver,
    pub archetype: &'a ArchetypeDescriptor,
    pub node: &'a NodeDescriptor,
    /// Path of the node from the validated root, e.g. `/items[0]/quantity`.
    pub path: &'a str,
    /// The node already failed its own cardinality check in this pass.
    pub cardinality_failed: bool,
}

impl AssertionContext<'_> {
    /// Build an error attributed to the current node.
    #[must_use]
    pub fn violation(&self, kind: ValidationErrorKind, message: String) -> ValidationError {
        ValidationError {
            archetype: self.archetype.short_name().to_string(),
            node: self.node.name.clone(),
            path: self.path.to_string(),
            kind,
            message,
        }
    }

    /// Report a malformed assertion on a descriptor that bypassed the cache.
    #[must_use]
    pub fn malformed(&self, assertion: &AssertionDescriptor, reason: String) -> ArchetypeError {
        ArchetypeError::Load(DescriptorLoadError::InvalidAssertion {
            archetype: self.archetype.short_name().to_string(),
            node: self.node.name.clone(),
            assertion: assertion.name.clone(),
            reason,
        })
    }
}

// =============================================================================
// EVALUATOR TRAIT
// =============================================================================

/// Checks the values of one node against one assertion.
///
/// Returns every violation found. `Err` is reserved for broken metadata,
/// never for bad data.
pub trait AssertionEvaluator: Send + Sync {
    /// The assertion type this evaluator handles.
    fn name(&self) -> &str;

    fn evaluate(
        &self,
        ctx: &AssertionContext<'_>,
        assertion: &AssertionDescriptor,
        values: &[Value],
    ) -> Result<Vec<ValidationError>, ArchetypeError>;
}

// =============================================================================
// REGULAR EXPRESSION
// =============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct RegexEvaluator;

impl AssertionEvaluator for RegexEvaluator {
    fn name(&self) -> &str {
        REGULAR_EXPRESSION
    }

    fn evaluate(
        &self,
        ctx: &AssertionContext<'_>,
        assertion: &AssertionDescriptor,
        values: &[Value],
    ) -> Result<Vec<ValidationError>, ArchetypeError> {
        let built;
        let regex = match ctx.node.compiled_regex(assertion) {
            Some(regex) => regex,
            None => {
                built = RegexAssertion::from_descriptor(assertion)
                    .map_err(|r| ctx.malformed(assertion, r))?;
                &built
            }
        };

        Ok(values
            .iter()
            .filter_map(Value::scalar_text)
            .filter(|text| !regex.is_match(text))
            .map(|text| {
                ctx.violation(
                    ValidationErrorKind::Pattern,
                    format!("'{}' does not match {}", text, regex.expression),
                )
            })
            .collect())
    }
}

// =============================================================================
// ARCHETYPE RANGE
// =============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct ArchetypeRangeEvaluator;

impl ArchetypeRangeEvaluator {
    /// Names admitted by one entry. Wildcards expand against the cache as it
    /// is now, so archetypes loaded after the descriptor are still honoured.
    fn admitted(cache: &ArchetypeDescriptorCache, entry: &RangeEntry) -> BTreeSet<String> {
        match &entry.pattern {
            ShortNamePattern::Exact(name) => BTreeSet::from([name.clone()]),
            pattern => cache
                .matching(pattern, false)
                .iter()
                .map(|d| d.short_name().to_string())
                .collect(),
        }
    }
}

impl AssertionEvaluator for ArchetypeRangeEvaluator {
    fn name(&self) -> &str {
        ARCHETYPE_RANGE
    }

    fn evaluate(
        &self,
        ctx: &AssertionContext<'_>,
        assertion: &AssertionDescriptor,
        values: &[Value],
    ) -> Result<Vec<ValidationError>, ArchetypeError> {
        let range =
            ArchetypeRange::from_descriptor(assertion).map_err(|r| ctx.malformed(assertion, r))?;
        let admitted: Vec<BTreeSet<String>> = range
            .entries
            .iter()
            .map(|entry| Self::admitted(ctx.cache, entry))
            .collect();

        // Every problem is collected, but only the first is reported: a node
        // yields a single archetypeRange error per pass.
        let mut problems = Vec::new();
        let mut related: Vec<&str> = Vec::with_capacity(values.len());

        for value in values {
            let Some(id) = value.archetype() else {
                problems.push(format!("{} is not an object or a reference", value));
                continue;
            };
            let name = id.short_name();
            if !admitted.iter().any(|set| set.contains(name)) {
                problems.push(format!(
                    "{} is not one of [{}]",
                    name,
                    range.short_names().collect::<Vec<_>>().join(", ")
                ));
            }
            related.push(name);
        }

        if !ctx.cardinality_failed {
            for (entry, set) in range.entries.iter().zip(&admitted) {
                if !entry.has_cardinality() {
                    continue;
                }
                let count = related.iter().filter(|name| set.contains(**name)).count();
                let min = entry.min_cardinality.unwrap_or(0) as usize;
                if count < min {
                    problems.push(format!(
                        "requires at least {} {}, found {}",
                        min, entry.short_name, count
                    ));
                } else if let Some(max) = entry.max_cardinality {
                    if !max.admits(count) {
                        problems.push(format!(
                            "allows at most {} {}, found {}",
                            max, entry.short_name, count
                        ));
                    }
                }
            }
        }

        if problems.len() > 1 {
            tracing::debug!(
                node = %ctx.path,
                collapsed = problems.len(),
                "multiple archetype range violations reported as one"
            );
        }

        Ok(problems
            .into_iter()
            .next()
            .map(|message| ctx.violation(ValidationErrorKind::ArchetypeRange, message))
            .into_iter()
            .collect())
    }
}

// =============================================================================
// LOOKUP
// =============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct LookupEvaluator;

impl AssertionEvaluator for LookupEvaluator {
    fn name(&self) -> &str {
        LOOKUP
    }

    fn evaluate(
        &self,
        ctx: &AssertionContext<'_>,
        assertion: &AssertionDescriptor,
        values: &[Value],
    ) -> Result<Vec<ValidationError>, ArchetypeError> {
        let lookup =
            LookupAssertion::from_descriptor(assertion).map_err(|r| ctx.malformed(assertion, r))?;

        let is_member = |code: &str| match &lookup.source {
            LookupSource::Local(codes) => codes.iter().any(|c| c == code),
            LookupSource::Remote(source) => ctx.lookups.contains(source, code),
        };
        let source_name = match &lookup.source {
            LookupSource::Local(_) => "the listed values".to_string(),
            LookupSource::Remote(source) => source.clone(),
        };

        Ok(values
            .iter()
            .filter_map(Value::scalar_text)
            .filter(|code| !is_member(code))
            .map(|code| {
                ctx.violation(
                    ValidationErrorKind::Lookup,
                    format!("'{}' is not a valid code of {}", code, source_name),
                )
            })
            .collect())
    }
}
