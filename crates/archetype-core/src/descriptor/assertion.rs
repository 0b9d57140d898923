//! # Assertion Views
//!
//! Typed readings of the built-in assertions' generic properties.
//!
//! The cache parses every built-in assertion once at load time so malformed
//! metadata fails fast. Compiled regular expressions are kept on the node;
//! range and lookup views are re-read from the properties when validating.

use super::{AssertionDescriptor, Cardinality, Property};
use crate::pattern::ShortNamePattern;
use crate::primitives::{ARCHETYPE_RANGE, LOOKUP, REGULAR_EXPRESSION};
use regex::Regex;

// =============================================================================
// REGULAR EXPRESSION
// =============================================================================

/// `regularExpression`: every value must fully match `expression`.
#[derive(Debug, Clone)]
pub struct RegexAssertion {
    pub expression: String,
    regex: Regex,
}

impl PartialEq for RegexAssertion {
    fn eq(&self, other: &Self) -> bool {
        self.expression == other.expression
    }
}

impl Eq for RegexAssertion {}

impl RegexAssertion {
    /// The raw `expression` property, if present.
    #[must_use]
    pub fn expression_of(assertion: &AssertionDescriptor) -> Option<&str> {
        assertion.property("expression").and_then(Property::as_text)
    }

    pub fn from_descriptor(assertion: &AssertionDescriptor) -> Result<Self, String> {
        let expression = Self::expression_of(assertion)
            .ok_or_else(|| "missing 'expression' property".to_string())?;

        // Anchored so that `\d+` rejects "12a" as well as "abc".
        let regex = Regex::new(&format!("^(?:{})$", expression))
            .map_err(|e| format!("invalid expression: {}", e))?;

        Ok(Self {
            expression: expression.to_string(),
            regex,
        })
    }

    #[must_use]
    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

// =============================================================================
// ARCHETYPE RANGE
// =============================================================================

/// One target of an `archetypeRange` assertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeEntry {
    pub short_name: String,
    pub pattern: ShortNamePattern,
    /// Minimum number of related objects drawn from this range.
    pub min_cardinality: Option<u32>,
    /// Maximum number of related objects drawn from this range.
    pub max_cardinality: Option<Cardinality>,
}

impl RangeEntry {
    /// The range carries its own cardinality, independent of the node's.
    #[must_use]
    pub fn has_cardinality(&self) -> bool {
        self.min_cardinality.is_some() || self.max_cardinality.is_some()
    }
}

/// `archetypeRange`: related objects must be of one of the listed archetypes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchetypeRange {
    pub entries: Vec<RangeEntry>,
}

impl ArchetypeRange {
    pub fn from_descriptor(assertion: &AssertionDescriptor) -> Result<Self, String> {
        let items = assertion
            .property("archetypes")
            .and_then(Property::as_list)
            .ok_or_else(|| "missing 'archetypes' list".to_string())?;
        if items.is_empty() {
            return Err("'archetypes' list is empty".to_string());
        }

        let entries = items
            .iter()
            .map(parse_range_entry)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { entries })
    }

    /// Short names (possibly wildcarded) in declaration order.
    pub fn short_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.short_name.as_str())
    }
}

fn parse_range_entry(item: &Property) -> Result<RangeEntry, String> {
    let (short_name, min, max) = match item {
        Property::Text(name) => (name.as_str(), None, None),
        Property::Map(map) => {
            let name = map
                .get("short_name")
                .and_then(Property::as_text)
                .ok_or_else(|| "range entry without 'short_name'".to_string())?;
            let min = match map.get("min_cardinality") {
                Some(p) => Some(property_u32(p, "min_cardinality")?),
                None => None,
            };
            let max = match map.get("max_cardinality") {
                Some(p) => Some(property_cardinality(p)?),
                None => None,
            };
            (name, min, max)
        }
        _ => return Err("range entries must be names or tables".to_string()),
    };

    let pattern = ShortNamePattern::parse(short_name)?;
    if let (Some(min), Some(Cardinality::Bounded(max))) = (min, max) {
        if min > max {
            return Err(format!(
                "range '{}' has min {} above max {}",
                short_name, min, max
            ));
        }
    }

    Ok(RangeEntry {
        short_name: short_name.to_string(),
        pattern,
        min_cardinality: min,
        max_cardinality: max,
    })
}

fn property_u32(property: &Property, key: &str) -> Result<u32, String> {
    match property {
        Property::Int(n) => u32::try_from(*n).map_err(|_| format!("invalid {} {}", key, n)),
        Property::Text(s) => s.parse().map_err(|_| format!("invalid {} '{}'", key, s)),
        _ => Err(format!("invalid {}", key)),
    }
}

fn property_cardinality(property: &Property) -> Result<Cardinality, String> {
    match property {
        Property::Int(-1) => Ok(Cardinality::Unbounded),
        Property::Text(s) if s == "*" => Ok(Cardinality::Unbounded),
        other => property_u32(other, "max_cardinality").map(Cardinality::Bounded),
    }
}

// =============================================================================
// LOOKUP
// =============================================================================

/// Where a lookup assertion's valid codes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupSource {
    /// Codes supplied at validation time by the lookup resolver.
    Remote(String),
    /// Codes listed inline in the descriptor.
    Local(Vec<String>),
}

/// `lookup`: value must be one of an enumerated set of codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupAssertion {
    pub source: LookupSource,
}

impl LookupAssertion {
    pub fn from_descriptor(assertion: &AssertionDescriptor) -> Result<Self, String> {
        if let Some(values) = assertion.property("values") {
            let items = values
                .as_list()
                .ok_or_else(|| "'values' must be a list".to_string())?;
            let codes = items
                .iter()
                .map(|p| {
                    p.as_text()
                        .map(str::to_string)
                        .ok_or_else(|| "lookup values must be text".to_string())
                })
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(Self {
                source: LookupSource::Local(codes),
            });
        }

        let source = assertion
            .property("source")
            .and_then(Property::as_text)
            .ok_or_else(|| "lookup needs a 'source' or 'values'".to_string())?;
        Ok(Self {
            source: LookupSource::Remote(source.to_string()),
        })
    }
}

// =============================================================================
// LOAD-TIME SHAPE CHECK
// =============================================================================

/// Check a built-in assertion's properties. Non-built-in assertions pass.
///
/// Returns the compiled form of a `regularExpression` assertion.
pub fn check_builtin(assertion: &AssertionDescriptor) -> Result<Option<RegexAssertion>, String> {
    match assertion.name.as_str() {
        REGULAR_EXPRESSION => RegexAssertion::from_descriptor(assertion).map(Some),
        ARCHETYPE_RANGE => ArchetypeRange::from_descriptor(assertion).map(|_| None),
        LOOKUP => LookupAssertion::from_descriptor(assertion).map(|_| None),
        _ => Ok(None),
    }
}

// =============================================================================
// TESTS
// =============================================================================
