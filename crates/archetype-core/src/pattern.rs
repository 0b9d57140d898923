//! # Short-Name Patterns
//!
//! Wildcard matching over archetype short names.
//!
//! A `*` may appear as the first character, the last character, or both.
//! Anything else is a literal. There is no general glob: `party.customer*`
//! and `*.customer*` are fine, `party.*person` is rejected.

use crate::primitives::WILDCARD;
use std::fmt;

/// A parsed short-name pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ShortNamePattern {
    /// No wildcard: matches one name exactly.
    Exact(String),
    /// `abc*`
    Prefix(String),
    /// `*abc`
    Suffix(String),
    /// `*abc*`
    Contains(String),
    /// `*` on its own.
    Any,
}

impl ShortNamePattern {
    /// Parse a pattern, rejecting interior wildcards.
    ///
    /// Returns the offending text on failure so callers can build their own error.
    pub fn parse(pattern: &str) -> Result<Self, String> {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            return Err("empty pattern".to_string());
        }
        if pattern == "*" || pattern == "**" {
            return Ok(Self::Any);
        }

        let leading = pattern.starts_with(WILDCARD);
        let trailing = pattern.ends_with(WILDCARD);
        let start = usize::from(leading);
        let end = pattern.len() - usize::from(trailing);
        let body = &pattern[start..end];

        if body.contains(WILDCARD) {
            return Err(format!(
                "'{}': wildcards are only allowed at either end",
                pattern
            ));
        }

        let body = body.to_string();
        Ok(match (leading, trailing) {
            (false, false) => Self::Exact(body),
            (false, true) => Self::Prefix(body),
            (true, false) => Self::Suffix(body),
            (true, true) => Self::Contains(body),
        })
    }

    /// Returns true if `name` contains a wildcard.
    #[must_use]
    pub fn is_wildcard(name: &str) -> bool {
        name.contains(WILDCARD)
    }

    /// Test a name against the pattern.
    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        match self {
            Self::Exact(s) => name == s,
            Self::Prefix(s) => name.starts_with(s.as_str()),
            Self::Suffix(s) => name.ends_with(s.as_str()),
            Self::Contains(s) => name.contains(s.as_str()),
            Self::Any => true,
        }
    }

    /// The pattern matches exactly one possible name.
    #[must_use]
    pub fn is_exact(&self) -> bool {
        matches!(self, Self::Exact(_))
    }
}

impl fmt::Display for ShortNamePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(s) => f.write_str(s),
            Self::Prefix(s) => write!(f, "{}*", s),
            Self::Suffix(s) => write!(f, "*{}", s),
            Self::Contains(s) => write!(f, "*{}*", s),
            Self::Any => f.write_str("*"),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
