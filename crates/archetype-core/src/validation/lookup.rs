//! # Lookup Resolution
//!
//! Valid codes for `lookup` assertions come from outside the engine.

use std::collections::{BTreeMap, BTreeSet};

/// Supplies the enumerated codes of a lookup source (e.g. `lookup.species`).
///
/// Implementations must be `Send + Sync`: one resolver serves every
/// concurrent validation.
pub trait LookupResolver: Send + Sync {
    /// Is `code` a valid member of `source`?
    ///
    /// An unknown source has no members.
    fn contains(&self, source: &str, code: &str) -> bool;
}

/// Resolver that knows no sources; every remote lookup value is rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLookups;

impl LookupResolver for NoLookups {
    fn contains(&self, _source: &str, _code: &str) -> bool {
        false
    }
}

/// Resolver over a fixed in-memory table.
#[derive(Debug, Clone, Default)]
pub struct StaticLookups {
    sources: BTreeMap<String, BTreeSet<String>>,
}

impl StaticLookups {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add codes to a source.
    #[must_use]
    pub fn with<I, S>(mut self, source: &str, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sources
            .entry(source.to_string())
            .or_default()
            .extend(codes.into_iter().map(Into::into));
        self
    }
}

impl LookupResolver for StaticLookups {
    fn contains(&self, source: &str, code: &str) -> bool {
        self.sources
            .get(source)
            .is_some_and(|codes| codes.contains(code))
    }
}
