//! # Bound Parameters
//!
//! Named parameters extracted from a constraint tree, kept in binding order.

use crate::Value;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Ordered name → value map of a compiled query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Parameters {
    entries: Vec<(String, Value)>,
}

impl Parameters {
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Parameters in binding order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }
}

impl Serialize for Parameters {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Hands out `<base><ordinal>` names, the ordinal counting per base.
///
/// Bases may collide once an ordinal is appended (`line1` + `0` and
/// `line` + `10`); an ordinal whose name is already issued is skipped.
#[derive(Debug, Default)]
pub(crate) struct ParameterBinder {
    parameters: Parameters,
    ordinals: HashMap<String, usize>,
    issued: HashSet<String>,
}

impl ParameterBinder {
    /// Bind a value and return the parameter name to reference it by.
    pub(crate) fn bind(&mut self, base: &str, value: Value) -> String {
        let ordinal = self.ordinals.entry(base.to_string()).or_insert(0);
        let name = loop {
            let candidate = format!("{}{}", base, ordinal);
            *ordinal += 1;
            if !self.issued.contains(&candidate) {
                break candidate;
            }
        };
        self.issued.insert(name.clone());
        self.parameters.entries.push((name.clone(), value));
        name
    }

    pub(crate) fn finish(self) -> Parameters {
        self.parameters
    }
}
