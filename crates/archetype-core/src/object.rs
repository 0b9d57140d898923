//! # Archetype Objects
//!
//! The capability the validation engine uses to read an instance, decoupled
//! from any concrete domain type:
//!
//! - `ArchetypeObject`: descriptor-driven access by node name
//! - `DynamicObject`: the generic implementation backed by a node map
//!
//! Concrete domain types implement `ArchetypeObject` themselves; the engine
//! never inspects fields any other way.

use crate::{ArchetypeError, ArchetypeId, ObjectReference, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// CAPABILITY TRAIT
// =============================================================================

/// Node-name based access to an instance of some archetype.
pub trait ArchetypeObject {
    /// The archetype this instance declares.
    fn archetype(&self) -> &ArchetypeId;

    /// Current value of a node; `Value::Null` when unset.
    fn get(&self, node: &str) -> Value;

    /// Replace the value of a node.
    fn set(&mut self, node: &str, value: Value) -> Result<(), ArchetypeError>;

    /// Values of a collection node. A scalar node yields zero or one value.
    fn collection(&self, node: &str) -> Vec<Value> {
        match self.get(node) {
            Value::Null => Vec::new(),
            Value::List(items) => items,
            other => vec![other],
        }
    }

    /// Reference to this instance, when it has been assigned an id.
    fn reference(&self) -> Option<ObjectReference> {
        None
    }
}

// =============================================================================
// DYNAMIC OBJECT
// =============================================================================

/// An instance whose shape is given entirely by its archetype's descriptor.
///
/// Collection nodes hold `Value::List`; every other node holds a single value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicObject {
    archetype: ArchetypeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    link_id: Option<String>,
    #[serde(default)]
    nodes: BTreeMap<String, Value>,
}

impl DynamicObject {
    #[must_use]
    pub fn new(archetype: ArchetypeId) -> Self {
        Self {
            archetype,
            id: None,
            link_id: None,
            nodes: BTreeMap::new(),
        }
    }

    /// Build an object for a short or qualified archetype name.
    pub fn of(archetype: &str) -> Result<Self, ArchetypeError> {
        ArchetypeId::parse(archetype).map(Self::new)
    }

    #[must_use]
    pub fn with_id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }

    #[must_use]
    pub fn with_link_id(mut self, link_id: impl Into<String>) -> Self {
        self.link_id = Some(link_id.into());
        self
    }

    /// Builder form of `set` for scalar values.
    #[must_use]
    pub fn with(mut self, node: &str, value: impl Into<Value>) -> Self {
        self.nodes.insert(node.to_string(), value.into());
        self
    }

    #[must_use]
    pub fn archetype_id(&self) -> &ArchetypeId {
        &self.archetype
    }

    #[must_use]
    pub fn id(&self) -> Option<u64> {
        self.id
    }

    pub fn set_id(&mut self, id: u64) {
        self.id = Some(id);
    }

    #[must_use]
    pub fn link_id(&self) -> Option<&str> {
        self.link_id.as_deref()
    }

    /// Append a value to a collection node, creating the list if needed.
    pub fn add(&mut self, node: &str, value: impl Into<Value>) {
        let value = value.into();
        match self.nodes.get_mut(node) {
            Some(Value::List(items)) => items.push(value),
            Some(existing) => {
                let previous = std::mem::take(existing);
                *existing = if previous.is_empty() {
                    Value::List(vec![value])
                } else {
                    Value::List(vec![previous, value])
                };
            }
            None => {
                self.nodes.insert(node.to_string(), Value::List(vec![value]));
            }
        }
    }

    /// Remove the first element of a collection node equal to `value`.
    ///
    /// Returns true if an element was removed.
    pub fn remove(&mut self, node: &str, value: &Value) -> bool {
        if let Some(Value::List(items)) = self.nodes.get_mut(node) {
            if let Some(position) = items.iter().position(|v| v == value) {
                items.remove(position);
                return true;
            }
        }
        false
    }

    /// Remove and return the last element of a collection node.
    pub fn pop(&mut self, node: &str) -> Option<Value> {
        match self.nodes.get_mut(node) {
            Some(Value::List(items)) => items.pop(),
            _ => None,
        }
    }

    /// Clear a node entirely.
    pub fn unset(&mut self, node: &str) {
        self.nodes.remove(node);
    }

    /// Names of the nodes that currently hold a value.
    pub fn node_names(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }
}

impl ArchetypeObject for DynamicObject {
    fn archetype(&self) -> &ArchetypeId {
        &self.archetype
    }

    fn get(&self, node: &str) -> Value {
        self.nodes.get(node).cloned().unwrap_or_default()
    }

    fn set(&mut self, node: &str, value: Value) -> Result<(), ArchetypeError> {
        self.nodes.insert(node.to_string(), value);
        Ok(())
    }

    fn reference(&self) -> Option<ObjectReference> {
        self.id.map(|id| ObjectReference {
            archetype: self.archetype.clone(),
            id,
            link_id: self.link_id.clone(),
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================
