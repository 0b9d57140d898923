//! # Constraint Model
//!
//! The declarative form of a query, built by callers (or read from a JSON
//! document) and compiled once by `QueryCompiler`.
//!
//! Every variant set is closed so the compiler can match exhaustively.

use crate::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// ARCHETYPE SELECTOR
// =============================================================================

/// Which archetypes a selector names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchetypeTarget {
    /// One or more short names, each optionally wildcarded at either end.
    /// More than one name makes the selector polymorphic.
    ShortNames(Vec<String>),
    /// A (reference model, entity, concept) triple. Absent components match
    /// anything; present ones may be wildcarded.
    Triple {
        #[serde(default)]
        rm_name: Option<String>,
        #[serde(default)]
        entity_name: Option<String>,
        #[serde(default)]
        concept: Option<String>,
    },
}

impl fmt::Display for ArchetypeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ShortNames(names) => write!(f, "[{}]", names.join(", ")),
            Self::Triple {
                rm_name,
                entity_name,
                concept,
            } => {
                let show = |c: &Option<String>| c.clone().unwrap_or_else(|| "*".to_string());
                write!(f, "({}, {}, {})", show(rm_name), show(entity_name), show(concept))
            }
        }
    }
}

/// Selects the archetypes a root or collection alias ranges over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchetypeSelector {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    pub archetypes: ArchetypeTarget,
    /// Resolve against primary archetypes only.
    #[serde(default)]
    pub primary_only: bool,
    /// Restrict to active objects.
    #[serde(default)]
    pub active_only: bool,
    #[serde(default)]
    pub distinct: bool,
}

impl ArchetypeSelector {
    fn with_target(archetypes: ArchetypeTarget) -> Self {
        Self {
            alias: None,
            archetypes,
            primary_only: false,
            active_only: false,
            distinct: false,
        }
    }

    /// Selector over one short name, possibly wildcarded.
    #[must_use]
    pub fn short_name(name: &str) -> Self {
        Self::short_names(&[name])
    }

    /// Polymorphic selector; predicates keep the given order.
    #[must_use]
    pub fn short_names(names: &[&str]) -> Self {
        Self::with_target(ArchetypeTarget::ShortNames(
            names.iter().map(|n| (*n).to_string()).collect(),
        ))
    }

    #[must_use]
    pub fn triple(rm_name: Option<&str>, entity_name: Option<&str>, concept: Option<&str>) -> Self {
        Self::with_target(ArchetypeTarget::Triple {
            rm_name: rm_name.map(str::to_string),
            entity_name: entity_name.map(str::to_string),
            concept: concept.map(str::to_string),
        })
    }

    #[must_use]
    pub fn with_alias(mut self, alias: &str) -> Self {
        self.alias = Some(alias.to_string());
        self
    }

    #[must_use]
    pub fn primary_only(mut self) -> Self {
        self.primary_only = true;
        self
    }

    #[must_use]
    pub fn active_only(mut self) -> Self {
        self.active_only = true;
        self
    }

    #[must_use]
    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }
}

// =============================================================================
// NODE CONSTRAINT
// =============================================================================

/// Relational operators a node constraint may apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Between,
    Like,
    In,
    IsNull,
    IsNotNull,
}

impl Operator {
    /// Text of the operator in compiled output.
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Between => "BETWEEN",
            Self::Like => "LIKE",
            Self::In => "IN",
            Self::IsNull => "IS NULL",
            Self::IsNotNull => "IS NOT NULL",
        }
    }

    /// Required operand count, as shown in errors, and whether `count` meets it.
    #[must_use]
    pub fn arity(self, count: usize) -> (&'static str, bool) {
        match self {
            Self::IsNull | Self::IsNotNull => ("0", count == 0),
            Self::Between => ("2", count == 2),
            Self::In => ("at least 1", count >= 1),
            _ => ("1", count == 1),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Compares a node of an alias with literal values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConstraint {
    /// `alias.node`, or a bare node name resolved against the enclosing alias.
    pub node: String,
    pub operator: Operator,
    #[serde(default)]
    pub values: Vec<Value>,
}

// =============================================================================
// COLLECTION CONSTRAINT
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinType {
    #[default]
    Inner,
    LeftOuter,
}

/// Joins a relationship node and constrains the related objects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionConstraint {
    /// `alias.node`, or a bare node name resolved against the enclosing alias.
    pub node: String,
    /// Alias of the joined objects. Falls back to the selector's alias.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// Related archetypes. When absent they come from the node's `archetypeRange`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<ArchetypeSelector>,
    #[serde(default)]
    pub join: JoinType,
    /// Constraints scoped to the joined alias, ANDed together.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<Constraint>,
}

impl CollectionConstraint {
    #[must_use]
    pub fn new(node: &str) -> Self {
        Self {
            node: node.to_string(),
            alias: None,
            selector: None,
            join: JoinType::Inner,
            constraints: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_alias(mut self, alias: &str) -> Self {
        self.alias = Some(alias.to_string());
        self
    }

    #[must_use]
    pub fn with_selector(mut self, selector: ArchetypeSelector) -> Self {
        self.selector = Some(selector);
        self
    }

    #[must_use]
    pub fn left_outer(mut self) -> Self {
        self.join = JoinType::LeftOuter;
        self
    }

    #[must_use]
    pub fn add(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// The alias the caller asked for, if any.
    #[must_use]
    pub fn requested_alias(&self) -> Option<&str> {
        self.alias
            .as_deref()
            .or_else(|| self.selector.as_ref().and_then(|s| s.alias.as_deref()))
    }
}

// =============================================================================
// ID CONSTRAINT
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdOperator {
    #[default]
    Eq,
    Ne,
}

/// Correlates two aliases through their relationship identifiers.
///
/// Each side is `alias` (the object's own link id) or `alias.node` (the
/// link id of the object that node refers to).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdConstraint {
    pub left: String,
    pub right: String,
    #[serde(default)]
    pub operator: IdOperator,
}

// =============================================================================
// CONSTRAINT TREE
// =============================================================================

/// A node of the constraint tree. Combinators render exactly as built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Constraint {
    Node(NodeConstraint),
    Collection(CollectionConstraint),
    Id(IdConstraint),
    And(Vec<Constraint>),
    Or(Vec<Constraint>),
    Not(Box<Constraint>),
}

impl Constraint {
    fn node(node: &str, operator: Operator, values: Vec<Value>) -> Self {
        Self::Node(NodeConstraint {
            node: node.to_string(),
            operator,
            values,
        })
    }

    #[must_use]
    pub fn eq(node: &str, value: impl Into<Value>) -> Self {
        Self::node(node, Operator::Eq, vec![value.into()])
    }

    #[must_use]
    pub fn ne(node: &str, value: impl Into<Value>) -> Self {
        Self::node(node, Operator::Ne, vec![value.into()])
    }

    #[must_use]
    pub fn lt(node: &str, value: impl Into<Value>) -> Self {
        Self::node(node, Operator::Lt, vec![value.into()])
    }

    #[must_use]
    pub fn le(node: &str, value: impl Into<Value>) -> Self {
        Self::node(node, Operator::Le, vec![value.into()])
    }

    #[must_use]
    pub fn gt(node: &str, value: impl Into<Value>) -> Self {
        Self::node(node, Operator::Gt, vec![value.into()])
    }

    #[must_use]
    pub fn ge(node: &str, value: impl Into<Value>) -> Self {
        Self::node(node, Operator::Ge, vec![value.into()])
    }

    #[must_use]
    pub fn between(node: &str, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        Self::node(node, Operator::Between, vec![low.into(), high.into()])
    }

    /// `*` in the pattern is rewritten to the store wildcard when compiled.
    #[must_use]
    pub fn like(node: &str, pattern: &str) -> Self {
        Self::node(node, Operator::Like, vec![Value::from(pattern)])
    }

    #[must_use]
    pub fn is_in<I, V>(node: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::node(node, Operator::In, values.into_iter().map(Into::into).collect())
    }

    #[must_use]
    pub fn is_null(node: &str) -> Self {
        Self::node(node, Operator::IsNull, Vec::new())
    }

    #[must_use]
    pub fn is_not_null(node: &str) -> Self {
        Self::node(node, Operator::IsNotNull, Vec::new())
    }

    #[must_use]
    pub fn id_eq(left: &str, right: &str) -> Self {
        Self::Id(IdConstraint {
            left: left.to_string(),
            right: right.to_string(),
            operator: IdOperator::Eq,
        })
    }

    #[must_use]
    pub fn id_ne(left: &str, right: &str) -> Self {
        Self::Id(IdConstraint {
            left: left.to_string(),
            right: right.to_string(),
            operator: IdOperator::Ne,
        })
    }

    #[must_use]
    pub fn and(constraints: Vec<Constraint>) -> Self {
        Self::And(constraints)
    }

    #[must_use]
    pub fn or(constraints: Vec<Constraint>) -> Self {
        Self::Or(constraints)
    }

    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub fn not(constraint: Constraint) -> Self {
        Self::Not(Box::new(constraint))
    }
}

impl From<CollectionConstraint> for Constraint {
    fn from(collection: CollectionConstraint) -> Self {
        Self::Collection(collection)
    }
}

// =============================================================================
// PROJECTION AND SORTING
// =============================================================================

/// One projected column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectConstraint {
    /// The whole object bound to an alias.
    Alias(String),
    /// A single node, `alias.node` or bare.
    Node(String),
}

/// Archetype-identity properties an alias can be sorted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchetypeProperty {
    RmName,
    EntityName,
    Concept,
}

fn default_true() -> bool {
    true
}

/// One `ORDER BY` term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortConstraint {
    Node {
        node: String,
        #[serde(default = "default_true")]
        ascending: bool,
    },
    Archetype {
        alias: String,
        property: ArchetypeProperty,
        #[serde(default = "default_true")]
        ascending: bool,
    },
}

impl SortConstraint {
    #[must_use]
    pub fn node(node: &str, ascending: bool) -> Self {
        Self::Node {
            node: node.to_string(),
            ascending,
        }
    }

    #[must_use]
    pub fn archetype(alias: &str, property: ArchetypeProperty, ascending: bool) -> Self {
        Self::Archetype {
            alias: alias.to_string(),
            property,
            ascending,
        }
    }
}

// =============================================================================
// QUERY
// =============================================================================

/// Upper bound on returned rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxResults {
    /// No limit.
    #[default]
    All,
    Limit(usize),
}

/// Root of a constraint tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchetypeQuery {
    /// Root selectors. The first is the primary root; further roots form a
    /// cross product restricted by id constraints.
    pub roots: Vec<ArchetypeSelector>,
    /// Top-level constraints, ANDed together.
    #[serde(default)]
    pub constraints: Vec<Constraint>,
    #[serde(default)]
    pub selects: Vec<SelectConstraint>,
    #[serde(default)]
    pub sorts: Vec<SortConstraint>,
    #[serde(default)]
    pub first_result: usize,
    #[serde(default)]
    pub max_results: MaxResults,
    #[serde(default)]
    pub distinct: bool,
}

impl ArchetypeQuery {
    #[must_use]
    pub fn new(root: ArchetypeSelector) -> Self {
        Self {
            roots: vec![root],
            constraints: Vec::new(),
            selects: Vec::new(),
            sorts: Vec::new(),
            first_result: 0,
            max_results: MaxResults::All,
            distinct: false,
        }
    }

    /// Add another independently typed root.
    #[must_use]
    pub fn add_root(mut self, root: ArchetypeSelector) -> Self {
        self.roots.push(root);
        self
    }

    #[must_use]
    pub fn add(mut self, constraint: impl Into<Constraint>) -> Self {
        self.constraints.push(constraint.into());
        self
    }

    #[must_use]
    pub fn select(mut self, select: SelectConstraint) -> Self {
        self.selects.push(select);
        self
    }

    #[must_use]
    pub fn sort(mut self, sort: SortConstraint) -> Self {
        self.sorts.push(sort);
        self
    }

    #[must_use]
    pub fn first_result(mut self, first: usize) -> Self {
        self.first_result = first;
        self
    }

    #[must_use]
    pub fn max_results(mut self, max: MaxResults) -> Self {
        self.max_results = max;
        self
    }

    #[must_use]
    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }
}
