//! # Query Compiler
//!
//! Translates an `ArchetypeQuery` into store query text plus ordered bound
//! parameters. Output is a pure function of the query and the cache
//! snapshot: compiling the same query twice yields identical text and
//! parameter order.
//!
//! ## Output shape
//!
//! ```text
//! SELECT [DISTINCT] <projection>
//! FROM <Type> AS <alias> [<join>]... [, <Type> AS <alias> [<join>]...]...
//! [WHERE <root predicates> AND <tree> AND <id correlations>]
//! [ORDER BY <term>, ...]
//! ```
//!
//! Rendered on a single line. Pagination travels beside the text.

use super::constraint::{
    ArchetypeProperty, ArchetypeQuery, ArchetypeSelector, ArchetypeTarget, CollectionConstraint,
    Constraint, IdConstraint, IdOperator, JoinType, MaxResults, NodeConstraint, Operator,
    SelectConstraint, SortConstraint,
};
use super::params::{ParameterBinder, Parameters};
use crate::descriptor::{ArchetypeDescriptor, ArchetypeDescriptorCache, NodeDescriptor};
use crate::pattern::ShortNamePattern;
use crate::primitives::{
    ACTIVE_PATH, CONCEPT_PATH, DEFAULT_ALIAS_BASE, ENTITY_NAME_PATH, ID_PATH, LINK_ID_PATH,
    MAX_CONSTRAINT_DEPTH, RM_NAME_PATH, STORE_WILDCARD, WILDCARD,
};
use crate::{QueryBuildError, Value};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

// =============================================================================
// COMPILED QUERY
// =============================================================================

/// Query text plus everything the executor needs to run it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompiledQuery {
    pub text: String,
    pub parameters: Parameters,
    pub first_result: usize,
    /// `None` when every row is wanted.
    pub max_results: Option<usize>,
}

// =============================================================================
// COMPILER
// =============================================================================

/// Compiles queries against one cache snapshot.
///
/// Stateless between calls; safe to share across threads.
#[derive(Debug, Clone, Copy)]
pub struct QueryCompiler<'a> {
    cache: &'a ArchetypeDescriptorCache,
}

impl<'a> QueryCompiler<'a> {
    #[must_use]
    pub fn new(cache: &'a ArchetypeDescriptorCache) -> Self {
        Self { cache }
    }

    pub fn compile(&self, query: &ArchetypeQuery) -> Result<CompiledQuery, QueryBuildError> {
        if query.roots.is_empty() {
            return Err(QueryBuildError::NoRootSelector);
        }

        let mut state = Compilation::new(self.cache);
        state.reserve_aliases(query)?;

        let mut conjuncts = Vec::new();
        for root in &query.roots {
            conjuncts.extend(state.add_root(root)?);
        }
        let primary = state
            .from
            .first()
            .map(|entry| entry.alias.clone())
            .ok_or(QueryBuildError::NoRootSelector)?;

        for constraint in &query.constraints {
            conjuncts.extend(state.compile_constraint(constraint, &primary, 0, true)?);
        }
        conjuncts.append(&mut state.deferred);

        let projection = if query.selects.is_empty() {
            primary.clone()
        } else {
            query
                .selects
                .iter()
                .map(|select| state.render_select(select, &primary))
                .collect::<Result<Vec<_>, _>>()?
                .join(", ")
        };
        let order = query
            .sorts
            .iter()
            .map(|sort| state.render_sort(sort, &primary))
            .collect::<Result<Vec<_>, _>>()?;

        let distinct = query.distinct || state.distinct;
        let mut text = format!(
            "SELECT {}{} FROM {}",
            if distinct { "DISTINCT " } else { "" },
            projection,
            state
                .from
                .iter()
                .map(FromEntry::render)
                .collect::<Vec<_>>()
                .join(", ")
        );
        if !conjuncts.is_empty() {
            text.push_str(" WHERE ");
            text.push_str(&conjuncts.join(" AND "));
        }
        if !order.is_empty() {
            text.push_str(" ORDER BY ");
            text.push_str(&order.join(", "));
        }

        let parameters = state.params.finish();
        tracing::debug!(
            roots = query.roots.len(),
            parameters = parameters.len(),
            "compiled archetype query"
        );

        Ok(CompiledQuery {
            text,
            parameters,
            first_result: query.first_result,
            max_results: match query.max_results {
                MaxResults::All => None,
                MaxResults::Limit(n) => Some(n),
            },
        })
    }
}

// =============================================================================
// COMPILATION STATE
// =============================================================================

/// A root type in the FROM list with the joins hanging off it.
struct FromEntry {
    backing_type: String,
    alias: String,
    joins: Vec<String>,
}

impl FromEntry {
    fn render(&self) -> String {
        let mut text = format!("{} AS {}", self.backing_type, self.alias);
        for join in &self.joins {
            text.push(' ');
            text.push_str(join);
        }
        text
    }
}

/// What an introduced alias ranges over.
struct Binding {
    descriptors: Vec<Arc<ArchetypeDescriptor>>,
    /// Index of the FROM entry the alias belongs to.
    root: usize,
}

struct Compilation<'a> {
    cache: &'a ArchetypeDescriptorCache,
    /// Caller-supplied aliases; never synthesized.
    reserved: HashSet<String>,
    ordinals: HashMap<String, usize>,
    bindings: HashMap<String, Binding>,
    from: Vec<FromEntry>,
    /// Top-level id correlations, emitted after every other predicate.
    deferred: Vec<String>,
    params: ParameterBinder,
    distinct: bool,
}

impl<'a> Compilation<'a> {
    fn new(cache: &'a ArchetypeDescriptorCache) -> Self {
        Self {
            cache,
            reserved: HashSet::new(),
            ordinals: HashMap::new(),
            bindings: HashMap::new(),
            from: Vec::new(),
            deferred: Vec::new(),
            params: ParameterBinder::default(),
            distinct: false,
        }
    }

    // -------------------------------------------------------------------------
    // Aliases
    // -------------------------------------------------------------------------

    fn reserve(&mut self, alias: Option<&str>) -> Result<(), QueryBuildError> {
        if let Some(alias) = alias {
            if !self.reserved.insert(alias.to_string()) {
                return Err(QueryBuildError::DuplicateAlias(alias.to_string()));
            }
        }
        Ok(())
    }

    fn reserve_aliases(&mut self, query: &ArchetypeQuery) -> Result<(), QueryBuildError> {
        for root in &query.roots {
            self.reserve(root.alias.as_deref())?;
        }
        for constraint in &query.constraints {
            self.reserve_in(constraint, 0)?;
        }
        Ok(())
    }

    fn reserve_in(&mut self, constraint: &Constraint, depth: usize) -> Result<(), QueryBuildError> {
        if depth > MAX_CONSTRAINT_DEPTH {
            return Err(QueryBuildError::TooDeep(MAX_CONSTRAINT_DEPTH));
        }
        match constraint {
            Constraint::Node(_) | Constraint::Id(_) => Ok(()),
            Constraint::Collection(collection) => {
                self.reserve(collection.requested_alias())?;
                collection
                    .constraints
                    .iter()
                    .try_for_each(|c| self.reserve_in(c, depth + 1))
            }
            Constraint::And(children) | Constraint::Or(children) => children
                .iter()
                .try_for_each(|c| self.reserve_in(c, depth + 1)),
            Constraint::Not(child) => self.reserve_in(child, depth + 1),
        }
    }

    /// The caller's alias, or `<base><ordinal>` skipping every name in use.
    fn assign_alias(&mut self, requested: Option<&str>, base: &str) -> String {
        if let Some(alias) = requested {
            return alias.to_string();
        }
        loop {
            let ordinal = self.ordinals.entry(base.to_string()).or_insert(0);
            let candidate = format!("{}{}", base, ordinal);
            *ordinal += 1;
            if !self.reserved.contains(&candidate) && !self.bindings.contains_key(&candidate) {
                return candidate;
            }
        }
    }

    fn binding(&self, alias: &str) -> Result<&Binding, QueryBuildError> {
        self.bindings
            .get(alias)
            .ok_or_else(|| QueryBuildError::UnknownAlias(alias.to_string()))
    }

    // -------------------------------------------------------------------------
    // Selectors
    // -------------------------------------------------------------------------

    fn add_root(&mut self, selector: &ArchetypeSelector) -> Result<Vec<String>, QueryBuildError> {
        let alias = self.assign_alias(selector.alias.as_deref(), &alias_base(&selector.archetypes));
        let (descriptors, narrowed) = self.resolve(selector, &alias)?;
        let exact = narrowed.then(|| descriptors.clone());

        self.from.push(FromEntry {
            backing_type: descriptors[0].backing_type().to_string(),
            alias: alias.clone(),
            joins: Vec::new(),
        });
        self.bindings.insert(
            alias.clone(),
            Binding {
                descriptors,
                root: self.from.len() - 1,
            },
        );
        self.distinct |= selector.distinct;

        Ok(self.selector_predicates(selector, &alias, exact.as_deref()))
    }

    /// Archetypes a selector names. At least one, all of one backing type.
    ///
    /// The flag is set when `primary_only` dropped archetypes the names
    /// themselves match, so the names alone no longer describe the set.
    fn resolve(
        &self,
        selector: &ArchetypeSelector,
        alias: &str,
    ) -> Result<(Vec<Arc<ArchetypeDescriptor>>, bool), QueryBuildError> {
        let mut resolved: Vec<Arc<ArchetypeDescriptor>> = Vec::new();

        match &selector.archetypes {
            ArchetypeTarget::ShortNames(names) => {
                if names.is_empty() {
                    return Err(QueryBuildError::InvalidSelector {
                        name: alias.to_string(),
                        reason: "no archetype names".to_string(),
                    });
                }
                for name in names {
                    let pattern = parse_pattern(name)?;
                    for descriptor in self.cache.matching(&pattern, false) {
                        if !resolved.iter().any(|d| d.short_name() == descriptor.short_name()) {
                            resolved.push(descriptor);
                        }
                    }
                }
            }
            ArchetypeTarget::Triple {
                rm_name,
                entity_name,
                concept,
            } => {
                let rm = rm_name.as_deref().map(parse_pattern).transpose()?;
                let entity = entity_name.as_deref().map(parse_pattern).transpose()?;
                let concept = concept.as_deref().map(parse_pattern).transpose()?;
                resolved = self
                    .cache
                    .select(rm.as_ref(), entity.as_ref(), concept.as_ref());
            }
        }

        let matched = resolved.len();
        if selector.primary_only {
            resolved.retain(|d| d.is_primary());
        }
        let narrowed = resolved.len() < matched;

        if resolved.is_empty() {
            return Err(QueryBuildError::NoMatchingArchetypes(
                selector.archetypes.to_string(),
            ));
        }

        let mut types: Vec<&str> = Vec::new();
        for descriptor in &resolved {
            if !types.contains(&descriptor.backing_type()) {
                types.push(descriptor.backing_type());
            }
        }
        if types.len() > 1 {
            return Err(QueryBuildError::IncompatibleTypes {
                alias: alias.to_string(),
                types: types.join(", "),
            });
        }

        Ok((resolved, narrowed))
    }

    /// Conjuncts restricting `alias` to the selector's archetypes.
    ///
    /// With `exact` set, the archetypes are spelled out one by one instead
    /// of rendering the selector's names.
    fn selector_predicates(
        &mut self,
        selector: &ArchetypeSelector,
        alias: &str,
        exact: Option<&[Arc<ArchetypeDescriptor>]>,
    ) -> Vec<String> {
        let mut parts = match (exact, &selector.archetypes) {
            (Some(descriptors), _) => self.exact_predicates(alias, descriptors),
            (None, ArchetypeTarget::ShortNames(names)) if names.len() == 1 => {
                self.short_name_predicates(alias, &names[0])
            }
            // Any name matching everything lifts the restriction before a parameter is bound.
            (None, ArchetypeTarget::ShortNames(names))
                if names
                    .iter()
                    .any(|n| n.trim().chars().all(|c| c == WILDCARD || c == '.')) =>
            {
                Vec::new()
            }
            (None, ArchetypeTarget::ShortNames(names)) => {
                let mut disjuncts = Vec::with_capacity(names.len());
                for name in names {
                    let conjunction = self.short_name_predicates(alias, name);
                    match conjunction.len() {
                        0 => {}
                        1 => disjuncts.extend(conjunction),
                        _ => disjuncts.push(format!("({})", conjunction.join(" AND "))),
                    }
                }
                vec![format!("({})", disjuncts.join(" OR "))]
            }
            (
                None,
                ArchetypeTarget::Triple {
                    rm_name,
                    entity_name,
                    concept,
                },
            ) => [
                (RM_NAME_PATH, rm_name),
                (ENTITY_NAME_PATH, entity_name),
                (CONCEPT_PATH, concept),
            ]
            .into_iter()
            .filter_map(|(path, component)| {
                component
                    .as_deref()
                    .and_then(|c| self.component_predicate(alias, path, c))
            })
            .collect(),
        };

        if selector.active_only {
            parts.push(format!("{}.{} = true", alias, ACTIVE_PATH));
        }
        parts
    }

    /// Exact entity and concept equality per archetype, OR-ed when several.
    fn exact_predicates(
        &mut self,
        alias: &str,
        descriptors: &[Arc<ArchetypeDescriptor>],
    ) -> Vec<String> {
        let mut disjuncts = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            let id = descriptor.id();
            let conjunction: Vec<String> = [
                (ENTITY_NAME_PATH, id.entity_name()),
                (CONCEPT_PATH, id.concept()),
            ]
            .into_iter()
            .filter_map(|(path, component)| self.component_predicate(alias, path, component))
            .collect();
            disjuncts.push(conjunction.join(" AND "));
        }
        match disjuncts.len() {
            1 => disjuncts,
            _ => vec![format!(
                "({})",
                disjuncts
                    .iter()
                    .map(|d| format!("({})", d))
                    .collect::<Vec<_>>()
                    .join(" OR ")
            )],
        }
    }

    /// Split a (validated) short-name pattern into entity and concept predicates.
    fn short_name_predicates(&mut self, alias: &str, name: &str) -> Vec<String> {
        let name = name.trim();
        let leading = name.starts_with(WILDCARD);
        let trailing = name.len() > 1 && name.ends_with(WILDCARD);
        let body = name.trim_matches(WILDCARD);

        match body.split_once('.') {
            Some((entity, concept)) => {
                let entity = if leading {
                    format!("{}{}", WILDCARD, entity)
                } else {
                    entity.to_string()
                };
                let concept = if trailing {
                    format!("{}{}", concept, WILDCARD)
                } else {
                    concept.to_string()
                };
                [(ENTITY_NAME_PATH, entity), (CONCEPT_PATH, concept)]
                    .into_iter()
                    .filter_map(|(path, component)| self.component_predicate(alias, path, &component))
                    .collect()
            }
            None if body.is_empty() => Vec::new(),
            None => match (leading, trailing) {
                // `*text` ends inside the concept, `text*` starts inside the entity.
                (true, false) => self
                    .component_predicate(alias, CONCEPT_PATH, name)
                    .into_iter()
                    .collect(),
                (false, true) | (false, false) => self
                    .component_predicate(alias, ENTITY_NAME_PATH, name)
                    .into_iter()
                    .collect(),
                (true, true) => {
                    let entity = self.component_predicate(alias, ENTITY_NAME_PATH, name);
                    let concept = self.component_predicate(alias, CONCEPT_PATH, name);
                    let either: Vec<String> = entity.into_iter().chain(concept).collect();
                    vec![format!("({})", either.join(" OR "))]
                }
            },
        }
    }

    /// `=` for literal components, `LIKE` for wildcarded ones, nothing for `*`.
    fn component_predicate(&mut self, alias: &str, path: &str, component: &str) -> Option<String> {
        let component = component.trim();
        if component.is_empty() || component.chars().all(|c| c == WILDCARD) {
            return None;
        }
        let base = path.rsplit('.').next().unwrap_or(path);
        if component.contains(WILDCARD) {
            let param = self
                .params
                .bind(base, Value::Text(to_store_wildcards(component)));
            Some(format!("{}.{} LIKE :{}", alias, path, param))
        } else {
            let param = self.params.bind(base, Value::from(component));
            Some(format!("{}.{} = :{}", alias, path, param))
        }
    }

    // -------------------------------------------------------------------------
    // Nodes
    // -------------------------------------------------------------------------

    /// Resolve `alias.node` (or a bare node in `scope`) to its alias and descriptor.
    fn resolve_node(
        &self,
        reference: &str,
        scope: &str,
    ) -> Result<(String, NodeDescriptor), QueryBuildError> {
        let (alias, name) = reference.split_once('.').unwrap_or((scope, reference));
        let binding = self.binding(alias)?;

        let mut found: Option<&NodeDescriptor> = None;
        for node in binding.descriptors.iter().filter_map(|d| d.node(name)) {
            match found {
                None => found = Some(node),
                Some(first) if first.store_path() != node.store_path() => {
                    return Err(QueryBuildError::InconsistentNodePath {
                        alias: alias.to_string(),
                        node: name.to_string(),
                    });
                }
                Some(_) => {}
            }
        }

        found
            .cloned()
            .map(|node| (alias.to_string(), node))
            .ok_or_else(|| QueryBuildError::UnknownNode {
                alias: alias.to_string(),
                node: name.to_string(),
            })
    }

    fn render_node(
        &mut self,
        constraint: &NodeConstraint,
        scope: &str,
    ) -> Result<String, QueryBuildError> {
        let (alias, node) = self.resolve_node(&constraint.node, scope)?;
        let operator = constraint.operator;
        let (expected, ok) = operator.arity(constraint.values.len());
        if !ok {
            return Err(QueryBuildError::InvalidOperandCount {
                node: constraint.node.clone(),
                operator: operator.to_string(),
                expected,
                actual: constraint.values.len(),
            });
        }

        let column = format!("{}.{}", alias, node.store_path());
        let mut bind = |value: &Value| -> String {
            let value = match (operator, value) {
                (Operator::Like, Value::Text(text)) => Value::Text(to_store_wildcards(text)),
                _ => value.clone(),
            };
            format!(":{}", self.params.bind(&node.name, value))
        };

        Ok(match operator {
            Operator::IsNull | Operator::IsNotNull => format!("{} {}", column, operator),
            Operator::Between => {
                let low = bind(&constraint.values[0]);
                let high = bind(&constraint.values[1]);
                format!("{} BETWEEN {} AND {}", column, low, high)
            }
            Operator::In => {
                let names: Vec<String> = constraint.values.iter().map(&mut bind).collect();
                format!("{} IN ({})", column, names.join(", "))
            }
            _ => format!("{} {} {}", column, operator, bind(&constraint.values[0])),
        })
    }

    fn render_id_side(&self, side: &str) -> Result<String, QueryBuildError> {
        match side.split_once('.') {
            Some(_) => {
                let (alias, node) = self.resolve_node(side, "")?;
                Ok(format!("{}.{}.{}", alias, node.store_path(), LINK_ID_PATH))
            }
            None => {
                self.binding(side)?;
                Ok(format!("{}.{}", side, LINK_ID_PATH))
            }
        }
    }

    fn render_id(&self, constraint: &IdConstraint) -> Result<String, QueryBuildError> {
        let left = self.render_id_side(&constraint.left)?;
        let right = self.render_id_side(&constraint.right)?;
        let operator = match constraint.operator {
            IdOperator::Eq => "=",
            IdOperator::Ne => "!=",
        };
        Ok(format!("{} {} {}", left, operator, right))
    }

    // -------------------------------------------------------------------------
    // Constraint tree
    // -------------------------------------------------------------------------

    /// Compile one constraint into conjuncts of its enclosing conjunction.
    ///
    /// `top` is true only directly under the query's top-level conjunction
    /// (including through collection constraints); id correlations there are
    /// deferred to the end of the WHERE clause.
    fn compile_constraint(
        &mut self,
        constraint: &Constraint,
        scope: &str,
        depth: usize,
        top: bool,
    ) -> Result<Vec<String>, QueryBuildError> {
        if depth > MAX_CONSTRAINT_DEPTH {
            return Err(QueryBuildError::TooDeep(MAX_CONSTRAINT_DEPTH));
        }

        match constraint {
            Constraint::Node(node) => Ok(vec![self.render_node(node, scope)?]),
            Constraint::Collection(collection) => {
                self.compile_collection(collection, scope, depth, top)
            }
            Constraint::Id(id) => {
                let predicate = self.render_id(id)?;
                if top {
                    self.deferred.push(predicate);
                    Ok(Vec::new())
                } else {
                    Ok(vec![predicate])
                }
            }
            Constraint::And(children) => {
                let mut parts = Vec::new();
                for child in children {
                    parts.extend(self.compile_constraint(child, scope, depth + 1, false)?);
                }
                Ok(if parts.is_empty() {
                    parts
                } else {
                    vec![format!("({})", parts.join(" AND "))]
                })
            }
            Constraint::Or(children) => {
                let mut branches = Vec::new();
                for child in children {
                    let parts = self.compile_constraint(child, scope, depth + 1, false)?;
                    match parts.len() {
                        0 => {}
                        1 => branches.extend(parts),
                        _ => branches.push(format!("({})", parts.join(" AND "))),
                    }
                }
                Ok(if branches.is_empty() {
                    branches
                } else {
                    vec![format!("({})", branches.join(" OR "))]
                })
            }
            Constraint::Not(child) => {
                let parts = self.compile_constraint(child, scope, depth + 1, false)?;
                Ok(if parts.is_empty() {
                    parts
                } else {
                    vec![format!("NOT ({})", parts.join(" AND "))]
                })
            }
        }
    }

    fn compile_collection(
        &mut self,
        collection: &CollectionConstraint,
        scope: &str,
        depth: usize,
        top: bool,
    ) -> Result<Vec<String>, QueryBuildError> {
        let (parent, node) = self.resolve_node(&collection.node, scope)?;

        let selector = match &collection.selector {
            Some(selector) => selector.clone(),
            None => {
                let range = node.archetype_range().ok_or_else(|| {
                    QueryBuildError::NoArchetypeRange {
                        alias: parent.clone(),
                        node: node.name.clone(),
                    }
                })?;
                let names: Vec<&str> = range.short_names().collect();
                ArchetypeSelector::short_names(&names)
            }
        };

        let alias = self.assign_alias(
            collection.requested_alias(),
            &alias_base(&selector.archetypes),
        );
        let (descriptors, narrowed) = self.resolve(&selector, &alias)?;
        let exact = narrowed.then(|| descriptors.clone());
        let root = self.binding(&parent)?.root;

        let keyword = match collection.join {
            JoinType::Inner => "INNER JOIN",
            JoinType::LeftOuter => "LEFT OUTER JOIN",
        };
        self.from[root].joins.push(format!(
            "{} {}.{} AS {}",
            keyword,
            parent,
            node.store_path(),
            alias
        ));
        self.bindings
            .insert(alias.clone(), Binding { descriptors, root });
        self.distinct |= selector.distinct;

        let mut parts = self.selector_predicates(&selector, &alias, exact.as_deref());
        if collection.join == JoinType::LeftOuter && !parts.is_empty() {
            parts = vec![format!(
                "({}.{} IS NULL OR ({}))",
                alias,
                ID_PATH,
                parts.join(" AND ")
            )];
        }

        for nested in &collection.constraints {
            parts.extend(self.compile_constraint(nested, &alias, depth + 1, top)?);
        }
        Ok(parts)
    }

    // -------------------------------------------------------------------------
    // Projection and ordering
    // -------------------------------------------------------------------------

    fn render_select(
        &self,
        select: &SelectConstraint,
        primary: &str,
    ) -> Result<String, QueryBuildError> {
        match select {
            SelectConstraint::Alias(alias) => {
                self.binding(alias)?;
                Ok(alias.clone())
            }
            SelectConstraint::Node(reference) => {
                let (alias, node) = self.resolve_node(reference, primary)?;
                Ok(format!("{}.{}", alias, node.store_path()))
            }
        }
    }

    fn render_sort(&self, sort: &SortConstraint, primary: &str) -> Result<String, QueryBuildError> {
        let direction = |ascending: bool| if ascending { "ASC" } else { "DESC" };
        match sort {
            SortConstraint::Node { node, ascending } => {
                let (alias, node) = self.resolve_node(node, primary)?;
                Ok(format!(
                    "{}.{} {}",
                    alias,
                    node.store_path(),
                    direction(*ascending)
                ))
            }
            SortConstraint::Archetype {
                alias,
                property,
                ascending,
            } => {
                self.binding(alias)?;
                let path = match property {
                    ArchetypeProperty::RmName => RM_NAME_PATH,
                    ArchetypeProperty::EntityName => ENTITY_NAME_PATH,
                    ArchetypeProperty::Concept => CONCEPT_PATH,
                };
                Ok(format!("{}.{} {}", alias, path, direction(*ascending)))
            }
        }
    }
}

// =============================================================================
// HELPERS
// =============================================================================

fn parse_pattern(name: &str) -> Result<ShortNamePattern, QueryBuildError> {
    ShortNamePattern::parse(name).map_err(|reason| QueryBuildError::InvalidSelector {
        name: name.to_string(),
        reason,
    })
}

/// Entity name of the first archetype when it is literal, else `x`.
fn alias_base(target: &ArchetypeTarget) -> String {
    let entity = match target {
        ArchetypeTarget::ShortNames(names) => names
            .first()
            .and_then(|name| name.trim().split_once('.'))
            .map(|(entity, _)| entity),
        ArchetypeTarget::Triple { entity_name, .. } => entity_name.as_deref(),
    };
    match entity {
        Some(entity)
            if !entity.is_empty()
                && !ShortNamePattern::is_wildcard(entity)
                && entity.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') =>
        {
            entity.to_string()
        }
        _ => DEFAULT_ALIAS_BASE.to_string(),
    }
}

fn to_store_wildcards(text: &str) -> String {
    text.replace(WILDCARD, &STORE_WILDCARD.to_string())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::TextSource;

    const DESCRIPTORS: &str = r#"
[[archetype]]
name = "party.customerperson"
type = "Party"

[[archetype.node]]
name = "lastName"

[[archetype.node]]
name = "title"

[[archetype.node]]
name = "patients"
max_cardinality = "*"

[[archetype.node.assertion]]
name = "archetypeRange"
properties = { archetypes = ["party.patientpet"] }

[[archetype.node]]
name = "contacts"
max_cardinality = "*"

[[archetype.node.assertion]]
name = "archetypeRange"
properties = { archetypes = ["contact.*"] }

[[archetype]]
name = "party.patientpet"
type = "Party"

[[archetype.node]]
name = "name"

[[archetype.node]]
name = "species"
path = "/details/species"

[[archetype]]
name = "person.person"
type = "Party"

[[archetype.node]]
name = "name"

[[archetype.node]]
name = "code"
path = "/details/code"

[[archetype]]
name = "organization.organization"
type = "Party"

[[archetype.node]]
name = "name"

[[archetype.node]]
name = "code"
path = "/identity/code"

[[archetype]]
name = "contact.location"
type = "Contact"
primary = false

[[archetype.node]]
name = "address"

[[archetype]]
name = "contact.phoneNumber"
type = "Contact"
primary = false

[[archetype.node]]
name = "telephoneNumber"

[[archetype]]
name = "entityRelationship.patientOwner"
type = "EntityRelationship"

[[archetype.node]]
name = "source"

[[archetype.node]]
name = "target"
"#;

    fn cache() -> ArchetypeDescriptorCache {
        ArchetypeDescriptorCache::load(&TextSource::toml(DESCRIPTORS)).expect("descriptors")
    }

    fn customers() -> ArchetypeSelector {
        ArchetypeSelector::short_name("party.customerperson").with_alias("c")
    }

    fn compile(query: &ArchetypeQuery) -> CompiledQuery {
        QueryCompiler::new(&cache()).compile(query).expect("compile")
    }

    fn compile_err(query: &ArchetypeQuery) -> QueryBuildError {
        QueryCompiler::new(&cache())
            .compile(query)
            .expect_err("compile should fail")
    }

    #[test]
    fn single_selector_with_equality() {
        let compiled = compile(&ArchetypeQuery::new(customers()).add(Constraint::eq("c.lastName", "Smith")));

        assert_eq!(
            compiled.text,
            "SELECT c FROM Party AS c WHERE c.archetypeId.entityName = :entityName0 \
             AND c.archetypeId.concept = :concept0 AND c.lastName = :lastName0"
        );
        assert_eq!(
            compiled.parameters.names().collect::<Vec<_>>(),
            vec!["entityName0", "concept0", "lastName0"]
        );
        assert_eq!(compiled.parameters.get("lastName0"), Some(&Value::from("Smith")));
        assert_eq!(compiled.parameters.get("concept0"), Some(&Value::from("customerperson")));
        assert_eq!(compiled.first_result, 0);
        assert_eq!(compiled.max_results, None);
    }

    #[test]
    fn polymorphic_selector_is_a_disjunction() {
        let selector = ArchetypeSelector::short_names(&["person.person", "organization.organization"]);
        let compiled = compile(&ArchetypeQuery::new(selector));

        assert_eq!(
            compiled.text,
            "SELECT person0 FROM Party AS person0 WHERE \
             ((person0.archetypeId.entityName = :entityName0 AND person0.archetypeId.concept = :concept0) \
             OR (person0.archetypeId.entityName = :entityName1 AND person0.archetypeId.concept = :concept1))"
        );
        assert_eq!(compiled.parameters.get("entityName1"), Some(&Value::from("organization")));
    }

    #[test]
    fn wildcard_components_use_like() {
        let compiled = compile(&ArchetypeQuery::new(
            ArchetypeSelector::short_name("party.customer*").with_alias("c"),
        ));
        assert_eq!(
            compiled.text,
            "SELECT c FROM Party AS c WHERE c.archetypeId.entityName = :entityName0 \
             AND c.archetypeId.concept LIKE :concept0"
        );
        assert_eq!(compiled.parameters.get("concept0"), Some(&Value::from("customer%")));

        let any_entity = compile(&ArchetypeQuery::new(
            ArchetypeSelector::short_name("*.patientpet").with_alias("p"),
        ));
        assert_eq!(
            any_entity.text,
            "SELECT p FROM Party AS p WHERE p.archetypeId.concept = :concept0"
        );
    }

    #[test]
    fn primary_only_spells_out_the_surviving_archetypes() {
        let cache = ArchetypeDescriptorCache::load(&TextSource::toml(
            r#"
[[archetype]]
name = "contact.location"
type = "Contact"
primary = false

[[archetype]]
name = "contact.phoneNumber"
type = "Contact"

[[archetype]]
name = "contact.email"
type = "Contact"
"#,
        ))
        .expect("descriptors");
        let compiler = QueryCompiler::new(&cache);

        let all = compiler
            .compile(&ArchetypeQuery::new(
                ArchetypeSelector::short_name("contact.*").with_alias("c"),
            ))
            .expect("compile");
        assert_eq!(
            all.text,
            "SELECT c FROM Contact AS c WHERE c.archetypeId.entityName = :entityName0"
        );

        let primary = compiler
            .compile(&ArchetypeQuery::new(
                ArchetypeSelector::short_name("contact.*")
                    .with_alias("c")
                    .primary_only(),
            ))
            .expect("compile");
        assert_eq!(
            primary.text,
            "SELECT c FROM Contact AS c WHERE \
             ((c.archetypeId.entityName = :entityName0 AND c.archetypeId.concept = :concept0) \
             OR (c.archetypeId.entityName = :entityName1 AND c.archetypeId.concept = :concept1))"
        );
        assert_eq!(primary.parameters.get("concept0"), Some(&Value::from("phoneNumber")));
        assert_eq!(primary.parameters.get("concept1"), Some(&Value::from("email")));
        assert!(primary.parameters.iter().all(|(_, v)| v != &Value::from("location")));

        // Nothing dropped: the names still describe the set.
        let unchanged = compiler
            .compile(&ArchetypeQuery::new(
                ArchetypeSelector::short_name("contact.phone*")
                    .with_alias("c")
                    .primary_only(),
            ))
            .expect("compile");
        assert_eq!(
            unchanged.text,
            "SELECT c FROM Contact AS c WHERE c.archetypeId.entityName = :entityName0 \
             AND c.archetypeId.concept LIKE :concept0"
        );
    }

    #[test]
    fn triple_selector_and_active_flag() {
        let compiled = compile(&ArchetypeQuery::new(
            ArchetypeSelector::triple(None, Some("party"), Some("patient*"))
                .with_alias("p")
                .active_only(),
        ));
        assert_eq!(
            compiled.text,
            "SELECT p FROM Party AS p WHERE p.archetypeId.entityName = :entityName0 \
             AND p.archetypeId.concept LIKE :concept0 AND p.active = true"
        );
    }

    #[test]
    fn inactive_flag_emits_nothing() {
        let compiled = compile(&ArchetypeQuery::new(customers()));
        assert!(!compiled.text.contains("active"));
    }

    #[test]
    fn collection_with_two_sorts() {
        let query = ArchetypeQuery::new(customers())
            .add(
                CollectionConstraint::new("patients")
                    .with_alias("p")
                    .add(Constraint::eq("name", "Fido")),
            )
            .sort(SortConstraint::node("lastName", true))
            .sort(SortConstraint::archetype("c", ArchetypeProperty::Concept, false));
        let compiled = compile(&query);

        assert_eq!(
            compiled.text,
            "SELECT c FROM Party AS c INNER JOIN c.patients AS p WHERE \
             c.archetypeId.entityName = :entityName0 AND c.archetypeId.concept = :concept0 \
             AND p.archetypeId.entityName = :entityName1 AND p.archetypeId.concept = :concept1 \
             AND p.name = :name0 ORDER BY c.lastName ASC, c.archetypeId.concept DESC"
        );
    }

    #[test]
    fn left_outer_join_is_null_tolerant() {
        let query = ArchetypeQuery::new(customers()).add(
            CollectionConstraint::new("c.contacts")
                .with_selector(ArchetypeSelector::short_name("contact.location").with_alias("l"))
                .left_outer(),
        );
        let compiled = compile(&query);

        assert_eq!(
            compiled.text,
            "SELECT c FROM Party AS c LEFT OUTER JOIN c.contacts AS l WHERE \
             c.archetypeId.entityName = :entityName0 AND c.archetypeId.concept = :concept0 \
             AND (l.id IS NULL OR (l.archetypeId.entityName = :entityName1 \
             AND l.archetypeId.concept = :concept1))"
        );
    }

    #[test]
    fn collection_selector_from_range() {
        let query = ArchetypeQuery::new(customers()).add(CollectionConstraint::new("contacts"));
        let compiled = compile(&query);
        assert!(compiled.text.contains("INNER JOIN c.contacts AS contact0"));
        assert!(compiled
            .text
            .contains("contact0.archetypeId.entityName = :entityName1"));
    }

    #[test]
    fn three_roots_with_id_correlation() {
        let query = ArchetypeQuery::new(customers())
            .add_root(
                ArchetypeSelector::short_name("entityRelationship.patientOwner").with_alias("r"),
            )
            .add_root(ArchetypeSelector::short_name("party.patientpet").with_alias("p"))
            .add(Constraint::id_eq("c", "r.source"))
            .add(Constraint::eq("p.name", "Fido"))
            .add(Constraint::id_eq("p", "r.target"));
        let compiled = compile(&query);

        assert_eq!(
            compiled.text,
            "SELECT c FROM Party AS c, EntityRelationship AS r, Party AS p WHERE \
             c.archetypeId.entityName = :entityName0 AND c.archetypeId.concept = :concept0 \
             AND r.archetypeId.entityName = :entityName1 AND r.archetypeId.concept = :concept1 \
             AND p.archetypeId.entityName = :entityName2 AND p.archetypeId.concept = :concept2 \
             AND p.name = :name0 AND c.linkId = r.source.linkId AND p.linkId = r.target.linkId"
        );
    }

    #[test]
    fn boolean_tree_mirrors_shape() {
        let query = ArchetypeQuery::new(customers()).add(Constraint::or(vec![
            Constraint::is_null("title"),
            Constraint::and(vec![
                Constraint::like("lastName", "Sm*"),
                Constraint::not(Constraint::is_in("title", ["MR", "MS"])),
            ]),
            Constraint::between("lastName", "A", "M"),
        ]));
        let compiled = compile(&query);

        assert!(compiled.text.ends_with(
            "AND (c.title IS NULL OR (c.lastName LIKE :lastName0 AND NOT (c.title IN (:title0, :title1))) \
             OR c.lastName BETWEEN :lastName1 AND :lastName2)"
        ));
        assert_eq!(compiled.parameters.get("lastName0"), Some(&Value::from("Sm%")));
        assert_eq!(compiled.parameters.get("lastName2"), Some(&Value::from("M")));
    }

    #[test]
    fn id_constraint_inside_or_stays_in_place() {
        let query = ArchetypeQuery::new(customers())
            .add_root(ArchetypeSelector::short_name("party.patientpet").with_alias("p"))
            .add(Constraint::or(vec![
                Constraint::id_eq("c", "p"),
                Constraint::id_ne("c", "p"),
            ]));
        let compiled = compile(&query);
        assert!(compiled
            .text
            .ends_with("AND (c.linkId = p.linkId OR c.linkId != p.linkId)"));
    }

    #[test]
    fn node_paths_resolve_through_descriptor() {
        let query = ArchetypeQuery::new(ArchetypeSelector::short_name("party.patientpet").with_alias("p"))
            .add(Constraint::eq("species", "CANINE"))
            .select(SelectConstraint::Node("p.species".to_string()))
            .select(SelectConstraint::Alias("p".to_string()));
        let compiled = compile(&query);

        assert!(compiled.text.starts_with("SELECT p.details.species, p FROM Party AS p"));
        assert!(compiled.text.contains("p.details.species = :species0"));
    }

    #[test]
    fn alias_synthesis_skips_caller_aliases() {
        let query = ArchetypeQuery::new(ArchetypeSelector::short_name("party.customerperson"))
            .add_root(ArchetypeSelector::short_name("party.patientpet").with_alias("party0"))
            .add_root(ArchetypeSelector::short_name("party.patientpet"));
        let compiled = compile(&query);
        assert!(compiled
            .text
            .starts_with("SELECT party1 FROM Party AS party1, Party AS party0, Party AS party2"));
    }

    #[test]
    fn distinct_and_pagination() {
        let query = ArchetypeQuery::new(customers().distinct())
            .first_result(20)
            .max_results(MaxResults::Limit(10));
        let compiled = compile(&query);
        assert!(compiled.text.starts_with("SELECT DISTINCT c FROM"));
        assert_eq!(compiled.first_result, 20);
        assert_eq!(compiled.max_results, Some(10));
    }

    #[test]
    fn compilation_is_deterministic() {
        let query = ArchetypeQuery::new(ArchetypeSelector::short_names(&["party.*", "person.person"]))
            .add(Constraint::is_in("name", ["a", "b", "c"]))
            .add(CollectionConstraint::new("patients").add(Constraint::like("name", "F*")));
        let cache = cache();
        let compiler = QueryCompiler::new(&cache);
        assert_eq!(
            compiler.compile(&query).expect("first"),
            compiler.compile(&query).expect("second")
        );
    }

    #[test]
    fn build_errors() {
        assert_eq!(
            compile_err(&ArchetypeQuery::new(ArchetypeSelector::short_name("party.unknown"))),
            QueryBuildError::NoMatchingArchetypes("[party.unknown]".to_string())
        );
        assert!(matches!(
            compile_err(&ArchetypeQuery::new(ArchetypeSelector::short_names(&[
                "party.customerperson",
                "contact.location"
            ]))),
            QueryBuildError::IncompatibleTypes { .. }
        ));
        assert!(matches!(
            compile_err(&ArchetypeQuery::new(ArchetypeSelector::short_name("par*ty.x"))),
            QueryBuildError::InvalidSelector { .. }
        ));
        assert_eq!(
            compile_err(&ArchetypeQuery::new(customers()).sort(SortConstraint::archetype(
                "z",
                ArchetypeProperty::Concept,
                true
            ))),
            QueryBuildError::UnknownAlias("z".to_string())
        );
        assert_eq!(
            compile_err(&ArchetypeQuery::new(customers()).add_root(customers())),
            QueryBuildError::DuplicateAlias("c".to_string())
        );
        assert_eq!(
            compile_err(&ArchetypeQuery::new(customers()).add(Constraint::eq("c.weight", 3_i64))),
            QueryBuildError::UnknownNode {
                alias: "c".to_string(),
                node: "weight".to_string()
            }
        );
        assert!(matches!(
            compile_err(&ArchetypeQuery::new(customers()).add(Constraint::is_in(
                "lastName",
                Vec::<Value>::new()
            ))),
            QueryBuildError::InvalidOperandCount { actual: 0, .. }
        ));
        assert!(matches!(
            compile_err(&ArchetypeQuery::new(customers()).add(CollectionConstraint::new("title"))),
            QueryBuildError::NoArchetypeRange { .. }
        ));
        assert!(matches!(
            compile_err(
                &ArchetypeQuery::new(ArchetypeSelector::short_names(&[
                    "person.person",
                    "organization.organization"
                ]))
                .add(Constraint::eq("code", "X"))
            ),
            QueryBuildError::InconsistentNodePath { .. }
        ));
    }

    #[test]
    fn id_alias_must_be_introduced() {
        let query = ArchetypeQuery::new(customers()).add(Constraint::id_eq("c", "p"));
        assert_eq!(compile_err(&query), QueryBuildError::UnknownAlias("p".to_string()));
    }

    #[test]
    fn no_roots() {
        let mut query = ArchetypeQuery::new(customers());
        query.roots.clear();
        assert_eq!(compile_err(&query), QueryBuildError::NoRootSelector);
    }

    #[test]
    fn deep_trees_are_rejected() {
        let mut constraint = Constraint::eq("lastName", "Smith");
        for _ in 0..=MAX_CONSTRAINT_DEPTH {
            constraint = Constraint::not(constraint);
        }
        let query = ArchetypeQuery::new(customers()).add(constraint);
        assert_eq!(
            compile_err(&query),
            QueryBuildError::TooDeep(MAX_CONSTRAINT_DEPTH)
        );
    }
}
