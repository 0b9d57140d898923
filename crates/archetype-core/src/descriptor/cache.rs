//! # Descriptor Cache
//!
//! The indexed, immutable snapshot of all loaded archetypes, and the
//! registry handle that publishes snapshots atomically.
//!
//! ## Concurrency
//!
//! A cache is never mutated after `from_set` returns. Any number of threads
//! may read it at once. `DescriptorRegistry::reload` builds a complete new
//! cache and swaps it in with one atomic store: readers see either the old
//! snapshot or the new one, never a mix.

use super::assertion::check_builtin;
use super::source::{ArchetypeDef, DescriptorSet, DescriptorSource, NodeDef};
use super::{ArchetypeDescriptor, AssertionTypeDescriptor, Cardinality, NodeDescriptor};
use crate::pattern::ShortNamePattern;
use crate::primitives::BUILTIN_ASSERTION_TYPES;
use crate::{ArchetypeError, ArchetypeId, DescriptorLoadError};
use arc_swap::ArcSwap;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

// =============================================================================
// CACHE
// =============================================================================

/// Archetype name → descriptor registry.
#[derive(Debug, Clone, Default)]
pub struct ArchetypeDescriptorCache {
    /// Declaration order.
    archetypes: Vec<Arc<ArchetypeDescriptor>>,
    /// Short name → position in `archetypes`. Lookup only, never iterated.
    index: HashMap<String, usize>,
    assertion_types: BTreeMap<String, AssertionTypeDescriptor>,
}

impl ArchetypeDescriptorCache {
    /// An empty cache that still knows the built-in assertion types.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            assertion_types: builtin_assertion_types(),
            ..Self::default()
        }
    }

    /// Read a source and build a cache from it.
    pub fn load(source: &dyn DescriptorSource) -> Result<Self, DescriptorLoadError> {
        let set = source.read()?;
        let cache = Self::from_set(set)?;
        tracing::info!(
            source = %source.describe(),
            archetypes = cache.len(),
            assertion_types = cache.assertion_types.len(),
            "descriptor cache loaded"
        );
        Ok(cache)
    }

    /// Build a cache from raw definitions, checking every invariant.
    pub fn from_set(set: DescriptorSet) -> Result<Self, DescriptorLoadError> {
        let mut assertion_types = builtin_assertion_types();
        for declared in set.assertion_types {
            assertion_types.insert(declared.name.clone(), declared);
        }

        let mut archetypes = Vec::with_capacity(set.archetypes.len());
        let mut index = HashMap::with_capacity(set.archetypes.len());

        for def in set.archetypes {
            let descriptor = build_archetype(def, &assertion_types)?;
            let short_name = descriptor.short_name().to_string();
            if index.contains_key(&short_name) {
                return Err(DescriptorLoadError::DuplicateArchetype(short_name));
            }
            index.insert(short_name, archetypes.len());
            archetypes.push(Arc::new(descriptor));
        }

        Ok(Self {
            archetypes,
            index,
            assertion_types,
        })
    }

    /// Exact lookup by short or qualified name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<ArchetypeDescriptor>> {
        if let Some(&i) = self.index.get(name) {
            return Some(&self.archetypes[i]);
        }
        // Qualified names resolve through their short name.
        ArchetypeId::parse(name)
            .ok()
            .and_then(|id| self.get_by_id(&id))
    }

    #[must_use]
    pub fn get_by_id(&self, id: &ArchetypeId) -> Option<&Arc<ArchetypeDescriptor>> {
        self.index
            .get(id.short_name())
            .map(|&i| &self.archetypes[i])
    }

    /// All archetypes whose short name matches a wildcard pattern, in
    /// declaration order. A malformed pattern matches nothing.
    #[must_use]
    pub fn get_by_wildcard(&self, pattern: &str) -> Vec<Arc<ArchetypeDescriptor>> {
        match ShortNamePattern::parse(pattern) {
            Ok(pattern) => self.matching(&pattern, false),
            Err(reason) => {
                tracing::debug!(%reason, "wildcard lookup with malformed pattern");
                Vec::new()
            }
        }
    }

    /// Archetypes matching a parsed pattern, optionally primary ones only.
    #[must_use]
    pub fn matching(
        &self,
        pattern: &ShortNamePattern,
        primary_only: bool,
    ) -> Vec<Arc<ArchetypeDescriptor>> {
        if let ShortNamePattern::Exact(name) = pattern {
            return self
                .index
                .get(name)
                .map(|&i| &self.archetypes[i])
                .filter(|d| !primary_only || d.is_primary())
                .cloned()
                .into_iter()
                .collect();
        }

        self.archetypes
            .iter()
            .filter(|d| pattern.matches(d.short_name()))
            .filter(|d| !primary_only || d.is_primary())
            .cloned()
            .collect()
    }

    /// Short names matching a pattern, in declaration order.
    #[must_use]
    pub fn short_names(&self, pattern: &str, primary_only: bool) -> Vec<String> {
        match ShortNamePattern::parse(pattern) {
            Ok(pattern) => self
                .matching(&pattern, primary_only)
                .iter()
                .map(|d| d.short_name().to_string())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Archetypes matching a (reference model, entity, concept) triple.
    ///
    /// `None` components match anything; each component may be wildcarded.
    #[must_use]
    pub fn select(
        &self,
        rm_name: Option<&ShortNamePattern>,
        entity_name: Option<&ShortNamePattern>,
        concept: Option<&ShortNamePattern>,
    ) -> Vec<Arc<ArchetypeDescriptor>> {
        self.archetypes
            .iter()
            .filter(|d| {
                let id = d.id();
                let rm_ok = rm_name.is_none_or(|p| id.rm_name().is_some_and(|rm| p.matches(rm)));
                rm_ok
                    && entity_name.is_none_or(|p| p.matches(id.entity_name()))
                    && concept.is_none_or(|p| p.matches(id.concept()))
            })
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn assertion_type(&self, name: &str) -> Option<&AssertionTypeDescriptor> {
        self.assertion_types.get(name)
    }

    /// Declared assertion types, ordered by name.
    pub fn assertion_types(&self) -> impl Iterator<Item = &AssertionTypeDescriptor> {
        self.assertion_types.values()
    }

    /// Archetypes in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<ArchetypeDescriptor>> {
        self.archetypes.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.archetypes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.archetypes.is_empty()
    }
}

fn builtin_assertion_types() -> BTreeMap<String, AssertionTypeDescriptor> {
    BUILTIN_ASSERTION_TYPES
        .iter()
        .map(|name| {
            (
                (*name).to_string(),
                AssertionTypeDescriptor {
                    name: (*name).to_string(),
                    description: None,
                },
            )
        })
        .collect()
}

fn build_archetype(
    def: ArchetypeDef,
    assertion_types: &BTreeMap<String, AssertionTypeDescriptor>,
) -> Result<ArchetypeDescriptor, DescriptorLoadError> {
    let id = ArchetypeId::parse(&def.name).map_err(|e| match e {
        ArchetypeError::InvalidArchetypeId { name, reason } => {
            DescriptorLoadError::InvalidArchetypeName { name, reason }
        }
        other => DescriptorLoadError::InvalidArchetypeName {
            name: def.name.clone(),
            reason: other.to_string(),
        },
    })?;
    if def.backing_type.trim().is_empty() {
        return Err(DescriptorLoadError::InvalidArchetypeName {
            name: def.name,
            reason: "missing backing type".to_string(),
        });
    }

    let archetype = id.short_name().to_string();
    let mut seen = BTreeSet::new();
    let mut nodes = Vec::with_capacity(def.nodes.len());
    for node in def.nodes {
        if !seen.insert(node.name.clone()) {
            return Err(DescriptorLoadError::DuplicateNode {
                archetype,
                node: node.name,
            });
        }
        nodes.push(build_node(&archetype, node, assertion_types)?);
    }

    let display_name = def
        .display_name
        .unwrap_or_else(|| id.concept().to_string());
    Ok(ArchetypeDescriptor::new(
        id,
        display_name,
        def.backing_type,
        def.primary,
        nodes,
    ))
}

fn build_node(
    archetype: &str,
    def: NodeDef,
    assertion_types: &BTreeMap<String, AssertionTypeDescriptor>,
) -> Result<NodeDescriptor, DescriptorLoadError> {
    if def.name.trim().is_empty() || def.name.contains('.') {
        return Err(DescriptorLoadError::Malformed(format!(
            "invalid node name '{}' in {}",
            def.name, archetype
        )));
    }

    if let Cardinality::Bounded(max) = def.max_cardinality {
        if def.min_cardinality > max {
            return Err(DescriptorLoadError::InvalidCardinality {
                archetype: archetype.to_string(),
                node: def.name,
                min: def.min_cardinality,
                max,
            });
        }
    }

    let mut regexes = BTreeMap::new();
    for assertion in &def.assertions {
        if !assertion_types.contains_key(&assertion.name) {
            return Err(DescriptorLoadError::UnknownAssertionType {
                archetype: archetype.to_string(),
                node: def.name.clone(),
                assertion: assertion.name.clone(),
            });
        }
        let compiled =
            check_builtin(assertion).map_err(|reason| DescriptorLoadError::InvalidAssertion {
                archetype: archetype.to_string(),
                node: def.name.clone(),
                assertion: assertion.name.clone(),
                reason,
            })?;
        if let Some(regex) = compiled {
            regexes.insert(regex.expression.clone(), Arc::new(regex));
        }
    }

    let path = def.path.unwrap_or_else(|| format!("/{}", def.name));
    Ok(NodeDescriptor {
        display_name: def.display_name.unwrap_or_else(|| def.name.clone()),
        name: def.name,
        node_type: def.node_type,
        path,
        min_cardinality: def.min_cardinality,
        max_cardinality: def.max_cardinality,
        derived: def.derived,
        read_only: def.read_only,
        hidden: def.hidden,
        default_value: def.default_value,
        assertions: def.assertions,
        regexes,
    })
}

// =============================================================================
// REGISTRY
// =============================================================================

/// Owning handle over the current cache snapshot.
///
/// Lookups pin a snapshot with `snapshot()`; reloads publish a replacement
/// without blocking readers. A failed reload leaves the current snapshot
/// in place.
#[derive(Debug)]
pub struct DescriptorRegistry {
    current: ArcSwap<ArchetypeDescriptorCache>,
}

impl DescriptorRegistry {
    #[must_use]
    pub fn new(cache: ArchetypeDescriptorCache) -> Self {
        Self {
            current: ArcSwap::from_pointee(cache),
        }
    }

    /// Load the initial snapshot from a source.
    pub fn load(source: &dyn DescriptorSource) -> Result<Self, DescriptorLoadError> {
        ArchetypeDescriptorCache::load(source).map(Self::new)
    }

    /// The snapshot current at the time of the call.
    #[must_use]
    pub fn snapshot(&self) -> Arc<ArchetypeDescriptorCache> {
        self.current.load_full()
    }

    /// Rebuild from a source and publish the result.
    pub fn reload(
        &self,
        source: &dyn DescriptorSource,
    ) -> Result<Arc<ArchetypeDescriptorCache>, DescriptorLoadError> {
        let cache = match ArchetypeDescriptorCache::load(source) {
            Ok(cache) => Arc::new(cache),
            Err(e) => {
                tracing::warn!(error = %e, "descriptor reload failed, keeping current snapshot");
                return Err(e);
            }
        };
        self.current.store(Arc::clone(&cache));
        tracing::info!(archetypes = cache.len(), "descriptor snapshot published");
        Ok(cache)
    }

    /// Publish an already-built cache.
    pub fn publish(&self, cache: ArchetypeDescriptorCache) {
        self.current.store(Arc::new(cache));
    }
}

impl Default for DescriptorRegistry {
    fn default() -> Self {
        Self::new(ArchetypeDescriptorCache::empty())
    }
}

// =============================================================================
// TESTS
// =============================================================================
