//! # Archetype Service
//!
//! The narrow interface business code uses: create, validate, save, remove
//! and query objects by archetype name.
//!
//! Persistence is an external collaborator behind `PersistenceExecutor`.
//! The service only decides *what* to send it: validated objects and
//! compiled queries.

use crate::descriptor::DescriptorRegistry;
use crate::object::{ArchetypeObject, DynamicObject};
use crate::query::{ArchetypeQuery, CompiledQuery, QueryCompiler};
use crate::validation::{
    AssertionEvaluator, LookupResolver, NoLookups, ValidationError, Validator,
};
use crate::{ArchetypeError, ObjectReference, Value};
use std::sync::Arc;

/// One result row: the projected columns in SELECT order.
pub type Row = Vec<Value>;

// =============================================================================
// EXECUTOR SEAM
// =============================================================================

/// Runs compiled queries and stores individual objects.
///
/// Transactions, retries and timeouts belong to the implementation.
pub trait PersistenceExecutor: Send + Sync {
    fn execute(&self, query: &CompiledQuery) -> Result<Vec<Row>, ArchetypeError>;

    /// Insert or update an object, returning its id.
    fn save(&self, object: &DynamicObject) -> Result<u64, ArchetypeError>;

    /// Returns true if the object existed.
    fn remove(&self, reference: &ObjectReference) -> Result<bool, ArchetypeError>;

    fn get(&self, reference: &ObjectReference) -> Result<Option<DynamicObject>, ArchetypeError>;
}

// =============================================================================
// SERVICE
// =============================================================================

/// Ties the descriptor registry, validation and query compilation to an executor.
///
/// Every call works against the registry snapshot current at its start, so
/// a concurrent reload never affects an operation already in flight.
pub struct ArchetypeService<E: PersistenceExecutor> {
    registry: Arc<DescriptorRegistry>,
    lookups: Arc<dyn LookupResolver>,
    evaluators: Vec<Arc<dyn AssertionEvaluator>>,
    executor: E,
}

impl<E: PersistenceExecutor> ArchetypeService<E> {
    #[must_use]
    pub fn new(registry: Arc<DescriptorRegistry>, executor: E) -> Self {
        Self {
            registry,
            lookups: Arc::new(NoLookups),
            evaluators: Vec::new(),
            executor,
        }
    }

    #[must_use]
    pub fn with_lookups(mut self, lookups: Arc<dyn LookupResolver>) -> Self {
        self.lookups = lookups;
        self
    }

    #[must_use]
    pub fn with_evaluator(mut self, evaluator: Arc<dyn AssertionEvaluator>) -> Self {
        self.evaluators.push(evaluator);
        self
    }

    #[must_use]
    pub fn registry(&self) -> &DescriptorRegistry {
        &self.registry
    }

    #[must_use]
    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// A new, unsaved object with node defaults applied and collection
    /// nodes initialised to empty lists.
    pub fn create(&self, short_name: &str) -> Result<DynamicObject, ArchetypeError> {
        let cache = self.registry.snapshot();
        let descriptor = cache
            .get(short_name)
            .ok_or_else(|| ArchetypeError::UnknownArchetype(short_name.to_string()))?;

        let mut object = DynamicObject::new(descriptor.id().clone());
        for node in descriptor.nodes().filter(|n| !n.derived) {
            if node.is_collection() {
                object.set(&node.name, Value::List(Vec::new()))?;
            } else if let Some(default) = &node.default_value {
                object.set(&node.name, default.clone())?;
            }
        }
        Ok(object)
    }

    pub fn validate(
        &self,
        object: &dyn ArchetypeObject,
    ) -> Result<Vec<ValidationError>, ArchetypeError> {
        let cache = self.registry.snapshot();
        self.evaluators
            .iter()
            .fold(
                Validator::new(&cache).with_lookups(Arc::clone(&self.lookups)),
                |validator, evaluator| validator.with_evaluator(Arc::clone(evaluator)),
            )
            .validate(object)
    }

    /// Validate, then hand the object to the executor.
    ///
    /// An object with violations is refused with `ArchetypeError::Invalid`
    /// and never reaches the executor.
    pub fn save(&self, object: &mut DynamicObject) -> Result<ObjectReference, ArchetypeError> {
        let errors = self.validate(&*object)?;
        if !errors.is_empty() {
            tracing::debug!(
                archetype = %object.archetype_id(),
                errors = errors.len(),
                "refusing to save invalid object"
            );
            return Err(ArchetypeError::Invalid {
                archetype: object.archetype_id().to_string(),
                errors,
            });
        }

        let id = self.executor.save(object)?;
        object.set_id(id);
        tracing::debug!(archetype = %object.archetype_id(), id, "saved object");

        object
            .reference()
            .ok_or_else(|| ArchetypeError::Executor("saved object has no id".to_string()))
    }

    pub fn remove(&self, reference: &ObjectReference) -> Result<bool, ArchetypeError> {
        self.executor.remove(reference)
    }

    pub fn get(&self, reference: &ObjectReference) -> Result<Option<DynamicObject>, ArchetypeError> {
        self.executor.get(reference)
    }

    pub fn compile(&self, query: &ArchetypeQuery) -> Result<CompiledQuery, ArchetypeError> {
        let cache = self.registry.snapshot();
        Ok(QueryCompiler::new(&cache).compile(query)?)
    }

    /// Compile and execute.
    pub fn query(&self, query: &ArchetypeQuery) -> Result<Vec<Row>, ArchetypeError> {
        let compiled = self.compile(query)?;
        self.executor.execute(&compiled)
    }
}

// =============================================================================
// TESTS
// =============================================================================
