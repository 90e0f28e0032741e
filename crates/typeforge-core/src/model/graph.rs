//! Finalized, immutable type registry of one module.

use std::collections::{BTreeSet, HashMap, HashSet};

use super::instance::{TypeId, TypeInstance};
use super::key::TypeKey;
use crate::error::Diagnostic;

/// The result of a resolution run over one module.
///
/// Every instance in here is finalized: placeholders have been filled in and
/// nothing mutates afterwards. The graph is handed to the allocator and the
/// code writer by shared reference and dropped when the module is emitted.
#[derive(Debug, Clone)]
pub struct ResolvedGraph
{
    module: String,
    instances: Vec<TypeInstance>,
    keys: Vec<TypeKey>,
    index: HashMap<TypeKey, TypeId>,
    roots: Vec<TypeId>,
    illegal: BTreeSet<TypeId>,
    diagnostics: Vec<Diagnostic>,
}

impl ResolvedGraph
{
    pub(crate) fn new(
        module: String,
        instances: Vec<TypeInstance>,
        keys: Vec<TypeKey>,
        index: HashMap<TypeKey, TypeId>,
        roots: Vec<TypeId>,
        illegal: BTreeSet<TypeId>,
        diagnostics: Vec<Diagnostic>,
    ) -> Self
    {
        Self {
            module,
            instances,
            keys,
            index,
            roots,
            illegal,
            diagnostics,
        }
    }

    /// Module this graph was resolved from.
    #[must_use]
    pub fn module(&self) -> &str
    {
        &self.module
    }

    /// Instance behind a handle.
    ///
    /// ## Panics
    ///
    /// Panics if `id` was issued by a different registry.
    #[must_use]
    pub fn get(&self, id: TypeId) -> &TypeInstance
    {
        &self.instances[id.index()]
    }

    /// Canonical key of an instance.
    #[must_use]
    pub fn key(&self, id: TypeId) -> &TypeKey
    {
        &self.keys[id.index()]
    }

    /// Find the instance registered under a key.
    #[must_use]
    pub fn lookup(&self, key: &TypeKey) -> Option<TypeId>
    {
        self.index.get(key).copied()
    }

    /// Number of registered instances.
    #[must_use]
    pub fn len(&self) -> usize
    {
        self.instances.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool
    {
        self.instances.is_empty()
    }

    /// All instances in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (TypeId, &TypeInstance)>
    {
        self.instances
            .iter()
            .enumerate()
            .map(|(index, instance)| (TypeId::from_index(index), instance))
    }

    /// All handles sorted by canonical key.
    #[must_use]
    pub fn ids_by_key(&self) -> Vec<TypeId>
    {
        let mut ids: Vec<TypeId> = (0..self.instances.len()).map(TypeId::from_index).collect();
        ids.sort_by(|a, b| self.key(*a).cmp(self.key(*b)));
        ids
    }

    /// Resolved roots, deduplicated, in request order.
    #[must_use]
    pub fn roots(&self) -> &[TypeId]
    {
        &self.roots
    }

    /// Whether the type was rejected as part of an illegal value cycle.
    #[must_use]
    pub fn is_illegal(&self, id: TypeId) -> bool
    {
        self.illegal.contains(&id)
    }

    /// Types rejected as part of an illegal value cycle.
    #[must_use]
    pub fn illegal(&self) -> &BTreeSet<TypeId>
    {
        &self.illegal
    }

    /// Per-type problems found while resolving.
    #[must_use]
    pub fn diagnostics(&self) -> &[Diagnostic]
    {
        &self.diagnostics
    }

    /// Whether the type is, or holds by value, an `Undefined` instance.
    ///
    /// Only value edges are followed: fields, bases, array elements and enum
    /// storage. A pointer to an undefined type is still a perfectly sized
    /// pointer, so pointers stop the search. That asymmetry is what lets
    /// self-referential structures and forward-declared pointees come out as
    /// fully defined.
    #[must_use]
    pub fn contains_undefined(&self, id: TypeId) -> bool
    {
        let mut visited = HashSet::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            let instance = self.get(current);
            if instance.is_undefined() {
                return true;
            }
            stack.extend(instance.value_dependencies());
        }
        false
    }
}
