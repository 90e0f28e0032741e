//! Arena of type instances under construction.

use std::collections::HashMap;

use crate::model::{TypeId, TypeInstance, TypeKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState
{
    /// Registered so references to it can be taken, body still pending
    Placeholder,
    Finalized,
}

/// Canonicalizing arena: at most one instance per [`TypeKey`].
///
/// Aggregates are reserved as placeholders before their bodies are resolved,
/// which is what allows them to be reached again (through pointers) while
/// they are still being built. Only the resolver can see placeholders.
#[derive(Debug, Default)]
pub(crate) struct TypeRegistry
{
    instances: Vec<TypeInstance>,
    keys: Vec<TypeKey>,
    states: Vec<SlotState>,
    index: HashMap<TypeKey, TypeId>,
}

impl TypeRegistry
{
    pub(crate) fn lookup(&self, key: &TypeKey) -> Option<TypeId>
    {
        self.index.get(key).copied()
    }

    pub(crate) fn get(&self, id: TypeId) -> &TypeInstance
    {
        &self.instances[id.index()]
    }

    pub(crate) fn key(&self, id: TypeId) -> &TypeKey
    {
        &self.keys[id.index()]
    }

    /// Register a finished instance, or return the one already under `key`.
    pub(crate) fn intern(&mut self, key: TypeKey, instance: TypeInstance) -> TypeId
    {
        self.insert(key, instance, SlotState::Finalized)
    }

    /// Register an aggregate shell whose body will be filled in later.
    pub(crate) fn reserve(&mut self, key: TypeKey, shell: TypeInstance) -> TypeId
    {
        self.insert(key, shell, SlotState::Placeholder)
    }

    /// Replace a placeholder with its completed instance.
    pub(crate) fn finalize(&mut self, id: TypeId, instance: TypeInstance)
    {
        debug_assert_eq!(self.states[id.index()], SlotState::Placeholder, "{id} finalized twice");
        self.instances[id.index()] = instance;
        self.states[id.index()] = SlotState::Finalized;
    }

    pub(crate) fn pending(&self) -> usize
    {
        self.states
            .iter()
            .filter(|state| **state == SlotState::Placeholder)
            .count()
    }

    pub(crate) fn into_parts(self) -> (Vec<TypeInstance>, Vec<TypeKey>, HashMap<TypeKey, TypeId>)
    {
        (self.instances, self.keys, self.index)
    }

    fn insert(&mut self, key: TypeKey, instance: TypeInstance, state: SlotState) -> TypeId
    {
        if let Some(existing) = self.index.get(&key) {
            return *existing;
        }
        let id = TypeId::from_index(self.instances.len());
        self.instances.push(instance);
        self.keys.push(key.clone());
        self.states.push(state);
        self.index.insert(key, id);
        id
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::model::{AggregateKind, PrimitiveKind, UserType};

    #[test]
    fn test_intern_deduplicates()
    {
        let mut registry = TypeRegistry::default();
        let a = registry.intern(TypeKey::Primitive(PrimitiveKind::I32), TypeInstance::Primitive(PrimitiveKind::I32));
        let b = registry.intern(TypeKey::Primitive(PrimitiveKind::I32), TypeInstance::Primitive(PrimitiveKind::I32));
        assert_eq!(a, b);
        assert_eq!(registry.into_parts().0.len(), 1);
    }

    #[test]
    fn test_placeholder_lifecycle()
    {
        let mut registry = TypeRegistry::default();
        let shell = UserType::shell("Node".into(), Vec::new(), AggregateKind::Struct, 8);
        let id = registry.reserve(TypeKey::named("app", "Node"), TypeInstance::Aggregate(shell.clone()));
        assert_eq!(registry.pending(), 1);
        assert_eq!(registry.lookup(&TypeKey::named("app", "Node")), Some(id));

        let mut body = shell;
        body.size = 16;
        registry.finalize(id, TypeInstance::Aggregate(body));
        assert_eq!(registry.pending(), 0);
        assert_eq!(registry.get(id).user_type().map(|user| user.size), Some(16));
    }
}
