//! In-memory symbol provider.
//!
//! A fake [`SymbolProvider`] backed by plain maps, for tests and fixtures.
//! Types are registered by name (or by offset) with a builder API:
//!
//! ```rust
//! use typeforge_core::provider::{FieldShape, InMemoryProvider};
//!
//! let provider = InMemoryProvider::new()
//!     .with_struct("app", "Node", 16, vec![
//!         FieldShape::new("value", "i32", 0),
//!         FieldShape::new("next", "Node*", 8),
//!     ]);
//! ```
//!
//! Two shorthands keep fixtures small: an unregistered name that is a
//! primitive token (`i32`, `bool`, ...) describes that primitive, and an
//! unregistered name ending in `*` describes a pointer to the name without it.

use std::collections::BTreeMap;

use super::{AggregateShape, FieldShape, ShapeDescriptor, ShapeKind, SymbolProvider};
use crate::error::ProviderError;
use crate::model::{PrimitiveKind, TypeQuery};

const POINTER_SIZE: u64 = 8;

#[derive(Debug, Clone, Default)]
struct ModuleTypes
{
    by_name: BTreeMap<String, ShapeDescriptor>,
    by_offset: BTreeMap<u64, ShapeDescriptor>,
}

/// Map-backed [`SymbolProvider`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryProvider
{
    modules: BTreeMap<String, ModuleTypes>,
    queries: usize,
    fail_after: Option<usize>,
}

impl InMemoryProvider
{
    /// Create an empty provider.
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Declare a module with no types.
    #[must_use]
    pub fn with_module(mut self, module: &str) -> Self
    {
        self.modules.entry(module.to_string()).or_default();
        self
    }

    /// Register a shape under a name.
    #[must_use]
    pub fn with_type(mut self, module: &str, name: &str, shape: ShapeDescriptor) -> Self
    {
        self.insert(module, name, shape);
        self
    }

    /// Register a shape under a provider offset.
    #[must_use]
    pub fn with_type_at(mut self, module: &str, offset: u64, shape: ShapeDescriptor) -> Self
    {
        self.modules
            .entry(module.to_string())
            .or_default()
            .by_offset
            .insert(offset, shape);
        self
    }

    /// Register a plain struct.
    #[must_use]
    pub fn with_struct(self, module: &str, name: &str, size: u64, fields: Vec<FieldShape>) -> Self
    {
        let mut shape = AggregateShape::new(name);
        shape.fields = fields;
        self.with_type(module, name, ShapeDescriptor::new(size, ShapeKind::Aggregate(shape)))
    }

    /// Register an aggregate with full control over its shape.
    #[must_use]
    pub fn with_aggregate(self, module: &str, size: u64, shape: AggregateShape) -> Self
    {
        let name = shape.name.clone();
        self.with_type(module, &name, ShapeDescriptor::new(size, ShapeKind::Aggregate(shape)))
    }

    /// Register an enum.
    #[must_use]
    pub fn with_enum(self, module: &str, name: &str, underlying: PrimitiveKind, members: &[(&str, i128)]) -> Self
    {
        let shape = ShapeDescriptor::new(
            underlying.size().unwrap_or(4),
            ShapeKind::Enum {
                name: name.to_string(),
                underlying: TypeQuery::Primitive(underlying),
                members: members.iter().map(|(name, value)| ((*name).to_string(), *value)).collect(),
            },
        );
        self.with_type(module, name, shape)
    }

    /// Make every query after the first `queries` fail with a native error.
    #[must_use]
    pub fn fail_after(mut self, queries: usize) -> Self
    {
        self.fail_after = Some(queries);
        self
    }

    /// Register a shape under a name.
    pub fn insert(&mut self, module: &str, name: &str, shape: ShapeDescriptor)
    {
        self.modules
            .entry(module.to_string())
            .or_default()
            .by_name
            .insert(name.to_string(), shape);
    }

    /// Number of `lookup_type` calls answered so far.
    #[must_use]
    pub fn query_count(&self) -> usize
    {
        self.queries
    }

    fn shorthand(name: &str) -> Option<ShapeDescriptor>
    {
        if let Some(pointee) = name.strip_suffix('*') {
            return Some(ShapeDescriptor::new(
                POINTER_SIZE,
                ShapeKind::Pointer {
                    pointee: TypeQuery::name(pointee.trim_end()),
                },
            ));
        }
        PrimitiveKind::ALL
            .iter()
            .find(|kind| kind.token() == name)
            .map(|kind| ShapeDescriptor::new(kind.size().unwrap_or(0), ShapeKind::Primitive(*kind)))
    }
}

impl SymbolProvider for InMemoryProvider
{
    fn modules(&mut self) -> Result<Vec<String>, ProviderError>
    {
        Ok(self.modules.keys().cloned().collect())
    }

    fn type_names(&mut self, module: &str) -> Result<Vec<String>, ProviderError>
    {
        self.modules
            .get(module)
            .map(|types| types.by_name.keys().cloned().collect())
            .ok_or_else(|| ProviderError::UnknownModule(module.to_string()))
    }

    fn lookup_type(&mut self, module: &str, query: &TypeQuery) -> Result<Option<ShapeDescriptor>, ProviderError>
    {
        if self.fail_after.is_some_and(|limit| self.queries >= limit) {
            return Err(ProviderError::Native(format!("session lost while looking up {query}")));
        }
        self.queries += 1;

        if let TypeQuery::Primitive(kind) = query {
            return Ok(Some(ShapeDescriptor::new(kind.size().unwrap_or(0), ShapeKind::Primitive(*kind))));
        }
        let Some(types) = self.modules.get(module) else {
            return Ok(None);
        };
        Ok(match query {
            TypeQuery::Name(name) => types.by_name.get(name).cloned().or_else(|| Self::shorthand(name)),
            TypeQuery::Offset(offset) => types.by_offset.get(offset).cloned(),
            TypeQuery::Primitive(_) => None,
        })
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_shorthands()
    {
        let mut provider = InMemoryProvider::new().with_module("app");
        let pointer = provider.lookup_type("app", &TypeQuery::name("Node*")).unwrap().unwrap();
        assert_eq!(
            pointer.kind,
            ShapeKind::Pointer {
                pointee: TypeQuery::name("Node")
            }
        );
        let primitive = provider.lookup_type("app", &TypeQuery::name("u16")).unwrap().unwrap();
        assert_eq!(primitive.kind, ShapeKind::Primitive(PrimitiveKind::U16));
        assert_eq!(primitive.size, 2);
        assert!(provider.lookup_type("app", &TypeQuery::name("Missing")).unwrap().is_none());
    }

    #[test]
    fn test_unknown_module()
    {
        let mut provider = InMemoryProvider::new();
        assert!(provider.lookup_type("nope", &TypeQuery::name("Node")).unwrap().is_none());
        assert_eq!(
            provider.type_names("nope"),
            Err(ProviderError::UnknownModule("nope".to_string()))
        );
    }

    #[test]
    fn test_fail_after()
    {
        let mut provider = InMemoryProvider::new().with_module("app").fail_after(1);
        assert!(provider.lookup_type("app", &TypeQuery::name("i32")).is_ok());
        assert!(matches!(
            provider.lookup_type("app", &TypeQuery::name("i32")),
            Err(ProviderError::Native(_))
        ));
        assert_eq!(provider.query_count(), 1);
    }

    #[test]
    fn test_type_names_sorted()
    {
        let mut provider = InMemoryProvider::new()
            .with_struct("app", "b::Zed", 1, Vec::new())
            .with_struct("app", "a::Alpha", 1, Vec::new());
        assert_eq!(provider.type_names("app").unwrap(), vec!["a::Alpha", "b::Zed"]);
        assert_eq!(provider.modules().unwrap(), vec!["app"]);
    }
}
