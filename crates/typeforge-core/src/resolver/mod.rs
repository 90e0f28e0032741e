//! # Type Graph Resolver
//!
//! Builds the canonical, deduplicated graph of every type reachable from a
//! set of roots, querying the [`SymbolProvider`] lazily.
//!
//! ## How it works
//!
//! 1. A root (or a field, base, pointee...) arrives as a [`TypeQuery`]
//! 2. Already answered queries come straight from the per-run memo, as long
//!    as the answer's own reference chain still fits under the depth limit
//! 3. Otherwise the provider is asked for the shape
//! 4. Structural shapes (pointers, arrays, functions, aliases) resolve their
//!    components recursively, bounded by the depth limit
//! 5. Aggregates are reserved as placeholders under their canonical key and
//!    queued; their bodies are resolved from the worklist
//!
//! Because aggregates are registered before their members are looked at, a
//! pointer back to a type that is still being built simply yields the
//! placeholder's handle. Cycles through pointers therefore terminate without
//! any special casing. Cycles *by value* are physically impossible layouts;
//! they are found after the worklist drains and every member is excluded from
//! output with an `IllegalValueCycle` diagnostic.
//!
//! ## Failure model
//!
//! - A type the provider cannot describe becomes `Undefined` plus a warning.
//! - A chain deeper than the limit ends in an `Undefined` keyed as
//!   `TypeKey::Truncated`, never under the type's real key, so the outcome
//!   of a reference depends only on the reference and its depth.
//! - A field that does not fit its aggregate is dropped plus a warning.
//! - A provider error or a cancellation aborts the whole run.

mod cycles;
mod registry;

use std::collections::{BTreeSet, HashMap, VecDeque};

use smallvec::SmallVec;
use tracing::{debug, trace, warn};

use self::registry::TypeRegistry;
use crate::cancel::CancellationToken;
use crate::error::{Diagnostic, ExportError, TypeError, TypeforgeResult};
use crate::model::{
    BitField, EnumMember, EnumType, Field, FunctionType, ResolvedGraph, TemplateInstance, TypeId, TypeInstance,
    TypeKey, TypeQuery, UserType,
};
use crate::names::{split_qualified, strip_template_arguments};
use crate::provider::{AggregateShape, FieldShape, ShapeDescriptor, ShapeKind, SymbolProvider};

/// Maximum nesting of pointer/array/alias references followed from one
/// starting point before giving up on the chain.
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// A memoized answer and how many reference levels below the query it used.
#[derive(Clone, Copy)]
struct Memoized
{
    id: TypeId,
    reach: usize,
}

/// Aggregate whose body is waiting in the worklist.
struct PendingBody
{
    id: TypeId,
    shape: AggregateShape,
}

/// One resolution run over one module.
///
/// ```rust
/// use typeforge_core::model::TypeQuery;
/// use typeforge_core::provider::{FieldShape, InMemoryProvider};
/// use typeforge_core::resolver::Resolver;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut provider = InMemoryProvider::new().with_struct("app", "Node", 16, vec![
///     FieldShape::new("value", "i32", 0),
///     FieldShape::new("next", "Node*", 8),
/// ]);
/// let mut resolver = Resolver::new(&mut provider, "app");
/// let node = resolver.resolve_root(&TypeQuery::name("Node"))?;
/// let graph = resolver.finish();
/// assert!(!graph.contains_undefined(node));
/// # Ok(())
/// # }
/// ```
pub struct Resolver<'p>
{
    provider: &'p mut dyn SymbolProvider,
    module: String,
    registry: TypeRegistry,
    memo: HashMap<TypeQuery, Memoized>,
    deepest: usize,
    truncations: usize,
    worklist: VecDeque<PendingBody>,
    diagnostics: Vec<Diagnostic>,
    roots: Vec<TypeId>,
    max_depth: usize,
    cancel: CancellationToken,
    current_root: String,
    last_query: Option<String>,
}

impl<'p> Resolver<'p>
{
    /// Start a run over `module`.
    pub fn new(provider: &'p mut dyn SymbolProvider, module: impl Into<String>) -> Self
    {
        Self {
            provider,
            module: module.into(),
            registry: TypeRegistry::default(),
            memo: HashMap::new(),
            deepest: 0,
            truncations: 0,
            worklist: VecDeque::new(),
            diagnostics: Vec::new(),
            roots: Vec::new(),
            max_depth: DEFAULT_MAX_DEPTH,
            cancel: CancellationToken::new(),
            current_root: String::new(),
            last_query: None,
        }
    }

    /// Override the reference depth limit.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self
    {
        self.max_depth = max_depth;
        self
    }

    /// Observe a cancellation token before every provider query.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self
    {
        self.cancel = cancel;
        self
    }

    /// Module this run resolves.
    #[must_use]
    pub fn module(&self) -> &str
    {
        &self.module
    }

    /// Resolve a root and everything reachable from it.
    ///
    /// Returns once the root's whole closure is finalized. Resolving the same
    /// root twice returns the same handle.
    ///
    /// ## Errors
    ///
    /// - `ProviderQueryFailure` if the provider fails
    /// - `Cancelled` if cancellation was requested
    pub fn resolve_root(&mut self, query: &TypeQuery) -> TypeforgeResult<TypeId>
    {
        self.current_root = query.to_string();
        debug!(module = %self.module, root = %query, "Resolving root");
        let id = self.resolve(query, 0)?;
        self.drain()?;
        if !self.roots.contains(&id) {
            self.roots.push(id);
        }
        Ok(id)
    }

    /// Resolve several roots in order.
    ///
    /// ## Errors
    ///
    /// Same as [`Resolver::resolve_root`]; stops at the first failure.
    pub fn resolve_roots<'q>(&mut self, queries: impl IntoIterator<Item = &'q TypeQuery>) -> TypeforgeResult<Vec<TypeId>>
    {
        queries.into_iter().map(|query| self.resolve_root(query)).collect()
    }

    /// Freeze the run into an immutable graph.
    ///
    /// Detects value cycles and marks their members as excluded.
    #[must_use]
    pub fn finish(self) -> ResolvedGraph
    {
        debug_assert!(self.worklist.is_empty());
        debug_assert_eq!(self.registry.pending(), 0);

        let Self {
            module,
            registry,
            mut diagnostics,
            roots,
            ..
        } = self;
        let (instances, keys, index) = registry.into_parts();

        let mut illegal = BTreeSet::new();
        for cycle in cycles::value_cycles(&instances) {
            let mut members: Vec<TypeId> = cycle
                .into_iter()
                .filter(|id| instances[id.index()].is_declarable())
                .collect();
            members.sort_by(|a, b| keys[a.index()].cmp(&keys[b.index()]));
            let names: Vec<String> = members.iter().map(|id| keys[id.index()].to_string()).collect();
            warn!(module = %module, cycle = %names.join(" -> "), "Illegal value cycle");
            illegal.extend(members);
            diagnostics.push(Diagnostic::error(module.clone(), TypeError::IllegalValueCycle { cycle: names }));
        }

        diagnostics.sort_by_cached_key(ToString::to_string);
        diagnostics.dedup();

        debug!(module = %module, types = instances.len(), excluded = illegal.len(), "Resolution finished");
        ResolvedGraph::new(module, instances, keys, index, roots, illegal, diagnostics)
    }

    /// Resolve `query` reached `depth` references below a root or a body.
    ///
    /// The memo only answers when the stored chain fits under the limit from
    /// this depth too, and results that hit the limit are never memoized.
    fn resolve(&mut self, query: &TypeQuery, depth: usize) -> TypeforgeResult<TypeId>
    {
        if depth > self.max_depth {
            return Ok(self.truncated(query));
        }
        if let Some(memo) = self.memo.get(query).copied() {
            if depth + memo.reach <= self.max_depth {
                self.deepest = self.deepest.max(depth + memo.reach);
                return Ok(memo.id);
            }
        }

        let outer_deepest = std::mem::replace(&mut self.deepest, depth);
        let truncations = self.truncations;
        let resolved = match self.query(query) {
            Ok(Some(shape)) => self.resolve_shape(query, shape, depth),
            Ok(None) => Ok(self.unresolvable(query, "not found in module")),
            Err(error) => Err(error),
        };
        let reach = self.deepest - depth;
        self.deepest = self.deepest.max(outer_deepest);
        let id = resolved?;

        if self.truncations == truncations {
            self.memo.insert(query.clone(), Memoized { id, reach });
        }
        Ok(id)
    }

    fn resolve_shape(&mut self, query: &TypeQuery, shape: ShapeDescriptor, depth: usize) -> TypeforgeResult<TypeId>
    {
        let ShapeDescriptor { size, kind } = shape;
        match kind {
            ShapeKind::Primitive(kind) => Ok(self
                .registry
                .intern(TypeKey::Primitive(kind), TypeInstance::Primitive(kind))),
            ShapeKind::Alias { target } => self.resolve(&target, depth + 1),
            ShapeKind::Pointer { pointee } => {
                let pointee = self.resolve(&pointee, depth + 1)?;
                let key = TypeKey::Pointer(Box::new(self.registry.key(pointee).clone()));
                Ok(self.registry.intern(key, TypeInstance::Pointer { pointee }))
            }
            ShapeKind::Array { element, dimensions } => {
                let mut id = self.resolve(&element, depth + 1)?;
                let dimensions = if dimensions.is_empty() { vec![None] } else { dimensions };
                // Innermost dimension wraps the element first.
                for length in dimensions.into_iter().rev() {
                    let key = TypeKey::Array {
                        element: Box::new(self.registry.key(id).clone()),
                        length,
                    };
                    id = self.registry.intern(key, TypeInstance::Array { element: id, length });
                }
                Ok(id)
            }
            ShapeKind::Function {
                return_type,
                parameters,
            } => {
                let return_type = self.resolve(&return_type, depth + 1)?;
                let mut resolved: SmallVec<[TypeId; 4]> = SmallVec::new();
                for parameter in &parameters {
                    resolved.push(self.resolve(parameter, depth + 1)?);
                }
                let key = TypeKey::Function {
                    return_type: Box::new(self.registry.key(return_type).clone()),
                    parameters: resolved.iter().map(|id| self.registry.key(*id).clone()).collect(),
                };
                Ok(self.registry.intern(
                    key,
                    TypeInstance::Function(FunctionType {
                        return_type,
                        parameters: resolved,
                    }),
                ))
            }
            ShapeKind::Enum {
                name,
                underlying,
                members,
            } => {
                let key = TypeKey::named(self.module.clone(), name.clone());
                if let Some(existing) = self.registry.lookup(&key) {
                    return Ok(existing);
                }
                // Named types start a fresh chain, like aggregate bodies.
                let underlying = self.resolve(&underlying, 0)?;
                let (namespace, short) = split_qualified(&name);
                let enumeration = EnumType {
                    name: short,
                    namespace,
                    underlying,
                    size,
                    members: members
                        .into_iter()
                        .map(|(name, value)| EnumMember { name, value })
                        .collect(),
                };
                Ok(self.registry.intern(key, TypeInstance::Enum(enumeration)))
            }
            ShapeKind::Aggregate(aggregate) => self.resolve_aggregate(query, size, aggregate, depth),
            ShapeKind::Unsupported(reason) => Ok(self.unresolvable(query, &reason)),
        }
    }

    fn resolve_aggregate(
        &mut self,
        query: &TypeQuery,
        size: u64,
        aggregate: AggregateShape,
        depth: usize,
    ) -> TypeforgeResult<TypeId>
    {
        if aggregate.declaration {
            return self.resolve_declaration(query, aggregate, depth);
        }

        let mut arguments = Vec::with_capacity(aggregate.template_arguments.len());
        for argument in &aggregate.template_arguments {
            arguments.push(self.resolve(argument, depth + 1)?);
        }
        let base_name = if arguments.is_empty() {
            aggregate.name.clone()
        } else {
            strip_template_arguments(&aggregate.name).to_string()
        };
        let key = TypeKey::Named {
            module: self.module.clone(),
            name: base_name.clone(),
            arguments: arguments.iter().map(|id| self.registry.key(*id).clone()).collect(),
        };
        if let Some(existing) = self.registry.lookup(&key) {
            return Ok(existing);
        }

        let (namespace, short) = split_qualified(&base_name);
        let shell = UserType::shell(short, namespace, aggregate.kind, size);
        let instance = if arguments.is_empty() {
            TypeInstance::Aggregate(shell)
        } else {
            TypeInstance::TemplateInstance(TemplateInstance {
                type_arguments: arguments,
                layout: shell,
            })
        };
        let id = self.registry.reserve(key, instance);
        trace!(module = %self.module, id = %id, name = %aggregate.name, "Reserved placeholder");
        self.worklist.push_back(PendingBody { id, shape: aggregate });
        Ok(id)
    }

    /// A forward declaration reached by offset (or by a differently spelled
    /// name) may still have a definition elsewhere in the module. Asking for
    /// it by name once makes the outcome independent of which reference was
    /// seen first.
    fn resolve_declaration(&mut self, query: &TypeQuery, aggregate: AggregateShape, depth: usize) -> TypeforgeResult<TypeId>
    {
        let by_name = TypeQuery::Name(aggregate.name.clone());
        if *query != by_name {
            if let Some(ShapeDescriptor {
                size,
                kind: ShapeKind::Aggregate(definition),
            }) = self.query(&by_name)?
            {
                if !definition.declaration {
                    return self.resolve_aggregate(&by_name, size, definition, depth);
                }
            }
        }

        let base_name = strip_template_arguments(&aggregate.name).to_string();
        let key = TypeKey::named(self.module.clone(), base_name);
        if let Some(existing) = self.registry.lookup(&key) {
            return Ok(existing);
        }
        let error = TypeError::Unresolvable {
            query: aggregate.name.clone(),
            reason: "declared but never defined".to_string(),
        };
        Ok(self.undefined_with_key(key, aggregate.name, error))
    }

    /// Resolve bodies of queued aggregates until the closure is complete.
    fn drain(&mut self) -> TypeforgeResult<()>
    {
        while let Some(pending) = self.worklist.pop_front() {
            let body = self.resolve_body(pending.id, &pending.shape)?;
            self.registry.finalize(pending.id, body);
        }
        Ok(())
    }

    fn resolve_body(&mut self, id: TypeId, shape: &AggregateShape) -> TypeforgeResult<TypeInstance>
    {
        let mut instance = self.registry.get(id).clone();
        let (owner, size) = match instance.user_type() {
            Some(user) => (user.qualified_name(), user.size),
            None => return Ok(instance),
        };

        let mut bases = Vec::with_capacity(shape.bases.len());
        for base in &shape.bases {
            bases.push(self.resolve(base, 0)?);
        }

        let mut fields = Vec::with_capacity(shape.fields.len());
        for field in &shape.fields {
            let ty = self.resolve(&field.ty, 0)?;
            match self.place_field(&owner, size, field, ty) {
                Ok(placed) => fields.push(placed),
                Err(error) => {
                    warn!(module = %self.module, "{error}");
                    self.diagnostics.push(Diagnostic::warning(self.module.clone(), error));
                }
            }
        }

        let layout = match &mut instance {
            TypeInstance::Aggregate(user) | TypeInstance::TemplateInstance(TemplateInstance { layout: user, .. }) => user,
            _ => return Ok(instance),
        };
        layout.bases = bases;
        layout.fields = fields;
        Ok(instance)
    }

    /// Check a field against its owner's layout.
    ///
    /// Byte offsets must lie in `[0, size)`; the one exception is a trailing
    /// unknown-length array placed exactly at `size`. Bit offsets past the
    /// first byte are folded into the byte offset, and the bits must end
    /// inside the aggregate.
    fn place_field(&self, owner: &str, size: u64, field: &FieldShape, ty: TypeId) -> Result<Field, TypeError>
    {
        let invalid = |detail: String| TypeError::InvalidLayout {
            owner: owner.to_string(),
            field: field.name.clone(),
            detail,
        };

        let Some((bit_offset, bit_width)) = field.bit_field else {
            let flexible = field.byte_offset == size
                && matches!(self.registry.get(ty), TypeInstance::Array { length: None, .. });
            if field.byte_offset >= size && !flexible {
                return Err(invalid(format!("offset {} outside aggregate of size {size}", field.byte_offset)));
            }
            return Ok(Field {
                name: field.name.clone(),
                ty,
                byte_offset: field.byte_offset,
                bit_field: None,
            });
        };

        if bit_width == 0 || bit_width > 128 {
            return Err(invalid(format!("bit width {bit_width} out of range")));
        }
        let byte_offset = field.byte_offset + bit_offset / 8;
        let bit_offset = bit_offset % 8;
        let end_bit = byte_offset
            .checked_mul(8)
            .and_then(|bits| bits.checked_add(bit_offset + bit_width));
        match end_bit {
            Some(end) if byte_offset < size && end <= size.saturating_mul(8) => {}
            _ => {
                return Err(invalid(format!(
                    "bits {bit_offset}..+{bit_width} at offset {byte_offset} outside aggregate of size {size}"
                )));
            }
        }
        // Both fit: bit_offset < 8, bit_width <= 128.
        #[allow(clippy::cast_possible_truncation)]
        let bit_field = BitField {
            bit_offset: bit_offset as u8,
            bit_width: bit_width as u8,
        };
        Ok(Field {
            name: field.name.clone(),
            ty,
            byte_offset,
            bit_field: Some(bit_field),
        })
    }

    /// Ask the provider, honoring cancellation and recording error context.
    fn query(&mut self, query: &TypeQuery) -> TypeforgeResult<Option<ShapeDescriptor>>
    {
        if self.cancel.is_cancelled() {
            debug!(module = %self.module, "Resolution cancelled");
            return Err(ExportError::Cancelled {
                module: self.module.clone(),
            });
        }
        trace!(module = %self.module, query = %query, "Querying provider");
        match self.provider.lookup_type(&self.module, query) {
            Ok(shape) => {
                self.last_query = Some(query.to_string());
                Ok(shape)
            }
            Err(source) => Err(ExportError::ProviderQueryFailure {
                module: self.module.clone(),
                root: self.current_root.clone(),
                last_query: self.last_query.clone(),
                source,
            }),
        }
    }

    fn unresolvable(&mut self, query: &TypeQuery, reason: &str) -> TypeId
    {
        let error = TypeError::Unresolvable {
            query: query.to_string(),
            reason: reason.to_string(),
        };
        self.undefined(query, error)
    }

    fn undefined(&mut self, query: &TypeQuery, error: TypeError) -> TypeId
    {
        let key = match query {
            TypeQuery::Name(name) => TypeKey::named(self.module.clone(), name.clone()),
            _ => TypeKey::Opaque {
                module: self.module.clone(),
                query: query.clone(),
            },
        };
        self.undefined_with_key(key, query.to_string(), error)
    }

    /// The reference past the depth limit. Its key never aliases a real type.
    fn truncated(&mut self, query: &TypeQuery) -> TypeId
    {
        self.truncations += 1;
        let key = TypeKey::Truncated {
            module: self.module.clone(),
            query: query.clone(),
        };
        let error = TypeError::DepthLimit {
            query: query.to_string(),
            limit: self.max_depth,
        };
        self.undefined_with_key(key, query.to_string(), error)
    }

    fn undefined_with_key(&mut self, key: TypeKey, name: String, error: TypeError) -> TypeId
    {
        if let Some(existing) = self.registry.lookup(&key) {
            return existing;
        }
        warn!(module = %self.module, "{error}");
        self.diagnostics.push(Diagnostic::warning(self.module.clone(), error));
        self.registry.intern(key, TypeInstance::Undefined { name })
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::model::{AggregateKind, PrimitiveKind};
    use crate::provider::InMemoryProvider;

    fn resolve(provider: &mut InMemoryProvider, roots: &[&str]) -> ResolvedGraph
    {
        let mut resolver = Resolver::new(provider, "app");
        for root in roots {
            resolver.resolve_root(&TypeQuery::name(*root)).unwrap();
        }
        resolver.finish()
    }

    fn field(graph: &ResolvedGraph, id: TypeId, name: &str) -> TypeId
    {
        graph
            .get(id)
            .user_type()
            .and_then(|user| user.fields.iter().find(|field| field.name == name))
            .map(|field| field.ty)
            .unwrap()
    }

    #[test]
    fn test_self_referential_pointer()
    {
        let mut provider = InMemoryProvider::new().with_struct(
            "app",
            "Node",
            16,
            vec![FieldShape::new("value", "i32", 0), FieldShape::new("next", "Node*", 8)],
        );
        let graph = resolve(&mut provider, &["Node"]);
        let node = graph.roots()[0];
        let next = field(&graph, node, "next");
        assert_eq!(*graph.get(next), TypeInstance::Pointer { pointee: node });
        assert!(!graph.contains_undefined(node));
        assert!(graph.diagnostics().is_empty());
    }

    #[test]
    fn test_mutual_recursion_through_pointers()
    {
        let mut provider = InMemoryProvider::new()
            .with_struct("app", "A", 8, vec![FieldShape::new("b", "B*", 0)])
            .with_struct("app", "B", 8, vec![FieldShape::new("a", "A*", 0)]);
        let graph = resolve(&mut provider, &["A", "B"]);
        let a = graph.roots()[0];
        let b = graph.roots()[1];
        assert_eq!(*graph.get(field(&graph, a, "b")), TypeInstance::Pointer { pointee: b });
        assert_eq!(*graph.get(field(&graph, b, "a")), TypeInstance::Pointer { pointee: a });
    }

    #[test]
    fn test_same_key_resolves_once()
    {
        let mut provider = InMemoryProvider::new()
            .with_struct("app", "Leaf", 4, vec![FieldShape::new("v", "i32", 0)])
            .with_struct(
                "app",
                "Tree",
                24,
                vec![
                    FieldShape::new("left", "Leaf", 0),
                    FieldShape::new("right", "Leaf", 4),
                    FieldShape::new("ptr", "Leaf*", 8),
                    FieldShape::new("ptr2", "Leaf*", 16),
                ],
            );
        let graph = resolve(&mut provider, &["Tree", "Leaf"]);
        let tree = graph.roots()[0];
        assert_eq!(field(&graph, tree, "left"), field(&graph, tree, "right"));
        assert_eq!(field(&graph, tree, "ptr"), field(&graph, tree, "ptr2"));
        assert_eq!(graph.roots()[1], field(&graph, tree, "left"));
    }

    #[test]
    fn test_missing_field_type_is_undefined()
    {
        let mut provider = InMemoryProvider::new().with_struct(
            "app",
            "Holder",
            16,
            vec![FieldShape::new("by_value", "Missing", 0), FieldShape::new("by_ref", "Missing*", 8)],
        );
        let graph = resolve(&mut provider, &["Holder"]);
        let holder = graph.roots()[0];
        assert!(graph.contains_undefined(holder));
        assert!(graph.get(field(&graph, holder, "by_value")).is_undefined());
        assert!(!graph.contains_undefined(field(&graph, holder, "by_ref")));
        assert_eq!(graph.diagnostics().len(), 1);
    }

    #[test]
    fn test_field_outside_layout_is_dropped()
    {
        let mut provider = InMemoryProvider::new().with_struct(
            "app",
            "Small",
            4,
            vec![FieldShape::new("ok", "i32", 0), FieldShape::new("bad", "i32", 4)],
        );
        let graph = resolve(&mut provider, &["Small"]);
        let small = graph.get(graph.roots()[0]).user_type().unwrap();
        assert_eq!(small.fields.len(), 1);
        assert!(matches!(
            graph.diagnostics()[0].error,
            TypeError::InvalidLayout { ref field, .. } if field == "bad"
        ));
    }

    #[test]
    fn test_flexible_array_member_is_kept()
    {
        let mut provider = InMemoryProvider::new()
            .with_type(
                "app",
                "Bytes",
                ShapeDescriptor::new(
                    0,
                    ShapeKind::Array {
                        element: TypeQuery::Primitive(PrimitiveKind::U8),
                        dimensions: vec![None],
                    },
                ),
            )
            .with_struct(
                "app",
                "Packet",
                4,
                vec![FieldShape::new("len", "u32", 0), FieldShape::new("data", "Bytes", 4)],
            );
        let graph = resolve(&mut provider, &["Packet"]);
        assert_eq!(graph.get(graph.roots()[0]).user_type().unwrap().fields.len(), 2);
        assert!(graph.diagnostics().is_empty());
    }

    #[test]
    fn test_bit_fields_are_normalized()
    {
        let mut flags = FieldShape::new("flags", "u32", 0);
        flags.bit_field = Some((11, 3));
        let mut overflow = FieldShape::new("overflow", "u32", 0);
        overflow.bit_field = Some((30, 4));
        let mut provider = InMemoryProvider::new().with_struct("app", "Bits", 4, vec![flags, overflow]);
        let graph = resolve(&mut provider, &["Bits"]);
        let bits = graph.get(graph.roots()[0]).user_type().unwrap();
        assert_eq!(bits.fields.len(), 1);
        assert_eq!(bits.fields[0].byte_offset, 1);
        assert_eq!(
            bits.fields[0].bit_field,
            Some(BitField {
                bit_offset: 3,
                bit_width: 3
            })
        );
    }

    #[test]
    fn test_value_cycle_is_excluded()
    {
        let mut provider = InMemoryProvider::new()
            .with_struct("app", "Bad", 8, vec![FieldShape::new("inner", "Bad", 0)])
            .with_struct("app", "Good", 8, vec![FieldShape::new("bad", "Bad*", 0)]);
        let graph = resolve(&mut provider, &["Good", "Bad"]);
        let bad = graph.roots()[1];
        assert!(graph.is_illegal(bad));
        assert!(!graph.is_illegal(graph.roots()[0]));
        assert!(graph
            .diagnostics()
            .iter()
            .any(|diagnostic| matches!(diagnostic.error, TypeError::IllegalValueCycle { .. })));
    }

    #[test]
    fn test_template_instances_are_keyed_by_arguments()
    {
        let mut ints = AggregateShape::new("Box<int>");
        ints.template_arguments = vec![TypeQuery::Primitive(PrimitiveKind::I32)];
        ints.fields = vec![FieldShape::new("value", "i32", 0)];
        let mut longs = AggregateShape::new("Box<long>");
        longs.template_arguments = vec![TypeQuery::Primitive(PrimitiveKind::I64)];
        longs.fields = vec![FieldShape::new("value", "i64", 0)];
        let mut provider = InMemoryProvider::new()
            .with_aggregate("app", 4, ints)
            .with_aggregate("app", 8, longs);

        let graph = resolve(&mut provider, &["Box<int>", "Box<long>"]);
        let (a, b) = (graph.roots()[0], graph.roots()[1]);
        assert_ne!(a, b);
        let TypeInstance::TemplateInstance(template) = graph.get(a) else {
            panic!("expected template instance");
        };
        assert_eq!(template.base_name(), "Box");
        assert_eq!(graph.display_name(a), "Box<i32>");
        assert_eq!(graph.display_name(b), "Box<i64>");
    }

    #[test]
    fn test_forward_declaration_prefers_definition()
    {
        let mut declaration = AggregateShape::new("Impl");
        declaration.declaration = true;
        let mut provider = InMemoryProvider::new()
            .with_type_at(
                "app",
                0x40,
                ShapeDescriptor::new(0, ShapeKind::Aggregate(declaration.clone())),
            )
            .with_struct("app", "Impl", 4, vec![FieldShape::new("x", "i32", 0)]);
        let mut resolver = Resolver::new(&mut provider, "app");
        let by_offset = resolver.resolve_root(&TypeQuery::Offset(0x40)).unwrap();
        let by_name = resolver.resolve_root(&TypeQuery::name("Impl")).unwrap();
        assert_eq!(by_offset, by_name);
        let graph = resolver.finish();
        assert_eq!(graph.get(by_name).user_type().map(|user| user.kind), Some(AggregateKind::Struct));
    }

    #[test]
    fn test_declaration_without_definition()
    {
        let mut declaration = AggregateShape::new("Opaque");
        declaration.declaration = true;
        let mut provider = InMemoryProvider::new()
            .with_aggregate("app", 0, declaration)
            .with_struct("app", "Handle", 8, vec![FieldShape::new("inner", "Opaque*", 0)]);
        let graph = resolve(&mut provider, &["Handle", "Opaque"]);
        assert!(!graph.contains_undefined(graph.roots()[0]));
        assert!(graph.get(graph.roots()[1]).is_undefined());
    }

    #[test]
    fn test_depth_limit_degrades_to_undefined()
    {
        let mut provider = InMemoryProvider::new().with_type(
            "app",
            "Loop",
            ShapeDescriptor::new(
                8,
                ShapeKind::Alias {
                    target: TypeQuery::name("Loop"),
                },
            ),
        );
        let mut resolver = Resolver::new(&mut provider, "app").with_max_depth(4);
        let id = resolver.resolve_root(&TypeQuery::name("Loop")).unwrap();
        let graph = resolver.finish();
        assert!(graph.get(id).is_undefined());
        assert!(matches!(graph.diagnostics()[0].error, TypeError::DepthLimit { limit: 4, .. }));
    }

    #[test]
    fn test_multi_dimensional_array()
    {
        let mut provider = InMemoryProvider::new().with_type(
            "app",
            "Grid",
            ShapeDescriptor::new(
                24,
                ShapeKind::Array {
                    element: TypeQuery::Primitive(PrimitiveKind::U8),
                    dimensions: vec![Some(2), Some(3)],
                },
            ),
        );
        let graph = resolve(&mut provider, &["Grid"]);
        let outer = graph.roots()[0];
        let TypeInstance::Array { element, length } = graph.get(outer) else {
            panic!("expected array");
        };
        assert_eq!(*length, Some(2));
        assert!(matches!(graph.get(*element), TypeInstance::Array { length: Some(3), .. }));
        assert_eq!(graph.display_name(outer), "u8[3][2]");
    }

    #[test]
    fn test_provider_failure_carries_context()
    {
        let mut provider = InMemoryProvider::new()
            .with_struct("app", "Node", 8, vec![FieldShape::new("next", "Node*", 0)])
            .fail_after(1);
        let mut resolver = Resolver::new(&mut provider, "app");
        let error = resolver.resolve_root(&TypeQuery::name("Node")).unwrap_err();
        match error {
            ExportError::ProviderQueryFailure {
                module,
                root,
                last_query,
                ..
            } => {
                assert_eq!(module, "app");
                assert_eq!(root, "Node");
                assert_eq!(last_query.as_deref(), Some("Node"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_cancellation_stops_before_query()
    {
        let mut provider = InMemoryProvider::new().with_struct("app", "Node", 4, Vec::new());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut resolver = Resolver::new(&mut provider, "app").with_cancellation(cancel);
        let error = resolver.resolve_root(&TypeQuery::name("Node")).unwrap_err();
        assert!(error.is_cancelled());
        drop(resolver);
        assert_eq!(provider.query_count(), 0);
    }
}
