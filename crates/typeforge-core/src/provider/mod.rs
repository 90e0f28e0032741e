//! # Symbol Provider
//!
//! The only boundary between the generator and the native debugging engine.
//!
//! A provider answers "what is the shape of type T in module M". Shapes are
//! shallow: a field's type is another [`TypeQuery`] that the resolver asks
//! about separately, so the provider never has to build a graph itself.
//!
//! ## Adapters
//!
//! - [`DwarfProvider`]: production adapter reading DWARF debug information
//!   from binaries on disk
//! - [`InMemoryProvider`]: fake for tests and fixtures
//! - [`ProviderHandle`]: forwards every query to a [`ProviderActor`] thread that
//!   owns the real provider, for engines that only accept calls from the
//!   thread that opened the session

pub mod actor;
pub mod dwarf;
pub mod memory;

pub use actor::{ProviderActor, ProviderHandle};
pub use dwarf::DwarfProvider;
pub use memory::InMemoryProvider;

use crate::error::ProviderError;
use crate::model::{AggregateKind, PrimitiveKind, TypeQuery};

/// Read-only oracle describing native types.
///
/// Every call is synchronous and may be slow. Implementations are not
/// required to be thread-safe; share one through a [`ProviderActor`].
pub trait SymbolProvider
{
    /// Names of the modules the provider can describe.
    ///
    /// ## Errors
    ///
    /// Returns an error if the underlying session is unusable.
    fn modules(&mut self) -> Result<Vec<String>, ProviderError>;

    /// Qualified names of every named type in a module, sorted.
    ///
    /// Used to expand root patterns.
    ///
    /// ## Errors
    ///
    /// `UnknownModule` if the module is not loaded, or any session failure.
    fn type_names(&mut self, module: &str) -> Result<Vec<String>, ProviderError>;

    /// Describe one type.
    ///
    /// Returns `Ok(None)` when the type does not exist; the resolver turns
    /// that into an `Undefined` instance. `Err` is reserved for failures of
    /// the provider itself and aborts the run.
    ///
    /// ## Errors
    ///
    /// Any failure of the underlying session.
    fn lookup_type(&mut self, module: &str, query: &TypeQuery) -> Result<Option<ShapeDescriptor>, ProviderError>;
}

impl<P: SymbolProvider + ?Sized> SymbolProvider for Box<P>
{
    fn modules(&mut self) -> Result<Vec<String>, ProviderError>
    {
        (**self).modules()
    }

    fn type_names(&mut self, module: &str) -> Result<Vec<String>, ProviderError>
    {
        (**self).type_names(module)
    }

    fn lookup_type(&mut self, module: &str, query: &TypeQuery) -> Result<Option<ShapeDescriptor>, ProviderError>
    {
        (**self).lookup_type(module, query)
    }
}

/// Shape of one type as reported by a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeDescriptor
{
    /// Size in bytes (0 when unknown or meaningless)
    pub size: u64,
    pub kind: ShapeKind,
}

impl ShapeDescriptor
{
    pub fn new(size: u64, kind: ShapeKind) -> Self
    {
        Self { size, kind }
    }
}

/// What kind of type a shape describes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShapeKind
{
    Primitive(PrimitiveKind),
    Pointer
    {
        pointee: TypeQuery,
    },
    /// Possibly multi-dimensional array
    Array
    {
        element: TypeQuery,
        /// Dimension lengths, outermost first; `None` for unknown bounds
        dimensions: Vec<Option<u64>>,
    },
    Enum
    {
        /// Qualified name
        name: String,
        underlying: TypeQuery,
        members: Vec<(String, i128)>,
    },
    Function
    {
        return_type: TypeQuery,
        parameters: Vec<TypeQuery>,
    },
    Aggregate(AggregateShape),
    /// Typedefs and qualifiers; resolved straight through to `target`
    Alias
    {
        target: TypeQuery,
    },
    /// A construct the provider recognises but cannot express
    Unsupported(String),
}

/// Shape of a struct, class or union.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateShape
{
    /// Qualified name; may include a template argument list
    pub name: String,
    pub kind: AggregateKind,
    pub bases: Vec<TypeQuery>,
    pub fields: Vec<FieldShape>,
    /// Non-empty for template instantiations
    pub template_arguments: Vec<TypeQuery>,
    /// Forward declaration without a layout
    pub declaration: bool,
}

impl AggregateShape
{
    /// Empty struct definition with the given name.
    pub fn new(name: impl Into<String>) -> Self
    {
        Self {
            name: name.into(),
            kind: AggregateKind::Struct,
            bases: Vec::new(),
            fields: Vec::new(),
            template_arguments: Vec::new(),
            declaration: false,
        }
    }
}

/// One data member of an aggregate shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldShape
{
    pub name: String,
    pub ty: TypeQuery,
    pub byte_offset: u64,
    /// `(bit_offset, bit_width)` for bit-fields
    pub bit_field: Option<(u64, u64)>,
}

impl FieldShape
{
    pub fn new(name: impl Into<String>, ty: impl Into<TypeQuery>, byte_offset: u64) -> Self
    {
        Self {
            name: name.into(),
            ty: ty.into(),
            byte_offset,
            bit_field: None,
        }
    }
}
