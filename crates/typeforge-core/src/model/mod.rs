//! # Type Instance Model
//!
//! Canonical, immutable descriptions of native types.
//!
//! - [`TypeInstance`]: closed enum over every supported type shape
//! - [`TypeKey`]: canonical identity used for deduplication and ordering
//! - [`TypeQuery`]: how the symbol provider refers to a type
//! - [`ResolvedGraph`]: the finalized registry a resolution run produces
//!
//! Instances only exist inside a run. They are created by the
//! [`Resolver`](crate::resolver::Resolver), frozen into a [`ResolvedGraph`],
//! and dropped once the module has been emitted.

pub mod graph;
pub mod instance;
pub mod key;
pub mod primitive;
pub mod render;

pub use graph::ResolvedGraph;
pub use instance::{
    AggregateKind, BitField, EnumMember, EnumType, Field, FunctionType, TemplateInstance, TypeId, TypeInstance, UserType,
};
pub use key::{TypeKey, TypeQuery};
pub use primitive::PrimitiveKind;
pub use render::{DisplaySyntax, TypeSyntax, UNDEFINED_MARKER};
