//! Common module for library exports

pub use crate::cancel::CancellationToken;
pub use crate::error::{Diagnostic, ExportError, ProviderError, Severity, TypeError, TypeforgeResult};
pub use crate::export::{
    emission_order, expand_roots, write_outputs, ExportConfig, ExportDriver, ModuleOutput, ModuleRequest, RootRequest,
    RunReport,
};
pub use crate::model::{AggregateKind, PrimitiveKind, ResolvedGraph, TypeId, TypeInstance, TypeKey, TypeQuery};
pub use crate::names::{allocate, NameTable};
pub use crate::provider::{
    AggregateShape, DwarfProvider, FieldShape, InMemoryProvider, ProviderActor, ProviderHandle, ShapeDescriptor,
    ShapeKind, SymbolProvider,
};
pub use crate::resolver::Resolver;
pub use crate::writer::{render_unit, CodeWriter, CSharpWriter, RenderContext, RustWriter, WriterStyle};
