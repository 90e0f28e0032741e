//! # typeforge-core
//!
//! Type-graph resolution and accessor code emission for native debug metadata.
//!
//! Given a debugging session's view of a native program (modules and the
//! types their debug information describes), this crate resolves a set of
//! requested root types into a finite, deduplicated graph, assigns every
//! emitted type a collision-free identifier, and writes source code that lets
//! a consumer read those types out of process memory with typed accessors.
//!
//! ## Pipeline
//!
//! ```text
//! SymbolProvider ─► Resolver ─► ResolvedGraph ─► names::allocate ─► CodeWriter ─► ModuleOutput
//! ```
//!
//! - [`provider`]: the contract with the debugging engine, plus a DWARF
//!   adapter, an in-memory fake and a worker-thread actor.
//! - [`resolver`]: builds the graph with a placeholder registry, so pointer
//!   cycles terminate and each type is resolved once.
//! - [`names`]: deterministic identifier and namespace allocation.
//! - [`writer`]: Rust and C# output strategies.
//! - [`export`]: per-module orchestration, parallel workers and file output.
//!
//! ## Example
//!
//! ```rust
//! use typeforge_core::prelude::*;
//!
//! let mut provider = InMemoryProvider::new().with_struct(
//!     "app",
//!     "Node",
//!     16,
//!     vec![FieldShape::new("value", PrimitiveKind::I32, 0)],
//! );
//! let driver = ExportDriver::new(WriterStyle::Rust.writer(), ExportConfig::default());
//! let request = ModuleRequest::new("app", vec![RootRequest::parse("Node")]);
//! let output = driver.export_module(&mut provider, &request).unwrap();
//! assert!(output.source.contains("pub struct Node"));
//! ```

pub mod cancel;
pub mod error;
pub mod export;
pub mod model;
pub mod names;
pub mod prelude;
pub mod provider;
pub mod resolver;
pub mod writer;

pub use cancel::CancellationToken;
pub use error::{Diagnostic, ExportError, ProviderError, Severity, TypeError, TypeforgeResult};
pub use export::{ExportConfig, ExportDriver, ModuleOutput, ModuleRequest, RootRequest, RunReport};
pub use model::{PrimitiveKind, ResolvedGraph, TypeId, TypeInstance, TypeKey, TypeQuery};
pub use provider::{DwarfProvider, InMemoryProvider, ProviderActor, ProviderHandle, SymbolProvider};
pub use resolver::Resolver;
pub use writer::{CodeWriter, WriterStyle};
