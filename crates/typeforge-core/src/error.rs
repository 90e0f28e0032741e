//! # Error Types
//!
//! Error handling for a generation run.
//!
//! We use `thiserror` to automatically generate `Error` trait implementations
//! and nice error messages.
//!
//! Errors come in two tiers:
//!
//! 1. **Per-type errors** ([`TypeError`]): one type could not be resolved or is
//!    structurally invalid. These never abort a run; they are wrapped in a
//!    [`Diagnostic`] and attached to the module's output.
//! 2. **Run-fatal errors** ([`ExportError`]): the symbol provider failed, an
//!    internal invariant was violated, or the run was cancelled. These stop the
//!    run and are returned to the caller with full context.

use std::fmt;

use thiserror::Error;

/// Failure reported by a [`SymbolProvider`](crate::provider::SymbolProvider).
///
/// A provider returning `Ok(None)` means "not found" and is *not* an error.
/// Anything in this enum means the provider itself is unusable, and the run
/// that issued the query is terminated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError
{
    /// The worker thread owning the provider is gone
    ///
    /// This happens when the provider actor was shut down (or panicked)
    /// while a [`ProviderHandle`](crate::provider::ProviderHandle) was still in use.
    #[error("Symbol provider disconnected")]
    Disconnected,

    /// The requested module is not loaded in the provider
    #[error("Unknown module: {0}")]
    UnknownModule(String),

    /// The native debugging engine reported a failure
    #[error("Native provider failure: {0}")]
    Native(String),

    /// Debug information could not be decoded
    ///
    /// Produced by the DWARF adapter when `gimli` or `object` reject the
    /// input. The string carries the operation that was being performed.
    #[error("Malformed debug information: {0}")]
    Malformed(String),
}

/// Per-type resolution failure
///
/// These are isolated to the type they describe. The export driver records
/// them as diagnostics and keeps going.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TypeError
{
    /// The symbol provider could not describe the type
    ///
    /// The type degrades to `Undefined`. This propagates upward only through
    /// value containment, never through pointer indirection.
    #[error("Unresolvable type {query}: {reason}")]
    Unresolvable
    {
        /// The reference that was being resolved
        query: String,
        /// Why it could not be described
        reason: String,
    },

    /// An aggregate contains itself by value
    ///
    /// The declaration of every member of the cycle is skipped.
    #[error("Illegal value cycle: {}", cycle.join(" -> "))]
    IllegalValueCycle
    {
        /// Qualified names of the types forming the cycle, in canonical order
        cycle: Vec<String>,
    },

    /// A field of an aggregate does not fit in the aggregate's layout
    ///
    /// The offending field is dropped; the rest of the type is kept.
    #[error("Invalid layout of {owner}.{field}: {detail}")]
    InvalidLayout
    {
        /// Qualified name of the aggregate
        owner: String,
        /// Field name as reported by the provider
        field: String,
        /// What is wrong with it
        detail: String,
    },

    /// A chain of pointer/array/alias references exceeded the depth limit
    #[error("Type reference chain for {query} exceeded depth {limit}")]
    DepthLimit
    {
        /// The reference where the limit was hit
        query: String,
        /// The configured limit
        limit: usize,
    },
}

/// Run-fatal error
///
/// Any of these terminates the generation run. Context (module, requested
/// root, last successful query) is carried so the caller can report exactly
/// where the run stopped.
#[derive(Error, Debug)]
pub enum ExportError
{
    /// The symbol provider itself failed
    ///
    /// Not retried. Retry policy, if any, belongs to whoever owns the
    /// debugging session.
    #[error("Provider query failed in module {module} (root {root}, last successful query {}): {source}", last_query.as_deref().unwrap_or("<none>"))]
    ProviderQueryFailure
    {
        /// Module being resolved
        module: String,
        /// Root request being resolved when the failure happened
        root: String,
        /// Last query that returned successfully, if any
        last_query: Option<String>,
        /// Underlying provider error
        #[source]
        source: ProviderError,
    },

    /// Two distinct types ended up with the same emitted identifier
    ///
    /// The deterministic suffixing policy makes this impossible; seeing it
    /// means the allocator has a bug.
    #[error("Identifier collision in module {module}: {identifier} assigned to both {first} and {second}")]
    IdentifierCollisionUnresolvable
    {
        /// Module being emitted
        module: String,
        /// The identifier assigned twice
        identifier: String,
        /// Canonical key of the first owner
        first: String,
        /// Canonical key of the second owner
        second: String,
    },

    /// The run was cancelled before this module finished
    #[error("Generation cancelled while processing module {module}")]
    Cancelled
    {
        /// Module that was interrupted
        module: String,
    },

    /// Invalid argument passed to the export driver
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// I/O error while writing generated output
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExportError
{
    /// Whether this error stems from cancellation rather than a failure.
    #[must_use]
    pub fn is_cancelled(&self) -> bool
    {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Convenience type alias for `Result<T, ExportError>`
///
/// ```rust
/// use typeforge_core::error::TypeforgeResult;
/// fn foo() -> TypeforgeResult<()>
/// {
///     Ok(())
/// }
/// ```
pub type TypeforgeResult<T> = std::result::Result<T, ExportError>;

/// How serious a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity
{
    /// The type was emitted, possibly degraded (dropped field, `Variable` member).
    Warning,
    /// The type's declaration was skipped.
    Error,
}

impl fmt::Display for Severity
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let label = match self {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "{label}")
    }
}

/// A per-type failure attached to a module's result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic
{
    /// Module the type belongs to
    pub module: String,
    /// How serious it is
    pub severity: Severity,
    /// What went wrong
    pub error: TypeError,
}

impl Diagnostic
{
    /// Diagnostic that still lets the type be emitted.
    pub fn warning(module: impl Into<String>, error: TypeError) -> Self
    {
        Self {
            module: module.into(),
            severity: Severity::Warning,
            error,
        }
    }

    /// Diagnostic that excludes the type from output.
    pub fn error(module: impl Into<String>, error: TypeError) -> Self
    {
        Self {
            module: module.into(),
            severity: Severity::Error,
            error,
        }
    }
}

impl fmt::Display for Diagnostic
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}[{}]: {}", self.severity, self.module, self.error)
    }
}

