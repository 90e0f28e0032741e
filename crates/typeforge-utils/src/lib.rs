//! # typeforge utilities
//!
//! Shared helpers for the typeforge workspace: logging setup built on
//! `tracing`, and re-exports of the tracing macros.

pub mod logging;

pub use logging::{init_logging, init_logging_to_dir, init_logging_with_level, LogFormat, LogLevel, LoggingError};
pub use tracing::{debug, error, info, trace, warn};
