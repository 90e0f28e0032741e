//! # Logging Utilities
//!
//! Logging infrastructure for typeforge using `tracing`.
//!
//! Console output always goes to stderr, so generated code written to stdout
//! can be piped without log noise mixed in.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use typeforge_utils::init_logging;
//!
//! // Initialize with default settings (reads from RUST_LOG env var)
//! init_logging().expect("Failed to initialize logging");
//!
//! tracing::info!("Application started");
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level filter (e.g., `RUST_LOG=debug`, `RUST_LOG=typeforge_core=debug`)
//! - `TYPEFORGE_LOG_FORMAT`: Set output format (`json` or `pretty`, default: `pretty`)
//! - `TYPEFORGE_LOG_FILE`: Optional path to log file (if not set, logs only to console)

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::{env, io};

use chrono::Utc;
use tracing::Level;
use tracing_appender::non_blocking::NonBlocking;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::{self};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Environment variable selecting the output format
pub const LOG_FORMAT_ENV: &str = "TYPEFORGE_LOG_FORMAT";
/// Environment variable naming an additional log file
pub const LOG_FILE_ENV: &str = "TYPEFORGE_LOG_FILE";

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat
{
    /// Pretty-printed, human-readable format (default)
    Pretty,
    /// JSON format, one object per line
    Json,
}

impl FromStr for LogFormat
{
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "pretty" | "dev" | "development" => Ok(LogFormat::Pretty),
            "json" | "prod" | "production" => Ok(LogFormat::Json),
            _ => Err(LoggingError::InvalidFormat(format!("{s}. Use 'pretty' or 'json'"))),
        }
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel
{
    Error,
    Warn,
    /// Default
    Info,
    Debug,
    /// Most verbose
    Trace,
}

impl From<LogLevel> for Level
{
    fn from(level: LogLevel) -> Self
    {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

impl FromStr for LogLevel
{
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "error" | "err" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" | "dbg" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(LoggingError::InvalidLevel(format!(
                "{s}. Use 'error', 'warn', 'info', 'debug', or 'trace'"
            ))),
        }
    }
}

/// Initialize logging with default settings
///
/// Reads `RUST_LOG`, `TYPEFORGE_LOG_FORMAT` and `TYPEFORGE_LOG_FILE`.
///
/// ## Errors
///
/// Returns an error if logging is already initialized or the log file
/// cannot be opened.
pub fn init_logging() -> Result<(), LoggingError>
{
    let format = env::var(LOG_FORMAT_ENV)
        .ok()
        .and_then(|s| LogFormat::from_str(&s).ok())
        .unwrap_or(LogFormat::Pretty);
    init_logging_internal(format, None)
}

/// Initialize logging with explicit level and format
///
/// `level` overrides `RUST_LOG`; `TYPEFORGE_LOG_FILE` is still honoured.
///
/// ## Errors
///
/// Returns an error if logging is already initialized or the log file
/// cannot be opened.
pub fn init_logging_with_level(level: LogLevel, format: LogFormat) -> Result<(), LoggingError>
{
    init_logging_internal(format, Some(level.into()))
}

/// Initialize logging to a dated file in `dir` as well as the console
///
/// The file is named `YYYY-MM-DD-typeforge.log` and is appended to across
/// runs on the same day.
///
/// ## Errors
///
/// Returns an error if `dir` cannot be created or logging is already
/// initialized.
pub fn init_logging_to_dir(dir: &Path, level: Option<LogLevel>, format: LogFormat) -> Result<PathBuf, LoggingError>
{
    std::fs::create_dir_all(dir)?;
    let log_file = dir.join(dated_file_name());

    let filter = build_filter(level.map(Into::into));
    let writer = file_writer(&log_file);
    let layers = vec![console_layer(format, filter.clone()), file_layer(format, writer, filter)];
    Registry::default()
        .with(layers)
        .try_init()
        .map_err(|err| LoggingError::InitializationFailed(err.to_string()))?;
    Ok(log_file)
}

fn dated_file_name() -> String
{
    format!("{}-typeforge.log", Utc::now().format("%Y-%m-%d"))
}

fn init_logging_internal(format: LogFormat, explicit_level: Option<Level>) -> Result<(), LoggingError>
{
    let filter = build_filter(explicit_level);
    let mut layers = vec![console_layer(format, filter.clone())];
    if let Some(file_path) = env::var(LOG_FILE_ENV).ok().map(PathBuf::from) {
        layers.push(file_layer(format, file_writer(&file_path), filter));
    }

    Registry::default()
        .with(layers)
        .try_init()
        .map_err(|err| LoggingError::InitializationFailed(err.to_string()))
}

/// Priority: explicit level (`--log-level`), then `RUST_LOG`, then INFO.
fn build_filter(explicit_level: Option<Level>) -> EnvFilter
{
    if let Some(level) = explicit_level {
        EnvFilter::new(level.to_string())
    } else if let Ok(rust_log) = env::var("RUST_LOG") {
        EnvFilter::try_new(&rust_log).unwrap_or_else(|_| EnvFilter::new(Level::INFO.to_string()))
    } else {
        EnvFilter::new(Level::INFO.to_string())
    }
}

fn file_writer(path: &Path) -> NonBlocking
{
    // rolling::never: the date is already part of dated file names
    let file_appender = tracing_appender::rolling::never(
        path.parent().unwrap_or_else(|| Path::new(".")),
        path.file_name().unwrap_or_default(),
    );
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // Keep the background writer alive for the rest of the process
    std::mem::forget(guard);
    non_blocking
}

fn console_layer(format: LogFormat, filter: EnvFilter) -> BoxedLayer
{
    match format {
        LogFormat::Pretty => fmt::layer()
            .with_target(true)
            .with_thread_names(true)
            .with_timer(ChronoUtc::rfc_3339())
            .with_ansi(true)
            .with_writer(io::stderr)
            .with_filter(filter)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_names(true)
            .with_timer(ChronoUtc::rfc_3339())
            .with_current_span(true)
            .with_span_list(true)
            .with_writer(io::stderr)
            .with_filter(filter)
            .boxed(),
    }
}

fn file_layer(format: LogFormat, writer: NonBlocking, filter: EnvFilter) -> BoxedLayer
{
    match format {
        LogFormat::Pretty => fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .with_timer(ChronoUtc::rfc_3339())
            .with_ansi(false)
            .with_filter(filter)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(writer)
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .with_timer(ChronoUtc::rfc_3339())
            .with_current_span(true)
            .with_span_list(true)
            .with_filter(filter)
            .boxed(),
    }
}

/// Logging initialization error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError
{
    /// Invalid log format
    #[error("Invalid log format: {0}")]
    InvalidFormat(String),

    /// Invalid log level
    #[error("Invalid log level: {0}")]
    InvalidLevel(String),

    /// A global subscriber is already installed
    #[error("Failed to initialize logging: {0}")]
    InitializationFailed(String),

    /// File logging error
    #[error("File logging error: {0}")]
    FileError(#[from] io::Error),
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_log_format_from_str()
    {
        assert_eq!(LogFormat::from_str("pretty").unwrap(), LogFormat::Pretty);
        assert_eq!(LogFormat::from_str("JSON").unwrap(), LogFormat::Json);
        assert_eq!(LogFormat::from_str("prod").unwrap(), LogFormat::Json);
        assert!(matches!(LogFormat::from_str("xml"), Err(LoggingError::InvalidFormat(_))));
    }

    #[test]
    fn test_log_level_from_str()
    {
        assert_eq!(LogLevel::from_str("warning").unwrap(), LogLevel::Warn);
        assert_eq!(LogLevel::from_str("dbg").unwrap(), LogLevel::Debug);
        assert_eq!(LogLevel::from_str("trace").unwrap(), LogLevel::Trace);
        assert!(matches!(LogLevel::from_str("loud"), Err(LoggingError::InvalidLevel(_))));
    }

    #[test]
    fn test_log_level_to_tracing_level()
    {
        assert_eq!(Level::from(LogLevel::Error), Level::ERROR);
        assert_eq!(Level::from(LogLevel::Info), Level::INFO);
        assert_eq!(Level::from(LogLevel::Trace), Level::TRACE);
    }

    #[test]
    fn test_dated_file_name()
    {
        let name = dated_file_name();
        assert!(name.ends_with("-typeforge.log"));
        // YYYY-MM-DD prefix
        assert_eq!(name.len(), "2024-01-01-typeforge.log".len());
        assert_eq!(name.as_bytes()[4], b'-');
    }
}
