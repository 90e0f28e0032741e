//! Tests for error handling

use typeforge_core::error::{Diagnostic, ExportError, ProviderError, Severity, TypeError, TypeforgeResult};

#[test]
fn test_provider_query_failure_display()
{
    let error = ExportError::ProviderQueryFailure {
        module: "app".to_string(),
        root: "Node".to_string(),
        last_query: Some("Node*".to_string()),
        source: ProviderError::Native("session lost".to_string()),
    };
    let message = format!("{error}");
    assert!(message.contains("app"));
    assert!(message.contains("Node*"));
    assert!(message.contains("session lost"));
}

#[test]
fn test_provider_query_failure_without_last_query()
{
    let error = ExportError::ProviderQueryFailure {
        module: "app".to_string(),
        root: "Node".to_string(),
        last_query: None,
        source: ProviderError::Disconnected,
    };
    assert!(format!("{error}").contains("<none>"));
}

#[test]
fn test_provider_failure_source_is_chained()
{
    use std::error::Error;

    let error = ExportError::ProviderQueryFailure {
        module: "app".to_string(),
        root: "Node".to_string(),
        last_query: None,
        source: ProviderError::Malformed("reading DW_AT_type: bad form".to_string()),
    };
    let source = error.source().map(ToString::to_string).unwrap_or_default();
    assert!(source.contains("DW_AT_type"));
}

#[test]
fn test_cancelled_is_cancelled()
{
    let error = ExportError::Cancelled {
        module: "app".to_string(),
    };
    assert!(error.is_cancelled());
    assert!(!ExportError::InvalidArgument("x".to_string()).is_cancelled());
}

#[test]
fn test_io_error_conversion()
{
    let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
    let error: ExportError = io.into();
    match error {
        ExportError::Io(_) => {
            // Expected: io::Error converts to Io variant
        }
        _ => panic!("Expected Io variant"),
    }
}

#[test]
fn test_type_error_display()
{
    let error = TypeError::IllegalValueCycle {
        cycle: vec!["A".to_string(), "B".to_string()],
    };
    assert_eq!(format!("{error}"), "Illegal value cycle: A -> B");

    let error = TypeError::DepthLimit {
        query: "T*".to_string(),
        limit: 32,
    };
    assert!(format!("{error}").contains("32"));
}

#[test]
fn test_diagnostic_display_and_severity()
{
    let warning = Diagnostic::warning(
        "app",
        TypeError::Unresolvable {
            query: "Missing".to_string(),
            reason: "not found".to_string(),
        },
    );
    assert_eq!(warning.severity, Severity::Warning);
    assert!(format!("{warning}").starts_with("warning[app]: "));

    let error = Diagnostic::error("app", TypeError::IllegalValueCycle { cycle: vec!["A".into()] });
    assert_eq!(error.severity, Severity::Error);
    assert!(Severity::Warning < Severity::Error);
}

#[test]
fn test_result_type_alias()
{
    fn returns_result() -> TypeforgeResult<i32>
    {
        Ok(42)
    }

    assert_eq!(returns_result().unwrap(), 42);
}
