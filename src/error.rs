//! Error types for femtoloop
//!
//! This module defines all error types used throughout the loop engine.
//! Uses `thiserror` for ergonomic error handling with automatic `Display`
//! and `Error` trait implementations.
//!
//! Several conditions the engine surfaces are deliberately *not* errors: a
//! permission denial is a first-class decision value, a user-initiated
//! cancellation ends a pass with a user-stop flag, and resource limits
//! terminate a pass with a stop reason. Only genuine failures travel
//! through `FemtoError`.

use thiserror::Error;

/// The primary error type for femtoloop operations.
#[derive(Error, Debug)]
pub enum FemtoError {
    /// Configuration-related errors (invalid config file, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Tool execution errors (backend failures, unreparable arguments, etc.)
    #[error("Tool error: {0}")]
    Tool(String),

    /// Session/conversation settings errors (persistence failures, bad state)
    #[error("Session error: {0}")]
    Session(String),

    /// Structured invalid-params rejection at the ACP filesystem boundary
    /// (path escapes the registered workspace root, oversized read, etc.)
    #[error("Invalid params: {0}")]
    InvalidParams(String),

    /// Resource not found (files, conversations, workspace roots)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Filesystem permission failures (unreadable or unwritable paths)
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The in-flight operation was aborted by the loop's cancellation
    /// signal. Distinct from `Tool` so callers can classify aborts
    /// separately from execution failures.
    #[error("Operation cancelled")]
    Cancelled,

    /// Standard I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized `Result` type for femtoloop operations.
pub type Result<T> = std::result::Result<T, FemtoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FemtoError::Config("missing data dir".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing data dir");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err: FemtoError = io_err.into();
        assert!(matches!(err, FemtoError::Io(_)));
    }

    #[test]
    fn test_error_from_json() {
        let bad = serde_json::from_str::<serde_json::Value>("{");
        let err: FemtoError = bad.unwrap_err().into();
        assert!(matches!(err, FemtoError::Json(_)));
    }

    #[test]
    fn test_cancelled_is_not_tool_error() {
        let err = FemtoError::Cancelled;
        assert!(!matches!(err, FemtoError::Tool(_)));
        assert_eq!(err.to_string(), "Operation cancelled");
    }

    #[test]
    fn test_invalid_params_display() {
        let err = FemtoError::InvalidParams("path escapes workspace root".to_string());
        assert_eq!(
            err.to_string(),
            "Invalid params: path escapes workspace root"
        );
    }

    #[test]
    fn test_result_type() {
        fn returns_result() -> Result<u32> {
            Ok(7)
        }
        assert_eq!(returns_result().unwrap(), 7);
    }
}
