//! Failure taxonomy for the dispatch path.
//!
//! Providers, the synthesizer and the executor raise these locally; only the
//! dispatcher and the HTTP layer turn them into caller-visible responses.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Path outside the sandbox root or containing a forbidden token
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// Validated path does not exist
    #[error("File not found: {0}")]
    NotFound(String),

    /// No LLM client configured, so unmatched tasks cannot be interpreted
    #[error("Command synthesis unavailable: {0}")]
    ModelUnavailable(String),

    /// The LLM call failed
    #[error("Model error: {0}")]
    Model(String),

    /// Subprocess exited non-zero, could not start, timed out or was refused by policy
    #[error("Execution failed: {0}")]
    Execution(String),

    /// A keyword-matched operation failed
    #[error("Operation {operation} failed: {message}")]
    Operation { operation: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DispatchError {
    /// Short machine-readable category name, used in logs.
    pub fn category(&self) -> &'static str {
        match self {
            DispatchError::AccessDenied(_) => "access_denied",
            DispatchError::NotFound(_) => "not_found",
            DispatchError::ModelUnavailable(_) => "model_unavailable",
            DispatchError::Model(_) => "model_error",
            DispatchError::Execution(_) => "execution_error",
            DispatchError::Operation { .. } => "operation_error",
            DispatchError::Io(_) => "io_error",
        }
    }

    /// Underlying diagnostic without the category prefix.
    ///
    /// For execution failures this is the captured stderr verbatim.
    pub fn detail(&self) -> String {
        match self {
            DispatchError::AccessDenied(msg)
            | DispatchError::NotFound(msg)
            | DispatchError::ModelUnavailable(msg)
            | DispatchError::Model(msg)
            | DispatchError::Execution(msg) => msg.clone(),
            DispatchError::Operation { message, .. } => message.clone(),
            DispatchError::Io(e) => e.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DispatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_category_and_detail() {
        let err = DispatchError::Execution("ls: cannot access 'x'".to_string());
        assert_eq!(err.to_string(), "Execution failed: ls: cannot access 'x'");
        assert_eq!(err.detail(), "ls: cannot access 'x'");
        assert_eq!(err.category(), "execution_error");
    }

    #[test]
    fn test_operation_error_display() {
        let err = DispatchError::Operation {
            operation: "clone_repo".to_string(),
            message: "Git clone failed: fatal".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Operation clone_repo failed: Git clone failed: fatal"
        );
        assert_eq!(err.detail(), "Git clone failed: fatal");
    }

    #[test]
    fn test_io_error_from() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: DispatchError = io.into();
        assert_eq!(err.category(), "io_error");
        assert!(err.to_string().contains("denied"));
    }
}
