use std::time::Duration;

use thiserror::Error;

/// Failure of a single tool dispatch.
///
/// The reasoning loop feeds these back to the model as observations.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    Unknown(String),
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),
    #[error("execution failed: {0}")]
    ExecutionFailed(String),
    #[error("timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),
    #[error("path escapes the tool root: {0}")]
    PathEscape(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("not readable: {0}")]
    NotReadable(String),
    #[error("not a directory: {0}")]
    NotADirectory(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("IO failure: {0}")]
    Io(String),
    #[error("cancelled")]
    Cancelled,
}

impl ToolError {
    /// Short machine-readable tag, used in logs and observations.
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::Unknown(_) => "unknown",
            ToolError::InvalidArgs(_) => "invalid_args",
            ToolError::ExecutionFailed(_) => "execution_failed",
            ToolError::Timeout(_) => "timeout",
            ToolError::PathEscape(_) => "path_escape",
            ToolError::NotFound(_) => "not_found",
            ToolError::NotReadable(_) => "not_readable",
            ToolError::NotADirectory(_) => "not_a_directory",
            ToolError::PermissionDenied(_) => "permission_denied",
            ToolError::Io(_) => "io",
            ToolError::Cancelled => "cancelled",
        }
    }
}

/// Errors raised while assembling a registry.
#[derive(Debug, Error, PartialEq)]
pub enum RegistryError {
    #[error("duplicate tool name: {0}")]
    DuplicateToolName(String),
}
