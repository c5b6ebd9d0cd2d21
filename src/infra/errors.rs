// src/infra/errors.rs: Error types for verite

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VeriteError {
    // Configuration (fatal, never retried)
    #[error("Configuration error: {0}")]
    Configuration(String),

    // External services (pricing sources, RPC endpoints, metadata providers)
    #[error("External service '{service}' error: {message}")]
    ExternalService {
        service: String,
        message: String,
        retriable: bool,
    },

    // Harness outcomes (structured, surfaced to the caller as-is)
    #[error("Compilation failed: {message}")]
    CompileFailure { message: String },

    #[error("Execution reverted: {reason}")]
    ExecutionRevert { reason: String },

    #[error("Execution timed out after {seconds}s")]
    ExecutionTimeout { seconds: u64 },

    #[error("Harness process failed (exit code {exit_code:?}): {message}")]
    ProcessError {
        exit_code: Option<i32>,
        message: String,
    },

    // Tool calls
    #[error("Tool '{name}' not found")]
    ToolNotFound { name: String },

    #[error("Tool '{name}' timed out after {seconds}s")]
    ToolTimeout { name: String, seconds: u64 },

    #[error("Tool '{name}' failed: {message}")]
    ToolFailure { name: String, message: String },

    // Input validation
    #[error("Invalid address '{0}'")]
    InvalidAddress(String),

    #[error("Invalid parameter '{name}': {message}")]
    InvalidParameter { name: String, message: String },

    // Infra
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl VeriteError {
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            VeriteError::ExternalService {
                retriable: true,
                ..
            }
        )
    }

    /// Stable, machine-readable reason code for terminal states.
    pub fn reason(&self) -> &'static str {
        match self {
            VeriteError::Configuration(_) => "configuration_error",
            VeriteError::ExternalService { .. } => "external_service_error",
            VeriteError::CompileFailure { .. } => "compile_failure",
            VeriteError::ExecutionRevert { .. } => "execution_revert",
            VeriteError::ExecutionTimeout { .. } => "execution_timeout",
            VeriteError::ProcessError { .. } => "process_error",
            VeriteError::ToolNotFound { .. } => "tool_not_found",
            VeriteError::ToolTimeout { .. } => "tool_timeout",
            VeriteError::ToolFailure { .. } => "tool_failure",
            VeriteError::InvalidAddress(_) => "invalid_address",
            VeriteError::InvalidParameter { .. } => "invalid_parameter",
            VeriteError::Io(_) => "io_error",
            VeriteError::Json(_) => "json_error",
            VeriteError::Other(_) => "internal_error",
        }
    }

    pub fn invalid_param(name: impl Into<String>, message: impl Into<String>) -> Self {
        VeriteError::InvalidParameter {
            name: name.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, VeriteError>;
