//! Error types for lazy grid pipelines.

use grid_engine::EngineError;
use thiserror::Error;

/// Errors raised by datasets, sessions and the executor.
///
/// `TypeError` and `ValueError` are raised synchronously, before anything
/// is queued or executed. `ExecutionFailed` comes from the external engine.
#[derive(Error, Debug)]
pub enum GridError {
    /// An argument of the wrong kind, e.g. a list where a scalar was expected.
    #[error("type error: {0}")]
    TypeError(String),

    /// An argument of the right kind with an unusable value.
    #[error("invalid value: {0}")]
    ValueError(String),

    /// The engine exited with a non-zero status.
    #[error("command `{command}` failed: {diagnostics}")]
    ExecutionFailed {
        command: String,
        diagnostics: String,
    },

    /// Any other engine failure (launch, unreadable output).
    #[error("engine error: {0}")]
    Engine(EngineError),

    /// Storage/IO error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Recipe could not be parsed.
    #[error("recipe error: {0}")]
    Recipe(String),
}

impl GridError {
    /// Create a TypeError.
    pub fn type_error(msg: impl Into<String>) -> Self {
        Self::TypeError(msg.into())
    }

    /// Create a ValueError.
    pub fn value_error(msg: impl Into<String>) -> Self {
        Self::ValueError(msg.into())
    }

    pub fn is_type_error(&self) -> bool {
        matches!(self, Self::TypeError(_))
    }

    pub fn is_value_error(&self) -> bool {
        matches!(self, Self::ValueError(_))
    }

    pub fn is_execution_failure(&self) -> bool {
        matches!(self, Self::ExecutionFailed { .. })
    }
}

impl From<EngineError> for GridError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::CommandFailed {
                command,
                diagnostics,
            } => Self::ExecutionFailed {
                command,
                diagnostics,
            },
            other => Self::Engine(other),
        }
    }
}

impl From<serde_json::Error> for GridError {
    fn from(err: serde_json::Error) -> Self {
        Self::Recipe(err.to_string())
    }
}

impl From<serde_yaml::Error> for GridError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Recipe(err.to_string())
    }
}

/// Result type for lazy-grid operations.
pub type Result<T> = std::result::Result<T, GridError>;

pub(crate) fn type_error(msg: impl Into<String>) -> GridError {
    GridError::type_error(msg)
}

pub(crate) fn value_error(msg: impl Into<String>) -> GridError {
    GridError::value_error(msg)
}
