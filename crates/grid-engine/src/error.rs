//! Error types for engine invocations.

use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors raised at the external engine boundary.
#[derive(Error, Debug)]
pub enum EngineError {
    /// File I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Missing required variable or attribute
    #[error("Missing required data: {0}")]
    MissingData(String),

    /// Output of the engine could not be understood
    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    /// The engine process could not be started
    #[error("Failed to launch `{program}`: {message}")]
    LaunchFailed { program: String, message: String },

    /// The engine process exited with a non-zero status
    #[error("Command `{command}` failed: {diagnostics}")]
    CommandFailed {
        command: String,
        diagnostics: String,
    },
}

impl EngineError {
    /// Create a CommandFailed error.
    pub fn command_failed(command: impl Into<String>, diagnostics: impl Into<String>) -> Self {
        Self::CommandFailed {
            command: command.into(),
            diagnostics: diagnostics.into(),
        }
    }

    /// Create an InvalidFormat error.
    pub fn invalid_format(msg: impl Into<String>) -> Self {
        Self::InvalidFormat(msg.into())
    }
}
