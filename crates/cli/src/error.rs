//! Error types for CLI operations.

use contracts::ContractError;
use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Malformed `key=value` argument
    #[error("Invalid assignment '{input}': {message}")]
    InvalidAssignment { input: String, message: String },

    /// Session could not be opened or navigated
    #[error("Session error: {0}")]
    Session(#[from] ContractError),

    /// Frames failed to decode during a command
    #[error("{failed} of {total} frames failed to decode")]
    FramesFailed { failed: usize, total: usize },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    pub fn invalid_assignment(input: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidAssignment {
            input: input.into(),
            message: message.into(),
        }
    }
}
