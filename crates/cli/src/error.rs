//! Error types for CLI commands

use thiserror::Error;

/// Errors that can occur during command execution
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum CommandError {
    /// Failure reported by the agent crates
    #[error(transparent)]
    Agent(#[from] stackinit_core::Error),

    /// Metadata was retrieved but the requested key is absent
    #[error("Key {key:?} not found in metadata")]
    KeyNotFound {
        /// The missing key
        key: String,
    },
}

/// Result type alias for command operations
pub type Result<T> = std::result::Result<T, CommandError>;

impl From<serde_json::Error> for CommandError {
    fn from(err: serde_json::Error) -> Self {
        Self::Agent(err.into())
    }
}
