//! Base error types for stackinit
//!
//! Every crate in the workspace re-exports this error type so failures keep
//! their category all the way up to the binary.

use std::path::PathBuf;
use thiserror::Error;

/// Base error type for shared functionality
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed hook file, missing credential file, bad hook path or settings
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Every metadata source was exhausted, or the document is unusable
    #[error("Metadata retrieval failed: {0}")]
    Retrieval(String),

    /// The server answered with an error status (or an ambiguous redirect)
    #[error("{reason} ({status})")]
    HttpStatus { reason: String, status: u16 },

    /// Connection, TLS or redirect handling failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// A command that was not marked `ignoreErrors` failed
    #[error("{label} has failed: {message}")]
    CommandFailure { label: String, message: String },

    /// Error reading a file
    #[error("Failed to read file {}: {source}", path.display())]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error writing a file
    #[error("Failed to write file {}: {source}", path.display())]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Build a [`Error::CommandFailure`] for the step named `label`
    pub fn command_failure(label: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CommandFailure {
            label: label.into(),
            message: message.into(),
        }
    }

    /// Whether this error came from the HTTP status line rather than the connection
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}
