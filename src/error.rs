//! Error types for sandbox agent orchestration.

use thiserror::Error;

/// Top-level error type for agent operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or invalid configuration (no provider, no token, no branch).
    #[error("configuration error: {0}")]
    Config(String),

    /// There is nothing to commit or no diff could be produced.
    #[error("no changes found: {0}")]
    NoChanges(String),

    /// A git command ran but reported failure.
    #[error("git operation failed: {0}")]
    Git(String),

    /// The sandbox transport failed to run a command.
    #[error("sandbox error: {0}")]
    Sandbox(String),

    /// GitHub returned a non-2xx response.
    #[error("GitHub request failed ({status}): {message}")]
    GitHub { status: u16, message: String },

    /// The external summarizer failed.
    #[error("summarization failed: {0}")]
    Summarization(String),

    /// A caller-supplied secret could not be resolved.
    #[error("secret error: {0}")]
    Secret(#[from] crate::secrets::SecretError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP transport error talking to GitHub.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    /// Returns true for errors that mean "nothing to do" rather than a failure.
    pub fn is_no_changes(&self) -> bool {
        matches!(self, Error::NoChanges(_))
    }
}

/// Result type alias for agent operations.
pub type Result<T> = std::result::Result<T, Error>;
