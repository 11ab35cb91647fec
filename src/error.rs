//! Centralized error types for mailharvest.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the mailharvest library.
#[derive(Error, Debug)]
pub enum MailError {
    /// Bad credentials or refused connection. Fatal, never retried.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Invalid flag combination or unrecognized option value.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// The requested mailbox folder does not exist.
    #[error("Folder not found: {0}")]
    FolderNotFound(String),

    /// The server-side search failed.
    #[error("Search failed: {0}")]
    Search(String),

    /// A single message could not be fetched.
    #[error("Failed to fetch message {id}: {reason}")]
    Fetch { id: String, reason: String },

    /// A tabular attachment could not be parsed.
    #[error("Could not parse '{file}': {reason}")]
    Parse { file: String, reason: String },

    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The caller cancelled the operation.
    #[error("Operation cancelled")]
    Cancelled,

    /// An unusable path or file name was provided.
    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

/// Convenience alias for `Result<T, MailError>`.
pub type Result<T> = std::result::Result<T, MailError>;

impl MailError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Shorthand for a [`MailError::Configuration`].
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Configuration(reason.into())
    }

    /// Whether the caller may retry the whole operation.
    ///
    /// Transient protocol and disk failures are retryable; bad credentials,
    /// caller bugs and cancellation are not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Search(_) | Self::Fetch { .. } | Self::Io { .. })
    }
}

/// Allow `?` on `std::io::Error` inside functions returning `MailError`
/// when no path context is available (rare, prefer `MailError::io`).
impl From<std::io::Error> for MailError {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            path: PathBuf::from("<unknown>"),
            source,
        }
    }
}
