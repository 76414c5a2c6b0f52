//! Error types for draft persistence.

use thiserror::Error;

/// Errors that can cross a draft store boundary.
///
/// The engine and reconciler catch all of these; none reach the composer
/// except as a `SaveStatus::Error` message.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum DraftError {
    /// Local cache could not be read.
    #[error("failed to read local draft cache: {0}")]
    CacheRead(String),

    /// Local cache could not be written.
    #[error("failed to write local draft cache: {0}")]
    CacheWrite(String),

    /// Remote draft store call failed.
    #[error("remote draft store error: {0}")]
    Remote(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Filesystem error from a file-backed store.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for DraftError {
    fn from(e: serde_json::Error) -> Self {
        DraftError::Serialization(e.to_string())
    }
}
