//! Error types for hostwatch.

use thiserror::Error;

/// Result type alias for hostwatch operations.
pub type Result<T> = std::result::Result<T, HostwatchError>;

#[derive(Error, Debug)]
pub enum HostwatchError {
    /// The event database could not be opened, read or written, or stayed
    /// locked past the busy timeout.
    #[error("storage error: {0}")]
    Storage(String),

    /// A single process, path or socket could not be read. Enumerating
    /// components skip the item and carry on.
    #[error("snapshot unavailable for {subject}: {reason}")]
    SnapshotUnavailable { subject: String, reason: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl HostwatchError {
    pub fn snapshot(subject: impl Into<String>, reason: impl ToString) -> Self {
        Self::SnapshotUnavailable {
            subject: subject.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<rusqlite::Error> for HostwatchError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Storage(e.to_string())
    }
}
