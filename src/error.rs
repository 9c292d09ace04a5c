//! Tracker Errors
//!
//! Error taxonomy shared by the checklist engine, the backup codec and the
//! record store.

use serde::{Deserialize, Serialize};

/// Common result type for tracker operations
pub type TrackerResult<T> = Result<T, TrackerError>;

/// Tracker-level errors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackerError {
    /// Malformed persisted JSON; callers recover by treating it as empty
    Parse(String),
    /// Backup snapshot has the wrong version or shape; nothing was written
    Format(String),
    /// The record store refused a write (quota, privacy mode)
    Storage(String),
    /// An input event addressed something that does not exist
    InvalidInput(String),
}

impl std::fmt::Display for TrackerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackerError::Parse(msg) => write!(f, "Parse error: {}", msg),
            TrackerError::Format(msg) => write!(f, "{}", msg),
            TrackerError::Storage(msg) => write!(f, "Storage error: {}", msg),
            TrackerError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
        }
    }
}

impl std::error::Error for TrackerError {}

impl From<serde_json::Error> for TrackerError {
    fn from(err: serde_json::Error) -> Self {
        TrackerError::Parse(err.to_string())
    }
}
