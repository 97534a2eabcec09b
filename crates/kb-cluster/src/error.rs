//! Error types for the cluster capability.

use thiserror::Error;

/// Result type alias for cluster operations.
pub type ClusterResult<T> = Result<T, ClusterError>;

/// Errors reported by a resource store or cluster runtime.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("conflict on {key}: expected version {expected}, found {actual}")]
    Conflict {
        key: String,
        expected: u64,
        actual: u64,
    },

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("log stream error: {0}")]
    Stream(String),
}

impl ClusterError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClusterError::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, ClusterError::Conflict { .. } | ClusterError::AlreadyExists(_))
    }
}

impl From<serde_json::Error> for ClusterError {
    fn from(e: serde_json::Error) -> Self {
        ClusterError::Serialize(e.to_string())
    }
}
