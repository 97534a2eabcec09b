//! Error types for the kube-bundler state store.

use kb_cluster::ClusterError;
use thiserror::Error;

/// Result type alias for state store operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur during state store operations.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

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
}

impl From<StateError> for ClusterError {
    fn from(e: StateError) -> Self {
        match e {
            StateError::NotFound(key) => ClusterError::NotFound(key),
            StateError::AlreadyExists(key) => ClusterError::AlreadyExists(key),
            StateError::Conflict {
                key,
                expected,
                actual,
            } => ClusterError::Conflict {
                key,
                expected,
                actual,
            },
            StateError::Serialize(msg) | StateError::Deserialize(msg) => {
                ClusterError::Serialize(msg)
            }
            other => ClusterError::Backend(other.to_string()),
        }
    }
}
