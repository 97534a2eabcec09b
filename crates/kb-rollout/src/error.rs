//! Rollout error types.

use std::time::Duration;

use kb_cluster::{ClusterError, WorkloadKind};
use thiserror::Error;

pub type RolloutResult<T> = Result<T, RolloutError>;

#[derive(Debug, Error)]
pub enum RolloutError {
    #[error("timeout expired waiting for {kind} '{name}' after {timeout:?}: {last_status}")]
    Timeout {
        kind: WorkloadKind,
        name: String,
        timeout: Duration,
        last_status: String,
    },

    #[error("deployment '{0}' exceeded its progress deadline")]
    ProgressDeadlineExceeded(String),

    #[error("job '{0}' failed")]
    JobFailed(String),

    #[error("{operation} is not supported for {kind} resources")]
    Unsupported {
        kind: WorkloadKind,
        operation: &'static str,
    },

    #[error("{kind} '{name}' reported state for a different kind")]
    KindMismatch { kind: WorkloadKind, name: String },

    #[error("cluster error: {0}")]
    Cluster(#[from] ClusterError),
}

impl RolloutError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, RolloutError::Timeout { .. })
    }
}
