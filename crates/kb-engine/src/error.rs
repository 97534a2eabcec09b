//! Engine error types.

use std::time::Duration;

use kb_bundle::BundleError;
use kb_cluster::ClusterError;
use kb_rollout::RolloutError;
use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced by the orchestration managers.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Missing required parameter, unknown secret format, unknown resource
    /// kind, unknown config key. Never retried.
    #[error("configuration error: {0}")]
    Config(String),

    /// Missing requirement, self-requirement, or an unresolvable graph.
    #[error("dependency error: {0}")]
    Dependency(String),

    #[error("action '{action}' failed for install '{install}'")]
    DeployFailed { install: String, action: String },

    #[error("timeout expired after {timeout:?} waiting for {target}: {detail}")]
    Timeout {
        target: String,
        timeout: Duration,
        detail: String,
    },

    #[error("admission check failed: {0}")]
    Admission(String),

    #[error("secret generation failed: {0}")]
    Generate(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("error waiting on resource category '{category}': {source}")]
    Rollout {
        category: String,
        #[source]
        source: RolloutError,
    },

    #[error("{} error(s) in layer {layer}: {}", .errors.len(), join_errors(.errors))]
    Layer {
        layer: usize,
        errors: Vec<EngineError>,
    },

    /// A worker task panicked or was cancelled.
    #[error("task failed: {0}")]
    Task(String),

    #[error("cluster error: {0}")]
    Cluster(ClusterError),

    #[error("bundle error: {0}")]
    Bundle(#[from] BundleError),

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<EngineError>,
    },
}

fn join_errors(errors: &[EngineError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl EngineError {
    /// The error beneath any context wrappers.
    pub fn root(&self) -> &EngineError {
        match self {
            EngineError::Context { source, .. } => source.root(),
            other => other,
        }
    }

    /// Cluster capacity checks that `force` may override.
    pub fn is_admission(&self) -> bool {
        matches!(self.root(), EngineError::Admission(_))
    }

    pub fn is_timeout(&self) -> bool {
        match self.root() {
            EngineError::Timeout { .. } => true,
            EngineError::Rollout { source, .. } => source.is_timeout(),
            EngineError::Layer { errors, .. } => errors.iter().all(EngineError::is_timeout),
            _ => false,
        }
    }

    pub fn is_deploy_failed(&self) -> bool {
        match self.root() {
            EngineError::DeployFailed { .. } => true,
            EngineError::Layer { errors, .. } => errors.iter().any(EngineError::is_deploy_failed),
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), EngineError::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self.root(), EngineError::Conflict(_))
    }

    pub fn is_dependency(&self) -> bool {
        matches!(self.root(), EngineError::Dependency(_))
    }

    pub fn is_config(&self) -> bool {
        matches!(self.root(), EngineError::Config(_))
    }
}

impl From<ClusterError> for EngineError {
    fn from(e: ClusterError) -> Self {
        match e {
            ClusterError::NotFound(what) => EngineError::NotFound(what),
            e @ (ClusterError::Conflict { .. } | ClusterError::AlreadyExists(_)) => {
                EngineError::Conflict(e.to_string())
            }
            other => EngineError::Cluster(other),
        }
    }
}

/// Wrap lower errors with the operation and target name.
pub trait ErrorContext<T> {
    fn with_context<F>(self, context: F) -> EngineResult<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ErrorContext<T> for Result<T, E>
where
    E: Into<EngineError>,
{
    fn with_context<F>(self, context: F) -> EngineResult<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| EngineError::Context {
            context: context(),
            source: Box::new(e.into()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_sees_through_context() {
        let err: EngineResult<()> = Err(EngineError::DeployFailed {
            install: "pg".to_string(),
            action: "apply".to_string(),
        });
        let wrapped = err.with_context(|| "couldn't deploy 'pg'".to_string()).unwrap_err();
        assert!(wrapped.is_deploy_failed());
        assert!(!wrapped.is_timeout());
        assert!(wrapped.to_string().starts_with("couldn't deploy 'pg': "));
    }

    #[test]
    fn cluster_not_found_maps_to_not_found() {
        let err: EngineError = ClusterError::NotFound("install default/pg".to_string()).into();
        assert!(err.is_not_found());
    }

    #[test]
    fn layer_errors_are_listed() {
        let err = EngineError::Layer {
            layer: 1,
            errors: vec![
                EngineError::NotFound("a".to_string()),
                EngineError::NotFound("b".to_string()),
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("2 error(s) in layer 1"));
        assert!(msg.contains("not found: a; not found: b"));
    }
}
