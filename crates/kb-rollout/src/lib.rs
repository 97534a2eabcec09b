//! kube-bundler rollout verification — per-kind readiness predicates.
//!
//! After a deploy action applies manifests, each declared workload is
//! watched until it converges or a timeout elapses.
//!
//! # Components
//!
//! - **`status`** — Pure rollout-complete predicates (deployment, statefulset,
//!   daemonset, job, cronjob)
//! - **`resource`** — `DeployableResource`, a handle that fetches, waits on,
//!   scales, restarts, deletes and reads logs for one workload

pub mod error;
pub mod resource;
pub mod status;

pub use error::{RolloutError, RolloutResult};
pub use resource::{
    ContainerLogs, ContainerReport, DEFAULT_POLL_INTERVAL, DeployableResource, ResourceReport,
};
pub use status::{RolloutProgress, rollout_status};
