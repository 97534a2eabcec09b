//! Execution runtime capability: nodes, jobs, pods, logs and workloads.

use std::collections::BTreeMap;
use std::pin::Pin;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;

use crate::error::ClusterResult;
use crate::workload::{JobStatus, WorkloadKind, WorkloadState};

/// A live log stream. Callers must drain it to the end.
pub type LogStream = Pin<Box<dyn AsyncRead + Send>>;

/// Allocatable capacity of a cluster node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub name: String,
    pub allocatable_cpu_millis: u64,
    pub allocatable_memory_bytes: u64,
}

/// A configuration map mounted into an execution unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigMount {
    pub config_map: String,
    pub mount_path: String,
}

/// A single-container, run-once execution unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    pub name: String,
    pub namespace: String,
    pub image: String,
    pub args: Vec<String>,
    pub mounts: Vec<ConfigMount>,
    pub active_deadline_secs: u64,
    pub termination_grace_secs: u64,
    pub backoff_limit: u32,
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainerState {
    Waiting { reason: String },
    Running,
    Terminated { reason: String, exit_code: i32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerStatus {
    pub name: String,
    pub state: ContainerState,
    pub ready: bool,
    pub restart_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodInfo {
    pub name: String,
    pub phase: PodPhase,
    pub node_name: String,
    /// Container names in spec order.
    pub containers: Vec<String>,
    pub container_statuses: Vec<ContainerStatus>,
    /// Seconds since the epoch.
    pub created_at: u64,
}

/// Which pods to list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PodSelector {
    /// Pods owned by an execution unit.
    Job(String),
    /// Pods owned by a workload object.
    Workload { kind: WorkloadKind, name: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogOptions {
    pub container: Option<String>,
    pub follow: bool,
    pub tail_lines: Option<u64>,
}

#[async_trait]
pub trait ClusterRuntime: Send + Sync {
    async fn list_nodes(&self) -> ClusterResult<Vec<NodeInfo>>;

    async fn create_job(&self, job: &JobSpec) -> ClusterResult<()>;

    async fn get_job(&self, namespace: &str, name: &str) -> ClusterResult<Option<JobStatus>>;

    /// Delete an execution unit and its pods. Returns false if it did not exist.
    async fn delete_job(&self, namespace: &str, name: &str) -> ClusterResult<bool>;

    async fn list_pods(&self, namespace: &str, selector: &PodSelector)
    -> ClusterResult<Vec<PodInfo>>;

    async fn stream_logs(
        &self,
        namespace: &str,
        pod: &str,
        options: &LogOptions,
    ) -> ClusterResult<LogStream>;

    async fn get_workload(
        &self,
        namespace: &str,
        kind: WorkloadKind,
        name: &str,
    ) -> ClusterResult<Option<WorkloadState>>;

    /// Names of workloads of `kind` carrying all of `labels`.
    async fn list_workloads(
        &self,
        namespace: &str,
        kind: WorkloadKind,
        labels: &BTreeMap<String, String>,
    ) -> ClusterResult<Vec<String>>;

    async fn scale_workload(
        &self,
        namespace: &str,
        kind: WorkloadKind,
        name: &str,
        replicas: i32,
    ) -> ClusterResult<()>;

    async fn restart_workload(
        &self,
        namespace: &str,
        kind: WorkloadKind,
        name: &str,
    ) -> ClusterResult<()>;

    async fn delete_workload(
        &self,
        namespace: &str,
        kind: WorkloadKind,
        name: &str,
    ) -> ClusterResult<bool>;
}
