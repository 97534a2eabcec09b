//! Workload kinds and the observed state a runtime reports for them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The closed set of workload kinds an application can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkloadKind {
    Deployment,
    StatefulSet,
    DaemonSet,
    Job,
    CronJob,
    /// A set of statefulsets sharing an `app=<name>` label, managed by a
    /// quorum operator.
    Quorum,
    Service,
}

impl WorkloadKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkloadKind::Deployment => "deployment",
            WorkloadKind::StatefulSet => "statefulset",
            WorkloadKind::DaemonSet => "daemonset",
            WorkloadKind::Job => "job",
            WorkloadKind::CronJob => "cronjob",
            WorkloadKind::Quorum => "quorum",
            WorkloadKind::Service => "service",
        }
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a declared resource type is not a known workload kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownKind(pub String);

impl fmt::Display for UnknownKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown resource type '{}'", self.0)
    }
}

impl std::error::Error for UnknownKind {}

impl FromStr for WorkloadKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "deployment" => Ok(WorkloadKind::Deployment),
            "statefulset" => Ok(WorkloadKind::StatefulSet),
            "daemonset" => Ok(WorkloadKind::DaemonSet),
            "job" => Ok(WorkloadKind::Job),
            "cronjob" => Ok(WorkloadKind::CronJob),
            "quorum" | "kubegres" => Ok(WorkloadKind::Quorum),
            "service" => Ok(WorkloadKind::Service),
            _ => Err(UnknownKind(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentState {
    pub generation: i64,
    pub observed_generation: i64,
    /// Desired replicas from the spec. `None` means the default of 1.
    pub replicas: Option<i32>,
    /// Total pods, old and new.
    pub status_replicas: i32,
    pub updated_replicas: i32,
    pub ready_replicas: i32,
    pub available_replicas: i32,
    pub progress_deadline_exceeded: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatefulSetState {
    pub generation: i64,
    pub observed_generation: i64,
    pub replicas: Option<i32>,
    pub ready_replicas: i32,
    pub updated_replicas: i32,
    pub current_replicas: i32,
    /// Partition of a rolling update strategy, if one is set.
    pub partition: Option<i32>,
    pub update_revision: String,
    pub current_revision: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonSetState {
    pub generation: i64,
    pub observed_generation: i64,
    pub desired_number_scheduled: i32,
    pub updated_number_scheduled: i32,
    pub number_available: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobConditionType {
    Complete,
    Failed,
    Suspended,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    /// Conditions in the order the runtime recorded them.
    pub conditions: Vec<JobConditionType>,
    pub active: i32,
    pub succeeded: i32,
    pub failed: i32,
}

impl JobStatus {
    /// The most recent terminal condition, if any.
    pub fn terminal_condition(&self) -> Option<JobConditionType> {
        self.conditions
            .iter()
            .rev()
            .copied()
            .find(|c| matches!(c, JobConditionType::Complete | JobConditionType::Failed))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CronJobState {
    pub suspended: bool,
    pub active: i32,
}

/// Observed state of a single workload object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkloadState {
    Deployment(DeploymentState),
    StatefulSet(StatefulSetState),
    DaemonSet(DaemonSetState),
    Job(JobStatus),
    CronJob(CronJobState),
}

impl WorkloadState {
    /// `(available, total)` replica counts for display.
    pub fn replica_counts(&self) -> (i32, i32) {
        match self {
            WorkloadState::Deployment(d) => (d.ready_replicas, d.replicas.unwrap_or(1)),
            WorkloadState::StatefulSet(s) => (s.ready_replicas, s.replicas.unwrap_or(1)),
            WorkloadState::DaemonSet(d) => (d.number_available, d.desired_number_scheduled),
            WorkloadState::Job(j) => (j.succeeded, j.succeeded + j.active + j.failed),
            WorkloadState::CronJob(c) => (c.active, c.active),
        }
    }
}
