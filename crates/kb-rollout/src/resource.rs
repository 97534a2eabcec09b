//! DeployableResource — a handle on one declared workload.
//!
//! The handle is keyed by [`WorkloadKind`]; every kind answers the same set
//! of operations (fetch, wait, scale, restart, logs, status, delete). Kinds
//! where an operation makes no sense either treat it as a no-op (services)
//! or report [`RolloutError::Unsupported`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use kb_cluster::{
    ClusterRuntime, ContainerStatus, LogOptions, PodSelector, WorkloadKind, WorkloadState,
};
use serde::Serialize;
use tokio::io::AsyncReadExt;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::{RolloutError, RolloutResult};
use crate::status::{RolloutProgress, rollout_status, statefulset_status};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Replica summary of a resource, for status views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceReport {
    pub name: String,
    pub category: String,
    pub kind: WorkloadKind,
    pub available: i32,
    pub total: i32,
}

/// Collected log output of one container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerLogs {
    pub pod: String,
    pub container: String,
    pub output: String,
}

/// Container state of one pod, for status views.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerReport {
    pub pod: String,
    pub node: String,
    pub status: ContainerStatus,
}

#[derive(Clone)]
pub struct DeployableResource {
    runtime: Arc<dyn ClusterRuntime>,
    kind: WorkloadKind,
    namespace: String,
    name: String,
    category: String,
    poll_interval: Duration,
}

impl DeployableResource {
    pub fn new(
        runtime: Arc<dyn ClusterRuntime>,
        kind: WorkloadKind,
        namespace: &str,
        name: &str,
        category: &str,
    ) -> Self {
        Self {
            runtime,
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
            category: category.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn kind(&self) -> WorkloadKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    /// Quorum resources are a set of statefulsets rather than one object.
    pub fn needs_quorum(&self) -> bool {
        self.kind == WorkloadKind::Quorum
    }

    /// The concrete workload objects behind this handle.
    async fn members(&self) -> RolloutResult<Vec<(WorkloadKind, String)>> {
        match self.kind {
            WorkloadKind::Service => Ok(Vec::new()),
            WorkloadKind::Quorum => {
                let labels = BTreeMap::from([("app".to_string(), self.name.clone())]);
                let names = self
                    .runtime
                    .list_workloads(&self.namespace, WorkloadKind::StatefulSet, &labels)
                    .await?;
                Ok(names
                    .into_iter()
                    .map(|name| (WorkloadKind::StatefulSet, name))
                    .collect())
            }
            kind => Ok(vec![(kind, self.name.clone())]),
        }
    }

    /// Observed state of every member. Missing objects are `None`.
    pub async fn fetch(&self) -> RolloutResult<Vec<(String, Option<WorkloadState>)>> {
        let mut states = Vec::new();
        for (kind, name) in self.members().await? {
            let state = self
                .runtime
                .get_workload(&self.namespace, kind, &name)
                .await?;
            states.push((name, state));
        }
        Ok(states)
    }

    /// Evaluate the rollout predicate once.
    pub async fn check(&self) -> RolloutResult<RolloutProgress> {
        match self.kind {
            WorkloadKind::Service => {
                return Ok(RolloutProgress::Complete(format!(
                    "service '{}' has no rollout",
                    self.name
                )));
            }
            WorkloadKind::Quorum => {
                let states = self.fetch().await?;
                if states.is_empty() {
                    return Ok(RolloutProgress::Waiting(format!(
                        "waiting for statefulsets labelled app={}",
                        self.name
                    )));
                }
                for (name, state) in states {
                    let progress = match state {
                        Some(WorkloadState::StatefulSet(s)) => statefulset_status(&name, &s),
                        Some(_) => {
                            return Err(RolloutError::KindMismatch {
                                kind: WorkloadKind::StatefulSet,
                                name,
                            });
                        }
                        None => {
                            RolloutProgress::Waiting(format!("waiting for statefulset '{name}'"))
                        }
                    };
                    if !progress.is_complete() {
                        return Ok(progress);
                    }
                }
                Ok(RolloutProgress::Complete(format!(
                    "quorum '{}' rolled out",
                    self.name
                )))
            }
            _ => match self
                .runtime
                .get_workload(&self.namespace, self.kind, &self.name)
                .await?
            {
                Some(state) => rollout_status(&self.name, &state),
                None => Ok(RolloutProgress::Waiting(format!(
                    "waiting for {} '{}' to be created",
                    self.kind, self.name
                ))),
            },
        }
    }

    /// Poll until the rollout completes or `timeout` elapses.
    pub async fn wait(&self, timeout: Duration) -> RolloutResult<()> {
        let deadline = Instant::now() + timeout;
        loop {
            let progress = self.check().await?;
            match progress {
                RolloutProgress::Complete(msg) => {
                    info!(kind = %self.kind, name = %self.name, "{msg}");
                    return Ok(());
                }
                RolloutProgress::Waiting(msg) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(RolloutError::Timeout {
                            kind: self.kind,
                            name: self.name.clone(),
                            timeout,
                            last_status: msg,
                        });
                    }
                    debug!(kind = %self.kind, name = %self.name, "{msg}");
                    tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
                }
            }
        }
    }

    pub async fn scale(&self, replicas: i32) -> RolloutResult<()> {
        match self.kind {
            WorkloadKind::Service => Ok(()),
            WorkloadKind::Job | WorkloadKind::CronJob | WorkloadKind::DaemonSet => {
                Err(RolloutError::Unsupported {
                    kind: self.kind,
                    operation: "scale",
                })
            }
            _ => {
                for (kind, name) in self.members().await? {
                    self.runtime
                        .scale_workload(&self.namespace, kind, &name, replicas)
                        .await?;
                }
                info!(kind = %self.kind, name = %self.name, replicas, "resource scaled");
                Ok(())
            }
        }
    }

    pub async fn restart(&self) -> RolloutResult<()> {
        match self.kind {
            WorkloadKind::Service => Ok(()),
            WorkloadKind::Job | WorkloadKind::CronJob => Err(RolloutError::Unsupported {
                kind: self.kind,
                operation: "restart",
            }),
            _ => {
                for (kind, name) in self.members().await? {
                    self.runtime
                        .restart_workload(&self.namespace, kind, &name)
                        .await?;
                }
                info!(kind = %self.kind, name = %self.name, "resource restarted");
                Ok(())
            }
        }
    }

    /// Delete every member. Returns true if anything was removed.
    pub async fn delete(&self) -> RolloutResult<bool> {
        let mut removed = false;
        for (kind, name) in self.members().await? {
            removed |= self
                .runtime
                .delete_workload(&self.namespace, kind, &name)
                .await?;
        }
        Ok(removed)
    }

    /// Read the current log output of every container of every pod.
    pub async fn logs(&self, tail_lines: Option<u64>) -> RolloutResult<Vec<ContainerLogs>> {
        let mut collected = Vec::new();
        for (kind, name) in self.members().await? {
            let pods = self
                .runtime
                .list_pods(&self.namespace, &PodSelector::Workload { kind, name })
                .await?;
            for pod in pods {
                for container in &pod.containers {
                    let options = LogOptions {
                        container: Some(container.clone()),
                        follow: false,
                        tail_lines,
                    };
                    let mut stream = self
                        .runtime
                        .stream_logs(&self.namespace, &pod.name, &options)
                        .await?;
                    let mut output = String::new();
                    stream.read_to_string(&mut output).await.map_err(|e| {
                        RolloutError::Cluster(kb_cluster::ClusterError::Stream(e.to_string()))
                    })?;
                    collected.push(ContainerLogs {
                        pod: pod.name.clone(),
                        container: container.clone(),
                        output,
                    });
                }
            }
        }
        Ok(collected)
    }

    /// Replica counts summed over every member.
    pub async fn status(&self) -> RolloutResult<ResourceReport> {
        let (mut available, mut total) = (0, 0);
        for (_, state) in self.fetch().await? {
            if let Some(state) = state {
                let (a, t) = state.replica_counts();
                available += a;
                total += t;
            }
        }
        Ok(ResourceReport {
            name: self.name.clone(),
            category: self.category.clone(),
            kind: self.kind,
            available,
            total,
        })
    }

    /// Container states of every pod.
    pub async fn containers(&self) -> RolloutResult<Vec<ContainerReport>> {
        let mut reports = Vec::new();
        for (kind, name) in self.members().await? {
            let pods = self
                .runtime
                .list_pods(&self.namespace, &PodSelector::Workload { kind, name })
                .await?;
            for pod in pods {
                for status in pod.container_statuses {
                    reports.push(ContainerReport {
                        pod: pod.name.clone(),
                        node: pod.node_name.clone(),
                        status,
                    });
                }
            }
        }
        Ok(reports)
    }
}
