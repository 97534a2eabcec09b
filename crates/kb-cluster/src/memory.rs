//! MemoryRuntime — an in-process [`ClusterRuntime`].
//!
//! Jobs run instantly according to a per-job [`JobScript`]; workloads hold
//! whatever state was last set. Used for dry runs and tests.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Cursor;

use async_trait::async_trait;
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::sync::Mutex;

use crate::error::{ClusterError, ClusterResult};
use crate::runtime::{
    ClusterRuntime, ContainerState, ContainerStatus, JobSpec, LogOptions, LogStream, NodeInfo,
    PodInfo, PodPhase, PodSelector,
};
use crate::workload::{JobConditionType, JobStatus, WorkloadKind, WorkloadState};

/// How a job behaves once created.
#[derive(Debug, Clone)]
pub struct JobScript {
    /// Terminal condition to report, or `None` to run forever.
    pub outcome: Option<JobConditionType>,
    /// Number of `get_job` calls before the outcome is reported.
    pub after_polls: u32,
    /// Log output of the job's pod.
    pub logs: String,
    /// Number of `list_pods` calls that see the pod as pending.
    pub pending_lists: u32,
    /// Log streams deliver `logs` and then stay open.
    pub hold_stream: bool,
}

impl Default for JobScript {
    fn default() -> Self {
        Self {
            outcome: Some(JobConditionType::Complete),
            after_polls: 0,
            logs: String::new(),
            pending_lists: 0,
            hold_stream: false,
        }
    }
}

impl JobScript {
    pub fn complete(logs: &str) -> Self {
        Self {
            logs: logs.to_string(),
            ..Default::default()
        }
    }

    pub fn failed(logs: &str) -> Self {
        Self {
            outcome: Some(JobConditionType::Failed),
            logs: logs.to_string(),
            ..Default::default()
        }
    }

    pub fn hanging(logs: &str) -> Self {
        Self {
            outcome: None,
            logs: logs.to_string(),
            ..Default::default()
        }
    }

    /// Pod stays pending for the first `lists` pod listings.
    pub fn pending_for(mut self, lists: u32) -> Self {
        self.pending_lists = lists;
        self
    }

    /// Log streams never reach end of file.
    pub fn holding_stream(mut self) -> Self {
        self.hold_stream = true;
        self
    }
}

struct RunningJob {
    spec: JobSpec,
    script: JobScript,
    polls: u32,
    lists: u32,
    pod: String,
}

struct StoredWorkload {
    state: WorkloadState,
    labels: BTreeMap<String, String>,
}

#[derive(Default)]
struct Inner {
    nodes: Vec<NodeInfo>,
    scripts: BTreeMap<String, JobScript>,
    jobs: BTreeMap<String, RunningJob>,
    created: Vec<JobSpec>,
    deleted: Vec<String>,
    workloads: BTreeMap<(String, WorkloadKind, String), StoredWorkload>,
    workload_pods: BTreeMap<(String, WorkloadKind, String), Vec<PodInfo>>,
    pod_logs: BTreeMap<String, String>,
    held_pods: BTreeSet<String>,
    // writer halves of held streams; dropping one ends its stream
    held_writers: Vec<DuplexStream>,
    restarts: Vec<String>,
    log_requests: u32,
    clock: u64,
}

#[derive(Default)]
pub struct MemoryRuntime {
    inner: Mutex<Inner>,
}

fn key(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}

impl MemoryRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_node(&self, name: &str, cpu_millis: u64, memory_bytes: u64) {
        self.inner.lock().await.nodes.push(NodeInfo {
            name: name.to_string(),
            allocatable_cpu_millis: cpu_millis,
            allocatable_memory_bytes: memory_bytes,
        });
    }

    /// Decide how the job named `job_name` behaves when it is next created.
    pub async fn script_job(&self, job_name: &str, script: JobScript) {
        self.inner
            .lock()
            .await
            .scripts
            .insert(job_name.to_string(), script);
    }

    pub async fn set_workload(
        &self,
        namespace: &str,
        kind: WorkloadKind,
        name: &str,
        state: WorkloadState,
        labels: BTreeMap<String, String>,
    ) {
        self.inner.lock().await.workloads.insert(
            (namespace.to_string(), kind, name.to_string()),
            StoredWorkload { state, labels },
        );
    }

    pub async fn set_workload_pods(
        &self,
        namespace: &str,
        kind: WorkloadKind,
        name: &str,
        pods: Vec<PodInfo>,
        logs: &str,
    ) {
        let mut inner = self.inner.lock().await;
        for pod in &pods {
            inner.pod_logs.insert(pod.name.clone(), logs.to_string());
        }
        inner
            .workload_pods
            .insert((namespace.to_string(), kind, name.to_string()), pods);
    }

    /// Every job created so far, in order.
    pub async fn created_jobs(&self) -> Vec<JobSpec> {
        self.inner.lock().await.created.clone()
    }

    /// Names of jobs that existed when deleted, in order.
    pub async fn deleted_jobs(&self) -> Vec<String> {
        self.inner.lock().await.deleted.clone()
    }

    pub async fn restarts(&self) -> Vec<String> {
        self.inner.lock().await.restarts.clone()
    }

    pub async fn log_requests(&self) -> u32 {
        self.inner.lock().await.log_requests
    }
}

#[async_trait]
impl ClusterRuntime for MemoryRuntime {
    async fn list_nodes(&self) -> ClusterResult<Vec<NodeInfo>> {
        Ok(self.inner.lock().await.nodes.clone())
    }

    async fn create_job(&self, job: &JobSpec) -> ClusterResult<()> {
        let mut inner = self.inner.lock().await;
        let job_key = key(&job.namespace, &job.name);
        if inner.jobs.contains_key(&job_key) {
            return Err(ClusterError::AlreadyExists(format!("job {job_key}")));
        }
        let script = inner.scripts.get(&job.name).cloned().unwrap_or_default();
        inner.clock += 1;
        let pod = format!("{}-{}", job.name, inner.clock);
        inner.pod_logs.insert(pod.clone(), script.logs.clone());
        if script.hold_stream {
            inner.held_pods.insert(pod.clone());
        }
        inner.created.push(job.clone());
        inner.jobs.insert(
            job_key,
            RunningJob {
                spec: job.clone(),
                script,
                polls: 0,
                lists: 0,
                pod,
            },
        );
        Ok(())
    }

    async fn get_job(&self, namespace: &str, name: &str) -> ClusterResult<Option<JobStatus>> {
        let mut inner = self.inner.lock().await;
        let Some(job) = inner.jobs.get_mut(&key(namespace, name)) else {
            return Ok(None);
        };
        job.polls += 1;
        let mut status = JobStatus::default();
        match job.script.outcome {
            Some(outcome) if job.polls > job.script.after_polls => {
                status.conditions.push(outcome);
                match outcome {
                    JobConditionType::Complete => status.succeeded = 1,
                    JobConditionType::Failed => status.failed = 1,
                    JobConditionType::Suspended => {}
                }
            }
            _ => status.active = 1,
        }
        Ok(Some(status))
    }

    async fn delete_job(&self, namespace: &str, name: &str) -> ClusterResult<bool> {
        let mut inner = self.inner.lock().await;
        match inner.jobs.remove(&key(namespace, name)) {
            Some(job) => {
                inner.pod_logs.remove(&job.pod);
                inner.held_pods.remove(&job.pod);
                inner.deleted.push(name.to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_pods(
        &self,
        namespace: &str,
        selector: &PodSelector,
    ) -> ClusterResult<Vec<PodInfo>> {
        let mut inner = self.inner.lock().await;
        let clock = inner.clock;
        match selector {
            PodSelector::Job(name) => {
                let Some(job) = inner.jobs.get_mut(&key(namespace, name)) else {
                    return Ok(Vec::new());
                };
                job.lists += 1;
                let terminal = job.script.outcome.is_some() && job.polls > job.script.after_polls;
                let phase = match (terminal, job.script.outcome) {
                    _ if job.lists <= job.script.pending_lists => PodPhase::Pending,
                    (true, Some(JobConditionType::Failed)) => PodPhase::Failed,
                    (true, _) => PodPhase::Succeeded,
                    (false, _) => PodPhase::Running,
                };
                Ok(vec![PodInfo {
                    name: job.pod.clone(),
                    phase,
                    node_name: "memory".to_string(),
                    containers: vec![job.spec.name.clone()],
                    container_statuses: vec![ContainerStatus {
                        name: job.spec.name.clone(),
                        state: ContainerState::Running,
                        ready: true,
                        restart_count: 0,
                    }],
                    created_at: clock,
                }])
            }
            PodSelector::Workload { kind, name } => Ok(inner
                .workload_pods
                .get(&(namespace.to_string(), *kind, name.clone()))
                .cloned()
                .unwrap_or_default()),
        }
    }

    async fn stream_logs(
        &self,
        _namespace: &str,
        pod: &str,
        _options: &LogOptions,
    ) -> ClusterResult<LogStream> {
        let mut inner = self.inner.lock().await;
        inner.log_requests += 1;
        let logs = inner
            .pod_logs
            .get(pod)
            .cloned()
            .ok_or_else(|| ClusterError::NotFound(format!("pod {pod}")))?;
        if !inner.held_pods.contains(pod) {
            return Ok(Box::pin(Cursor::new(logs.into_bytes())));
        }
        let (mut writer, reader) = tokio::io::duplex(logs.len().max(64));
        writer
            .write_all(logs.as_bytes())
            .await
            .map_err(|e| ClusterError::Stream(e.to_string()))?;
        inner.held_writers.push(writer);
        Ok(Box::pin(reader))
    }

    async fn get_workload(
        &self,
        namespace: &str,
        kind: WorkloadKind,
        name: &str,
    ) -> ClusterResult<Option<WorkloadState>> {
        Ok(self
            .inner
            .lock()
            .await
            .workloads
            .get(&(namespace.to_string(), kind, name.to_string()))
            .map(|w| w.state.clone()))
    }

    async fn list_workloads(
        &self,
        namespace: &str,
        kind: WorkloadKind,
        labels: &BTreeMap<String, String>,
    ) -> ClusterResult<Vec<String>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .workloads
            .iter()
            .filter(|((ns, k, _), w)| {
                ns == namespace
                    && *k == kind
                    && labels.iter().all(|(lk, lv)| w.labels.get(lk) == Some(lv))
            })
            .map(|((_, _, name), _)| name.clone())
            .collect())
    }

    async fn scale_workload(
        &self,
        namespace: &str,
        kind: WorkloadKind,
        name: &str,
        replicas: i32,
    ) -> ClusterResult<()> {
        let mut inner = self.inner.lock().await;
        let workload = inner
            .workloads
            .get_mut(&(namespace.to_string(), kind, name.to_string()))
            .ok_or_else(|| ClusterError::NotFound(format!("{kind} {namespace}/{name}")))?;
        match &mut workload.state {
            WorkloadState::Deployment(d) => d.replicas = Some(replicas),
            WorkloadState::StatefulSet(s) => s.replicas = Some(replicas),
            _ => {
                return Err(ClusterError::Backend(format!("{kind} cannot be scaled")));
            }
        }
        Ok(())
    }

    async fn restart_workload(
        &self,
        namespace: &str,
        kind: WorkloadKind,
        name: &str,
    ) -> ClusterResult<()> {
        let mut inner = self.inner.lock().await;
        if !inner
            .workloads
            .contains_key(&(namespace.to_string(), kind, name.to_string()))
        {
            return Err(ClusterError::NotFound(format!("{kind} {namespace}/{name}")));
        }
        inner.restarts.push(format!("{kind}/{name}"));
        Ok(())
    }

    async fn delete_workload(
        &self,
        namespace: &str,
        kind: WorkloadKind,
        name: &str,
    ) -> ClusterResult<bool> {
        let mut inner = self.inner.lock().await;
        let k = (namespace.to_string(), kind, name.to_string());
        inner.workload_pods.remove(&k);
        Ok(inner.workloads.remove(&k).is_some())
    }
}
