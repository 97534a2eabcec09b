//! DeployManager — runs one action against one install.
//!
//! # Phases
//!
//! ```text
//! Fetching → ConfiguringInputs → Running → Polling → RolledOut
//!                                              ↘ Failed | TimedOut
//! ```
//!
//! Fetching loads the install, its flavor and its application and validates
//! parameters. ConfiguringInputs writes the install's config map (four JSON
//! documents) and mounts each upstream dependency's config map beside it.
//! Running replaces any previous execution unit for the same action.
//! Polling drains the unit's log stream, then polls its conditions until a
//! terminal one appears or the deadline passes. Every action except delete
//! finishes with a rollout wait.
//!
//! A failed or timed-out unit always has its output written to the sink
//! once. Nothing is cleaned up on failure so the unit can be inspected.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use kb_cluster::{
    ClusterError, ClusterRuntime, ConfigMount, JobConditionType, JobSpec, LogOptions, LogStream,
    PodPhase, PodSelector, ResourceClient, Versioned,
};
use kb_core::{Application, ConfigMap, Flavor, Install, naming};
use tokio::io::AsyncReadExt;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult, ErrorContext};
use crate::parameter::ParameterManager;
use crate::rollout::RolloutStatusManager;
use crate::secret::SecretResolver;
use crate::sink::{LogSink, StdoutSink};

const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";
const LABEL_INSTALL: &str = "kb.io/install";
const LABEL_ACTION: &str = "kb.io/action";

/// Options for a single deploy run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployOpts {
    pub action: String,
    pub timeout: Duration,
    /// Echo the execution unit's output while it runs.
    pub show_logs: bool,
}

impl DeployOpts {
    pub fn new(action: &str, timeout: Duration) -> Self {
        Self {
            action: action.to_string(),
            timeout,
            show_logs: false,
        }
    }

    pub fn with_logs(mut self, show_logs: bool) -> Self {
        self.show_logs = show_logs;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeployPhase {
    Fetching,
    ConfiguringInputs,
    Running,
    Polling,
    RolledOut,
}

impl fmt::Display for DeployPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DeployPhase::Fetching => "fetching",
            DeployPhase::ConfiguringInputs => "configuring-inputs",
            DeployPhase::Running => "running",
            DeployPhase::Polling => "polling",
            DeployPhase::RolledOut => "rolled-out",
        })
    }
}

/// Actions after which the install's workloads must roll out.
pub fn waits_for_rollout(action: &str) -> bool {
    action != naming::ACTION_DELETE
}

#[derive(Clone)]
pub struct DeployManager {
    client: ResourceClient,
    runtime: Arc<dyn ClusterRuntime>,
    secrets: SecretResolver,
    rollout: RolloutStatusManager,
    config: EngineConfig,
    sink: Arc<dyn LogSink>,
}

impl DeployManager {
    pub fn new(
        client: ResourceClient,
        runtime: Arc<dyn ClusterRuntime>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            secrets: SecretResolver::new(client.clone(), &config.default_namespace),
            rollout: RolloutStatusManager::new(client.clone(), runtime.clone(), config),
            client,
            runtime,
            config: config.clone(),
            sink: Arc::new(StdoutSink),
        }
    }

    /// Send execution unit output somewhere other than stdout.
    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn rollout(&self) -> &RolloutStatusManager {
        &self.rollout
    }

    pub async fn deploy(&self, namespace: &str, name: &str, opts: &DeployOpts) -> EngineResult<()> {
        self.run(namespace, name, opts)
            .await
            .with_context(|| format!("couldn't run '{}' for install '{name}'", opts.action))
    }

    async fn run(&self, namespace: &str, name: &str, opts: &DeployOpts) -> EngineResult<()> {
        let action = opts.action.as_str();
        debug!(install = %name, action, phase = %DeployPhase::Fetching);

        let mut install = self
            .client
            .require::<Install>(namespace, name)
            .await
            .with_context(|| format!("couldn't get install '{name}'"))?;
        let flavor_name = install.value.spec.flavor.clone();
        let flavor = self
            .client
            .require::<Flavor>(&self.config.default_namespace, &flavor_name)
            .await
            .with_context(|| format!("couldn't get flavor '{flavor_name}'"))?
            .value;
        let record = install.value.application_record_name();
        let app = self
            .client
            .require::<Application>(namespace, &record)
            .await
            .with_context(|| format!("couldn't get application '{record}'"))?
            .value;

        let parameters = ParameterManager::new(
            self.secrets.clone(),
            name,
            &app.parameter_definitions,
            &install.value.spec.parameters,
        );
        parameters.validate()?;

        let image = self.record_deploy_image(namespace, &mut install, &app).await?;

        debug!(install = %name, action, phase = %DeployPhase::ConfiguringInputs);
        let merged = parameters.get_merged_map().await?;
        let requires = install.value.spec.effective_requires(&app);
        let config_map = ConfigMap {
            name: naming::config_map_name(name),
            namespace: namespace.to_string(),
            data: BTreeMap::from([
                (naming::PARAMETERS_FILE.to_string(), to_json(&merged)?),
                (naming::INSTALL_FILE.to_string(), to_json(&install.value.spec)?),
                (naming::REQUIRES_FILE.to_string(), to_json(&requires)?),
                (naming::FLAVOR_FILE.to_string(), to_json(&flavor)?),
            ]),
        };
        self.client
            .apply(namespace, &config_map)
            .await
            .with_context(|| format!("couldn't write config map '{}'", config_map.name))?;

        let mut mounts = vec![ConfigMount {
            config_map: config_map.name.clone(),
            mount_path: naming::CONFIG_MOUNT_PATH.to_string(),
        }];
        for requirement in requires {
            let dependency = requirement.install_name();
            mounts.push(ConfigMount {
                config_map: naming::config_map_name(&dependency),
                mount_path: naming::input_mount_path(&dependency),
            });
        }

        let job_name = naming::job_name(name, action);
        if self.runtime.delete_job(namespace, &job_name).await? {
            debug!(job = %job_name, "removed previous execution unit");
        }

        debug!(install = %name, action, phase = %DeployPhase::Running);
        let job = JobSpec {
            name: job_name.clone(),
            namespace: namespace.to_string(),
            image,
            args: naming::action_args(action),
            mounts,
            active_deadline_secs: ceil_secs(opts.timeout + 2 * self.config.grace_period),
            termination_grace_secs: ceil_secs(self.config.grace_period),
            backoff_limit: 0,
            labels: BTreeMap::from([
                (LABEL_MANAGED_BY.to_string(), "kb".to_string()),
                (LABEL_INSTALL.to_string(), name.to_string()),
                (LABEL_ACTION.to_string(), naming::sanitize(action)),
            ]),
        };
        self.runtime
            .create_job(&job)
            .await
            .with_context(|| format!("couldn't create execution unit '{job_name}'"))?;
        info!(install = %name, action, job = %job_name, "execution unit started");

        debug!(install = %name, action, phase = %DeployPhase::Polling);
        self.poll(namespace, name, &job_name, opts).await?;
        info!(install = %name, action, "execution unit completed");

        if waits_for_rollout(action) {
            self.rollout.wait(namespace, name, opts.timeout).await?;
            info!(install = %name, action, phase = %DeployPhase::RolledOut);
        }
        Ok(())
    }

    /// Work out the image to run and record registry and image on the
    /// install when they change.
    async fn record_deploy_image(
        &self,
        namespace: &str,
        install: &mut Versioned<Install>,
        app: &Application,
    ) -> EngineResult<String> {
        let spec = &mut install.value.spec;
        let mut changed = false;

        let image = if spec.docker_registry.is_empty() {
            if !app.docker_registry.is_empty() {
                spec.docker_registry = app.docker_registry.clone();
                changed = true;
            }
            app.deploy_image.clone()
        } else {
            rewrite_registry(&app.deploy_image, &spec.docker_registry)?
        };

        if spec.deploy_image.is_empty() {
            spec.deploy_image = image.clone();
            changed = true;
        }

        if changed {
            let version = self
                .client
                .patch(namespace, &install.value, install.resource_version)
                .await
                .with_context(|| format!("couldn't update install '{}'", install.value.name))?;
            install.resource_version = version;
        }
        Ok(image)
    }

    async fn poll(
        &self,
        namespace: &str,
        install: &str,
        job_name: &str,
        opts: &DeployOpts,
    ) -> EngineResult<()> {
        let deadline = Instant::now() + opts.timeout;

        let streamed = tokio::time::timeout_at(
            deadline,
            self.drain_logs(namespace, job_name, opts.show_logs, deadline),
        )
        .await;
        let mut printed = false;
        match streamed {
            Ok(Ok(())) => printed = opts.show_logs,
            Ok(Err(e)) => warn!(job = %job_name, error = %e, "error streaming execution unit logs"),
            Err(_) => {
                // whatever arrived was already echoed
                printed = opts.show_logs;
                debug!(job = %job_name, "log stream still open at deadline");
            }
        }

        loop {
            let condition = self
                .runtime
                .get_job(namespace, job_name)
                .await?
                .and_then(|status| status.terminal_condition());
            match condition {
                Some(JobConditionType::Complete) => return Ok(()),
                Some(JobConditionType::Failed) => {
                    if !printed {
                        self.print_logs(namespace, job_name).await;
                    }
                    return Err(EngineError::DeployFailed {
                        install: install.to_string(),
                        action: opts.action.clone(),
                    });
                }
                _ => {}
            }

            let now = Instant::now();
            if now >= deadline {
                if !printed {
                    self.print_logs(namespace, job_name).await;
                }
                return Err(EngineError::Timeout {
                    target: format!("action '{}' of install '{install}'", opts.action),
                    timeout: opts.timeout,
                    detail: "execution unit reported no terminal condition".to_string(),
                });
            }
            tokio::time::sleep(self.config.poll_interval.min(deadline - now)).await;
        }
    }

    /// Read the unit's log stream to the end, echoing it when `show` is set.
    async fn drain_logs(
        &self,
        namespace: &str,
        job_name: &str,
        show: bool,
        deadline: Instant,
    ) -> EngineResult<()> {
        let mut stream = self.open_job_logs(namespace, job_name, deadline).await?;
        if show {
            self.copy_to_sink(&mut stream).await
        } else {
            tokio::io::copy(&mut stream, &mut tokio::io::sink())
                .await
                .map_err(|e| ClusterError::Stream(e.to_string()))?;
            Ok(())
        }
    }

    /// Best effort: write the unit's current output to the sink.
    async fn print_logs(&self, namespace: &str, job_name: &str) {
        let bound = 2 * self.config.grace_period;
        let deadline = Instant::now() + bound;
        let printed = tokio::time::timeout(bound, async {
            let mut stream = self.open_job_logs(namespace, job_name, deadline).await?;
            self.copy_to_sink(&mut stream).await
        })
        .await;
        match printed {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(job = %job_name, error = %e, "couldn't print execution unit logs"),
            Err(_) => warn!(job = %job_name, "timed out printing execution unit logs"),
        }
    }

    async fn copy_to_sink(&self, stream: &mut LogStream) -> EngineResult<()> {
        let mut buf = vec![0u8; 8192];
        loop {
            let n = stream
                .read(&mut buf)
                .await
                .map_err(|e| ClusterError::Stream(e.to_string()))?;
            if n == 0 {
                return Ok(());
            }
            self.sink.write(&buf[..n]);
        }
    }

    /// Follow the newest pod of an execution unit, waiting for it to leave
    /// the pending phase.
    async fn open_job_logs(
        &self,
        namespace: &str,
        job_name: &str,
        deadline: Instant,
    ) -> EngineResult<LogStream> {
        let started = Instant::now();
        loop {
            let pods = self
                .runtime
                .list_pods(namespace, &PodSelector::Job(job_name.to_string()))
                .await?;
            let newest = pods.into_iter().max_by_key(|p| p.created_at);
            if let Some(pod) = newest.filter(|p| p.phase != PodPhase::Pending) {
                let options = LogOptions {
                    container: pod.containers.first().cloned(),
                    follow: true,
                    tail_lines: None,
                };
                return Ok(self
                    .runtime
                    .stream_logs(namespace, &pod.name, &options)
                    .await?);
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(EngineError::Timeout {
                    target: format!("a running pod of execution unit '{job_name}'"),
                    timeout: deadline.saturating_duration_since(started),
                    detail: "pod is absent or still pending".to_string(),
                });
            }
            tokio::time::sleep(self.config.poll_interval.min(deadline - now)).await;
        }
    }

    /// Live, followed output of the newest pod of an install's execution
    /// unit. Callers must drain the stream.
    pub async fn get_logs(
        &self,
        namespace: &str,
        install: &str,
        action: &str,
        wait: Duration,
    ) -> EngineResult<LogStream> {
        let job_name = naming::job_name(install, action);
        self.open_job_logs(namespace, &job_name, Instant::now() + wait)
            .await
            .with_context(|| format!("couldn't get logs for install '{install}'"))
    }

    /// Remove both execution units and the install record.
    pub async fn delete(&self, namespace: &str, name: &str) -> EngineResult<()> {
        for action in [naming::ACTION_APPLY, naming::ACTION_SMOKETEST] {
            let job_name = naming::job_name(name, action);
            if self.runtime.delete_job(namespace, &job_name).await? {
                debug!(job = %job_name, "execution unit deleted");
            }
        }
        let removed = self
            .client
            .delete::<Install>(namespace, name)
            .await
            .with_context(|| format!("couldn't delete install '{name}'"))?;
        if removed {
            info!(install = %name, namespace, "install deleted");
        } else {
            debug!(install = %name, namespace, "install already gone");
        }
        Ok(())
    }

    pub async fn smoketest(
        &self,
        namespace: &str,
        name: &str,
        timeout: Duration,
        show_logs: bool,
    ) -> EngineResult<()> {
        let opts = DeployOpts::new(naming::ACTION_SMOKETEST, timeout).with_logs(show_logs);
        self.deploy(namespace, name, &opts).await
    }

    /// `apply outputs` followed by a smoketest with the same options.
    pub async fn deploy_smoketest(
        &self,
        namespace: &str,
        name: &str,
        timeout: Duration,
        show_logs: bool,
    ) -> EngineResult<()> {
        let opts = DeployOpts::new(naming::ACTION_APPLY_OUTPUTS, timeout).with_logs(show_logs);
        self.deploy(namespace, name, &opts).await?;
        self.smoketest(namespace, name, timeout, show_logs).await
    }
}

/// Move `image` to `registry`, keeping its repository path and tag.
pub fn rewrite_registry(image: &str, registry: &str) -> EngineResult<String> {
    let registry = registry.trim_end_matches('/');
    if !image.contains('/') {
        return Ok(format!("{registry}/{image}"));
    }
    let url = Url::parse(&format!("https://{image}"))
        .map_err(|e| EngineError::Config(format!("invalid deploy image '{image}': {e}")))?;
    let path = url.path().trim_start_matches('/');
    if path.is_empty() {
        return Err(EngineError::Config(format!(
            "deploy image '{image}' has no repository path"
        )));
    }
    Ok(format!("{registry}/{path}"))
}

fn to_json<T: serde::Serialize>(value: &T) -> EngineResult<String> {
    Ok(serde_json::to_string_pretty(value).map_err(ClusterError::from)?)
}

fn ceil_secs(duration: Duration) -> u64 {
    duration.as_secs() + u64::from(duration.subsec_nanos() > 0)
}
