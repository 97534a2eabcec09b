//! RolloutStatusManager — waits for an install's declared workloads.

use std::sync::Arc;
use std::time::Duration;

use kb_cluster::{ClusterRuntime, ResourceClient, WorkloadKind};
use kb_core::{Application, Install, naming};
use kb_rollout::{DeployableResource, ResourceReport, RolloutError};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult, ErrorContext};
use crate::parameter::ParameterManager;
use crate::secret::SecretResolver;

/// Parameter that moves an install's workloads to another namespace.
const NAMESPACE_PARAMETER: &str = "namespace";

#[derive(Clone)]
pub struct RolloutStatusManager {
    client: ResourceClient,
    runtime: Arc<dyn ClusterRuntime>,
    secrets: SecretResolver,
    poll_interval: Duration,
}

impl RolloutStatusManager {
    pub fn new(
        client: ResourceClient,
        runtime: Arc<dyn ClusterRuntime>,
        config: &EngineConfig,
    ) -> Self {
        let secrets = SecretResolver::new(client.clone(), &config.default_namespace);
        Self {
            client,
            runtime,
            secrets,
            poll_interval: config.rollout_poll_interval,
        }
    }

    /// Wait for every declared resource in turn. The first failure stops the
    /// remaining waits.
    pub async fn wait(&self, namespace: &str, install: &str, timeout: Duration) -> EngineResult<()> {
        let deadline = Instant::now() + timeout;
        for resource in self.resources(namespace, install).await? {
            if resource.kind() == WorkloadKind::Service {
                debug!(name = %resource.name(), "skipping service rollout");
                continue;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            resource
                .wait(remaining)
                .await
                .map_err(|e| rollout_error(&resource, e))?;
        }
        info!(install, "rollout complete");
        Ok(())
    }

    /// Replica summary per declared resource.
    pub async fn status(&self, namespace: &str, install: &str) -> EngineResult<Vec<ResourceReport>> {
        let mut reports = Vec::new();
        for resource in self.resources(namespace, install).await? {
            let report = resource
                .status()
                .await
                .map_err(|e| rollout_error(&resource, e))?;
            reports.push(report);
        }
        Ok(reports)
    }

    /// Handles for every resource the install's application declares.
    pub async fn resources(
        &self,
        namespace: &str,
        install_name: &str,
    ) -> EngineResult<Vec<DeployableResource>> {
        let install = self
            .client
            .require::<Install>(namespace, install_name)
            .await
            .with_context(|| format!("couldn't get install '{install_name}'"))?
            .value;
        let record = install.application_record_name();
        let app = self
            .client
            .require::<Application>(namespace, &record)
            .await
            .with_context(|| format!("couldn't get application '{record}'"))?
            .value;

        let merged = ParameterManager::new(
            self.secrets.clone(),
            &install.name,
            &app.parameter_definitions,
            &install.spec.parameters,
        )
        .get_merged_map()
        .await?;
        let target_namespace = merged
            .get(NAMESPACE_PARAMETER)
            .filter(|ns| !ns.is_empty())
            .map(String::as_str)
            .unwrap_or(namespace);

        app.resources
            .iter()
            .map(|declared| {
                let kind: WorkloadKind = declared.kind.parse().map_err(|_| {
                    EngineError::Config(format!(
                        "unrecognized resource rollout type: '{}'",
                        declared.kind
                    ))
                })?;
                let name = naming::suffixed(&declared.name, &install.spec.suffix);
                Ok(DeployableResource::new(
                    self.runtime.clone(),
                    kind,
                    target_namespace,
                    &name,
                    &declared.category,
                )
                .with_poll_interval(self.poll_interval))
            })
            .collect()
    }
}

fn rollout_error(resource: &DeployableResource, error: RolloutError) -> EngineError {
    match error {
        RolloutError::Timeout {
            timeout,
            last_status,
            ..
        } => EngineError::Timeout {
            target: format!(
                "{} resource {} '{}'",
                resource.category(),
                resource.kind(),
                resource.name()
            ),
            timeout,
            detail: last_status,
        },
        other => EngineError::Rollout {
            category: resource.category().to_string(),
            source: other,
        },
    }
}
