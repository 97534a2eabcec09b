//! InstallManager — creates and reuses install records.
//!
//! Re-installing under a name that already exists keeps the stored
//! parameter overrides and discards the ones passed in, so user edits made
//! with `config set` survive repeated manifest installs.

use std::sync::Arc;

use kb_cluster::{ClusterRuntime, ResourceClient};
use kb_core::{Flavor, Install, InstallSpec, ParameterSpec, Requirement, naming};
use tracing::{info, warn};

use crate::admission::verify_node_requirements;
use crate::error::{EngineError, EngineResult, ErrorContext};

/// Everything needed to create an install.
#[derive(Debug, Clone, Default)]
pub struct InstallRequest {
    pub application: String,
    pub version: String,
    /// Overrides the application name as the install's base name.
    pub name: Option<String>,
    pub namespace: String,
    pub suffix: String,
    pub flavor: String,
    pub docker_registry: String,
    pub parameters: Vec<ParameterSpec>,
    /// Requirements already resolved to provider installs. Replaced on
    /// every install, unlike parameters.
    pub requires: Option<Vec<Requirement>>,
    /// Continue when the cluster has fewer nodes than the flavor asks for.
    pub force: bool,
}

impl InstallRequest {
    pub fn install_name(&self) -> String {
        naming::install_name(&self.application, self.name.as_deref(), &self.suffix)
    }
}

#[derive(Clone)]
pub struct InstallManager {
    client: ResourceClient,
    runtime: Arc<dyn ClusterRuntime>,
    /// Namespace flavors are stored in.
    flavor_namespace: String,
}

impl InstallManager {
    pub fn new(
        client: ResourceClient,
        runtime: Arc<dyn ClusterRuntime>,
        flavor_namespace: &str,
    ) -> Self {
        Self {
            client,
            runtime,
            flavor_namespace: flavor_namespace.to_string(),
        }
    }

    pub async fn install(&self, request: &InstallRequest) -> EngineResult<Install> {
        match self.check_nodes(&request.flavor).await {
            Err(e) if request.force && e.is_admission() => {
                warn!(flavor = %request.flavor, error = %e, "forcing installation with insufficient nodes for flavor");
            }
            Err(e) => return Err(e).with_context(|| "insufficient nodes for install".to_string()),
            Ok(()) => {}
        }

        let name = request.install_name();
        let existing = self
            .client
            .get::<Install>(&request.namespace, &name)
            .await
            .with_context(|| format!("couldn't look up install '{name}'"))?;

        let mut install = Install {
            name: name.clone(),
            namespace: request.namespace.clone(),
            spec: InstallSpec {
                application: request.application.clone(),
                version: request.version.clone(),
                suffix: request.suffix.clone(),
                flavor: request.flavor.clone(),
                docker_registry: request.docker_registry.clone(),
                parameters: request.parameters.clone(),
                requires: request.requires.clone(),
                ..Default::default()
            },
        };

        match existing {
            Some(current) => {
                info!(install = %name, namespace = %request.namespace, "found install, preserving existing parameters");
                install.spec.parameters = current.value.spec.parameters;
                install.spec.secrets = current.value.spec.secrets;
                self.client
                    .patch(&request.namespace, &install, current.resource_version)
                    .await
                    .with_context(|| format!("couldn't update install '{name}'"))?;
            }
            None => {
                let created = self
                    .client
                    .create_if_absent(&request.namespace, &install)
                    .await
                    .with_context(|| format!("couldn't create install '{name}'"))?;
                if !created {
                    return Err(EngineError::Conflict(format!(
                        "install '{name}' was created concurrently"
                    )));
                }
                info!(install = %name, application = %request.application, version = %request.version, "install created");
            }
        }

        Ok(install)
    }

    pub async fn get(&self, namespace: &str, name: &str) -> EngineResult<Install> {
        Ok(self.client.require::<Install>(namespace, name).await?.value)
    }

    pub async fn list(&self, namespace: &str) -> EngineResult<Vec<Install>> {
        Ok(self.client.list(namespace).await?)
    }

    async fn check_nodes(&self, flavor_name: &str) -> EngineResult<()> {
        let flavor = self
            .client
            .require::<Flavor>(&self.flavor_namespace, flavor_name)
            .await
            .with_context(|| format!("couldn't get flavor '{flavor_name}'"))?;
        verify_node_requirements(self.runtime.as_ref(), &flavor.value).await
    }
}
