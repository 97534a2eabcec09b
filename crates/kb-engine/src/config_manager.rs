//! ConfigManager — read and edit an install's parameter overrides.

use std::collections::BTreeMap;

use kb_cluster::{ResourceClient, Versioned};
use kb_core::{Application, Install, ParameterSpec};
use serde::Serialize;
use tracing::info;

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult, ErrorContext};
use crate::parameter::{ParameterDesc, ParameterManager};
use crate::secret::SecretResolver;

/// Read-only summary of an install.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallDescription {
    pub name: String,
    pub application: String,
    pub version: String,
    pub parameters: BTreeMap<String, ParameterDesc>,
}

#[derive(Clone)]
pub struct ConfigManager {
    client: ResourceClient,
    secrets: SecretResolver,
}

impl ConfigManager {
    pub fn new(client: ResourceClient, config: &EngineConfig) -> Self {
        let secrets = SecretResolver::new(client.clone(), &config.default_namespace);
        Self { client, secrets }
    }

    pub async fn list(
        &self,
        namespace: &str,
        install: &str,
    ) -> EngineResult<BTreeMap<String, String>> {
        let (install, app) = self.load(namespace, install).await?;
        self.parameter_manager(&install.value, &app)
            .get_merged_map()
            .await
    }

    pub async fn get(&self, namespace: &str, install: &str, key: &str) -> EngineResult<String> {
        let merged = self.list(namespace, install).await?;
        merged
            .get(key)
            .cloned()
            .ok_or_else(|| unknown_key(key, install))
    }

    /// Replace or append the override for `key`. Fails with a conflict if the
    /// install changed since it was read.
    pub async fn set(
        &self,
        namespace: &str,
        install_name: &str,
        key: &str,
        value: &str,
    ) -> EngineResult<()> {
        let (mut install, app) = self.load(namespace, install_name).await?;
        if !app.parameter_definitions.iter().any(|d| d.name == key) {
            return Err(unknown_key(key, install_name));
        }

        let parameters = &mut install.value.spec.parameters;
        match parameters.iter_mut().find(|p| p.name == key) {
            Some(existing) => *existing = ParameterSpec::new(key, value),
            None => parameters.push(ParameterSpec::new(key, value)),
        }

        self.write(namespace, &install).await?;
        info!(install = %install_name, key, "config set");
        Ok(())
    }

    /// Drop the override for `key`. A generated secret stored under the
    /// install's key is kept as an explicit override instead.
    pub async fn remove(&self, namespace: &str, install_name: &str, key: &str) -> EngineResult<()> {
        let (mut install, app) = self.load(namespace, install_name).await?;
        if !app.parameter_definitions.iter().any(|d| d.name == key) {
            return Err(unknown_key(key, install_name));
        }

        let parameters = &mut install.value.spec.parameters;
        parameters.retain(|p| p.name != key);
        if let Some(secret) = self.secrets.lookup(install_name, key).await? {
            parameters.push(ParameterSpec::new(key, secret));
        }

        self.write(namespace, &install).await?;
        info!(install = %install_name, key, "config removed");
        Ok(())
    }

    /// Describe one install, or every install in the namespace.
    pub async fn describe(
        &self,
        namespace: &str,
        install: Option<&str>,
    ) -> EngineResult<Vec<InstallDescription>> {
        let installs = match install {
            Some(name) => vec![self.load_install(namespace, name).await?.value],
            None => self.client.list::<Install>(namespace).await?,
        };

        let mut descriptions = Vec::with_capacity(installs.len());
        for install in installs {
            let app = self.load_application(namespace, &install).await?;
            descriptions.push(InstallDescription {
                name: install.name.clone(),
                application: install.spec.application.clone(),
                version: install.spec.version.clone(),
                parameters: self.parameter_manager(&install, &app).get_parameter_desc(),
            });
        }
        Ok(descriptions)
    }

    fn parameter_manager(&self, install: &Install, app: &Application) -> ParameterManager {
        ParameterManager::new(
            self.secrets.clone(),
            &install.name,
            &app.parameter_definitions,
            &install.spec.parameters,
        )
    }

    async fn load(
        &self,
        namespace: &str,
        install: &str,
    ) -> EngineResult<(Versioned<Install>, Application)> {
        let install = self.load_install(namespace, install).await?;
        let app = self.load_application(namespace, &install.value).await?;
        Ok((install, app))
    }

    async fn load_install(&self, namespace: &str, name: &str) -> EngineResult<Versioned<Install>> {
        self.client
            .require::<Install>(namespace, name)
            .await
            .with_context(|| format!("couldn't get install '{name}'"))
    }

    async fn load_application(&self, namespace: &str, install: &Install) -> EngineResult<Application> {
        let record = install.application_record_name();
        Ok(self
            .client
            .require::<Application>(namespace, &record)
            .await
            .with_context(|| format!("couldn't get application '{record}'"))?
            .value)
    }

    async fn write(&self, namespace: &str, install: &Versioned<Install>) -> EngineResult<()> {
        self.client
            .patch(namespace, &install.value, install.resource_version)
            .await
            .with_context(|| format!("couldn't update install '{}'", install.value.name))?;
        Ok(())
    }
}

fn unknown_key(key: &str, install: &str) -> EngineError {
    EngineError::Config(format!("unknown config '{key}' for install '{install}'"))
}
