//! FlavorManager — HA sizing profiles.

use kb_cluster::ResourceClient;
use kb_core::Flavor;
use tracing::info;

use crate::error::{EngineError, EngineResult};

#[derive(Clone)]
pub struct FlavorManager {
    client: ResourceClient,
    namespace: String,
}

impl FlavorManager {
    pub fn new(client: ResourceClient, namespace: &str) -> Self {
        Self {
            client,
            namespace: namespace.to_string(),
        }
    }

    /// Store `flavor` unless one with the same name exists. Returns whether
    /// it was created.
    pub async fn create_if_absent(&self, flavor: &Flavor) -> EngineResult<bool> {
        if flavor.name.trim().is_empty() {
            return Err(EngineError::Config("flavor name must not be empty".to_string()));
        }
        let created = self.client.create_if_absent(&self.namespace, flavor).await?;
        if created {
            info!(flavor = %flavor.name, "flavor created");
        }
        Ok(created)
    }

    pub async fn get(&self, name: &str) -> EngineResult<Flavor> {
        match self.client.get::<Flavor>(&self.namespace, name).await? {
            Some(record) => Ok(record.value),
            None => Err(EngineError::NotFound(format!("flavor '{name}'"))),
        }
    }

    pub async fn list(&self) -> EngineResult<Vec<Flavor>> {
        Ok(self.client.list(&self.namespace).await?)
    }

    /// Create the `single-node` flavor if it is missing.
    pub async fn bootstrap_default_flavor(&self) -> EngineResult<bool> {
        self.create_if_absent(&Flavor::single_node()).await
    }
}
