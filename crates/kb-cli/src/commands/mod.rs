pub mod bundle;
pub mod config;
pub mod flavor;
pub mod manifest;
pub mod register;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context as _;
use kb_bundle::{MultiSource, Source, new_source};
use kb_cluster::ResourceClient;
use kb_core::KbConfig;
use kb_engine::EngineConfig;
use kb_state::StateStore;
use tracing::debug;

/// Loaded configuration plus a client over the local state store.
pub struct Context {
    pub config: KbConfig,
    pub namespace: String,
    pub client: ResourceClient,
}

impl Context {
    pub fn open(config_path: &Path, namespace: Option<String>) -> anyhow::Result<Self> {
        let config = KbConfig::load_or_default(config_path)
            .with_context(|| format!("reading {}", config_path.display()))?;
        if let Some(parent) = config.state_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let store = StateStore::open(&config.state_path)
            .with_context(|| format!("opening state store {}", config.state_path.display()))?;
        let namespace = namespace.unwrap_or_else(|| config.namespace.clone());
        debug!(namespace = %namespace, state = %config.state_path.display(), "context ready");
        Ok(Self {
            client: ResourceClient::new(Arc::new(store)),
            namespace,
            config,
        })
    }

    pub fn engine_config(&self) -> EngineConfig {
        let mut engine = EngineConfig::from(&self.config);
        engine.default_namespace = self.namespace.clone();
        engine
    }

    /// The `[[sources]]` from kb.toml, tried in order.
    pub fn configured_sources(&self) -> anyhow::Result<MultiSource> {
        let mut sources: Vec<Box<dyn Source>> = Vec::new();
        for entry in &self.config.sources {
            sources.push(new_source(&entry.to_spec(), &entry.section, &entry.release)?);
        }
        if sources.is_empty() {
            anyhow::bail!("no bundle sources configured; pass --source-dir or add [[sources]] to kb.toml");
        }
        Ok(MultiSource::new(sources))
    }
}
