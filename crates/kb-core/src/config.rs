//! kb.toml configuration parser.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::SourceSpec;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KbConfig {
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,
    #[serde(default)]
    pub deploy: DeployConfig,
    #[serde(default)]
    pub rollout: RolloutConfig,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployConfig {
    /// Seconds an execution unit may run before the deploy times out.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// Seconds between job condition polls.
    #[serde(default = "default_deploy_poll")]
    pub poll_interval: u64,
    /// Seconds added to the execution unit's own deadline.
    #[serde(default = "default_grace")]
    pub grace_period: u64,
    #[serde(default)]
    pub show_logs: bool,
    /// Installs deployed concurrently within one dependency layer.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RolloutConfig {
    #[serde(default = "default_rollout_poll")]
    pub poll_interval: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub path: String,
    #[serde(default)]
    pub section: String,
    #[serde(default)]
    pub release: String,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

impl SourceConfig {
    pub fn to_spec(&self) -> SourceSpec {
        SourceSpec {
            name: self.name.clone(),
            kind: self.kind.clone(),
            path: self.path.clone(),
            options: self.options.clone(),
        }
    }
}

impl Default for KbConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            state_path: default_state_path(),
            deploy: DeployConfig::default(),
            rollout: RolloutConfig::default(),
            sources: Vec::new(),
        }
    }
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            poll_interval: default_deploy_poll(),
            grace_period: default_grace(),
            show_logs: false,
            parallelism: default_parallelism(),
        }
    }
}

impl Default for RolloutConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_rollout_poll(),
        }
    }
}

impl DeployConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period)
    }
}

impl RolloutConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }
}

impl KbConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: KbConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_state_path() -> PathBuf {
    PathBuf::from("kb-state.redb")
}

fn default_timeout() -> u64 {
    600
}

fn default_deploy_poll() -> u64 {
    1
}

fn default_grace() -> u64 {
    1
}

fn default_parallelism() -> usize {
    1
}

fn default_rollout_poll() -> u64 {
    5
}
