//! Timing and concurrency knobs for the engine.

use std::time::Duration;

use kb_core::KbConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Namespace flavors and the global secret live in.
    pub default_namespace: String,
    /// Interval between execution unit status polls.
    pub poll_interval: Duration,
    /// Added twice to the caller's timeout for the execution unit deadline.
    pub grace_period: Duration,
    /// Interval between rollout predicate evaluations.
    pub rollout_poll_interval: Duration,
    /// Installs deployed at once within a dependency layer.
    pub parallelism: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_namespace: "default".to_string(),
            poll_interval: Duration::from_secs(1),
            grace_period: Duration::from_secs(1),
            rollout_poll_interval: kb_rollout::DEFAULT_POLL_INTERVAL,
            parallelism: 1,
        }
    }
}

impl From<&KbConfig> for EngineConfig {
    fn from(config: &KbConfig) -> Self {
        Self {
            default_namespace: config.namespace.clone(),
            poll_interval: config.deploy.poll_interval(),
            grace_period: config.deploy.grace_period(),
            rollout_poll_interval: config.rollout.poll_interval(),
            parallelism: config.deploy.parallelism.max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_from_kb_config() {
        let mut kb = KbConfig::default();
        kb.deploy.parallelism = 0;
        kb.deploy.poll_interval = 3;
        let config = EngineConfig::from(&kb);
        assert_eq!(config.parallelism, 1);
        assert_eq!(config.poll_interval, Duration::from_secs(3));
        assert_eq!(config.rollout_poll_interval, Duration::from_secs(5));
    }
}
