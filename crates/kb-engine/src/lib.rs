//! kube-bundler orchestration engine — register, install, deploy.
//!
//! Managers are cheap to clone and share a [`ResourceClient`] over the
//! injected resource store plus an `Arc<dyn ClusterRuntime>`.
//!
//! # Architecture
//!
//! ```text
//! ManifestManager ─┬─► RegisterManager ──► resolver
//!                  ├─► InstallManager ───► admission
//!                  └─► DeployManager ──┬─► ParameterManager ──► SecretResolver
//!                                      └─► RolloutStatusManager ──► kb-rollout
//! ```
//!
//! # Components
//!
//! - **`resolver`** — Layered topological sort over `{id, deps}` entries
//! - **`register`** — Persist applications from bundle archives in dependency order
//! - **`install`** — Create or reuse install records
//! - **`parameter`** / **`secret`** — Parameter merging and lazily generated secrets
//! - **`deploy`** — The execution unit state machine
//! - **`rollout`** — Wait on an install's declared workloads
//! - **`manifest`** — Suffix-aware deploy plans and layered execution
//! - **`config_manager`** / **`flavor`** — Install configuration edits and HA profiles
//!
//! [`ResourceClient`]: kb_cluster::ResourceClient

pub mod admission;
pub mod config;
pub mod config_manager;
pub mod deploy;
pub mod error;
pub mod flavor;
pub mod install;
pub mod manifest;
pub mod parameter;
pub mod register;
pub mod resolver;
pub mod rollout;
pub mod secret;
pub mod sink;

pub use config::EngineConfig;
pub use config_manager::{ConfigManager, InstallDescription};
pub use deploy::{DeployManager, DeployOpts};
pub use error::{EngineError, EngineResult};
pub use flavor::FlavorManager;
pub use install::{InstallManager, InstallRequest};
pub use manifest::{DeployPlan, ManifestManager, PlannedInstall};
pub use parameter::{ParameterDesc, ParameterManager};
pub use register::RegisterManager;
pub use resolver::{Entry, layered_topological_sort};
pub use rollout::RolloutStatusManager;
pub use secret::SecretResolver;
pub use sink::{BufferSink, LogSink, StdoutSink};
