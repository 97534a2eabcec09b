//! kb-core — resource types and naming rules for kube-bundler.
//!
//! Applications, installs, flavors, manifests, sources and registries are
//! plain serde types shared by every other crate. [`naming`] holds the rules
//! that derive install, config map and execution unit names, and
//! [`config`] parses `kb.toml`.

pub mod config;
pub mod naming;
pub mod types;

pub use config::KbConfig;
pub use types::*;
