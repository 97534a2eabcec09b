//! kb-cluster — the orchestrated cluster as an injected capability.
//!
//! The engine never talks to a cluster API directly. It is handed two
//! trait objects:
//!
//! - **[`ResourceStore`]** — versioned JSON records (applications, installs,
//!   flavors, manifests, config maps, the global secret)
//! - **[`ClusterRuntime`]** — nodes, execution units, pods, log streams and
//!   workload objects
//!
//! `kb-state` provides an embedded [`ResourceStore`]. [`MemoryRuntime`] is an
//! in-process [`ClusterRuntime`] with scripted job outcomes.

pub mod error;
pub mod memory;
pub mod runtime;
pub mod store;
pub mod workload;

pub use error::{ClusterError, ClusterResult};
pub use memory::{JobScript, MemoryRuntime};
pub use runtime::{
    ClusterRuntime, ConfigMount, ContainerState, ContainerStatus, JobSpec, LogOptions, LogStream,
    NodeInfo, PodInfo, PodPhase, PodSelector,
};
pub use store::{ResourceClient, ResourceStore, StoredRecord, Versioned};
pub use workload::*;
