//! Shared fixtures: an in-memory store, a scripted runtime, a directory of
//! bundles and a captured log sink.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use kb_bundle::{BundleFile, BundleRef, DirectorySource, Source};
use kb_cluster::{
    ClusterRuntime, DeploymentState, MemoryRuntime, ResourceClient, WorkloadKind, WorkloadState,
};
use kb_core::{
    Application, Flavor, Install, InstallSpec, Manifest, ManifestBundle, ManifestSource,
    ManifestSpec, ParameterSpec, Requirement, SourceSpec, WorkloadResource,
};
use kb_engine::{BufferSink, DeployManager, EngineConfig, FlavorManager, ManifestManager};
use kb_state::StateStore;
use tempfile::TempDir;

pub const NS: &str = "default";
pub const SOURCE: &str = "local";

pub struct Harness {
    pub client: ResourceClient,
    pub runtime: Arc<MemoryRuntime>,
    pub sink: Arc<BufferSink>,
    pub config: EngineConfig,
    pub bundles: TempDir,
}

impl Harness {
    /// One roomy node, the default flavor and a directory source record.
    pub async fn new() -> Self {
        let store = StateStore::open_in_memory().unwrap();
        let client = ResourceClient::new(Arc::new(store));
        let runtime = Arc::new(MemoryRuntime::new());
        runtime.add_node("node-1", 8000, 32u64 << 30).await;

        let config = EngineConfig {
            default_namespace: NS.to_string(),
            poll_interval: Duration::from_millis(10),
            grace_period: Duration::from_millis(50),
            rollout_poll_interval: Duration::from_millis(10),
            parallelism: 1,
        };
        FlavorManager::new(client.clone(), NS)
            .bootstrap_default_flavor()
            .await
            .unwrap();

        let bundles = tempfile::tempdir().unwrap();
        let source = SourceSpec {
            name: SOURCE.to_string(),
            kind: "directory".to_string(),
            path: bundles.path().to_string_lossy().into_owned(),
            options: BTreeMap::new(),
        };
        client.create_if_absent(NS, &source).await.unwrap();

        Self {
            client,
            runtime,
            sink: Arc::new(BufferSink::new()),
            config,
            bundles,
        }
    }

    pub fn runtime(&self) -> Arc<dyn ClusterRuntime> {
        self.runtime.clone()
    }

    pub fn source(&self) -> DirectorySource {
        DirectorySource::new(self.bundles.path())
    }

    pub fn deployer(&self) -> DeployManager {
        DeployManager::new(self.client.clone(), self.runtime(), &self.config)
            .with_sink(self.sink.clone())
    }

    pub fn manifests(&self) -> ManifestManager {
        ManifestManager::new(
            self.client.clone(),
            self.runtime(),
            self.deployer(),
            &self.config,
        )
    }

    /// Build a bundle for `app` and store it in the bundle directory.
    pub async fn publish(&self, app: &Application) -> BundleRef {
        let bundle = BundleFile::build(app, None).unwrap();
        self.source().put(&bundle).await.unwrap();
        bundle.reference().clone()
    }

    /// Store an application record directly, bypassing registration.
    pub async fn register(&self, app: &Application) {
        self.client.create_if_absent(NS, app).await.unwrap();
    }

    pub async fn install(&self, app: &Application, parameters: Vec<ParameterSpec>) -> Install {
        let install = Install {
            name: app.name.clone(),
            namespace: NS.to_string(),
            spec: InstallSpec {
                application: app.name.clone(),
                version: app.version.clone(),
                flavor: Flavor::single_node().name,
                parameters,
                ..Default::default()
            },
        };
        self.client.create_if_absent(NS, &install).await.unwrap();
        install
    }

    pub async fn store_manifest(&self, bundles: Vec<ManifestBundle>) -> Manifest {
        let manifest = Manifest {
            name: "stack".to_string(),
            spec: ManifestSpec {
                flavor: Flavor::single_node().name,
                sources: vec![ManifestSource {
                    name: SOURCE.to_string(),
                    ..Default::default()
                }],
                bundles,
                ..Default::default()
            },
        };
        self.client.apply(NS, &manifest).await.unwrap();
        manifest
    }

    pub async fn set_deployment(&self, name: &str, replicas: i32, ready: i32) {
        self.runtime
            .set_workload(
                NS,
                WorkloadKind::Deployment,
                name,
                deployment(replicas, ready),
                BTreeMap::new(),
            )
            .await;
    }

    pub async fn install_names(&self) -> Vec<String> {
        let installs: Vec<Install> = self.client.list(NS).await.unwrap();
        let mut names: Vec<String> = installs.into_iter().map(|i| i.name).collect();
        names.sort();
        names
    }
}

pub fn application(name: &str, requires: Vec<Requirement>) -> Application {
    Application {
        name: name.to_string(),
        version: "1.0.0".to_string(),
        deploy_image: format!("registry.example.com/{name}/deploy:1.0.0"),
        requires,
        ..Default::default()
    }
}

pub fn requirement(name: &str, suffix: &str) -> Requirement {
    Requirement {
        name: name.to_string(),
        suffix: suffix.to_string(),
        parameters: Vec::new(),
    }
}

pub fn manifest_bundle(name: &str) -> ManifestBundle {
    ManifestBundle {
        name: name.to_string(),
        version: "1.0.0".to_string(),
        ..Default::default()
    }
}

pub fn declared(name: &str, category: &str, kind: &str) -> WorkloadResource {
    WorkloadResource {
        name: name.to_string(),
        category: category.to_string(),
        kind: kind.to_string(),
    }
}

pub fn deployment(replicas: i32, ready: i32) -> WorkloadState {
    WorkloadState::Deployment(DeploymentState {
        generation: 1,
        observed_generation: 1,
        replicas: Some(replicas),
        status_replicas: replicas,
        updated_replicas: replicas,
        ready_replicas: ready,
        available_replicas: replicas,
        progress_deadline_exceeded: false,
    })
}
