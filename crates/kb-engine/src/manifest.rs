//! ManifestManager — installs and deploys a whole manifest.
//!
//! A manifest names bundles; each bundle's application may be required by
//! others under several suffixes, and gets one install per suffix. The
//! resulting installs and their suffix-qualified requirements form the
//! [`DeployPlan`], whose layers drive install and deploy order.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use kb_bundle::{BundleRef, MultiSource, Source, new_source};
use kb_cluster::{ClusterRuntime, ResourceClient};
use kb_core::{
    Application, Flavor, Manifest, ManifestBundle, ParameterSpec, Registry, Requirement,
    SourceSpec, naming,
};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::admission::verify_resource_requirements;
use crate::config::EngineConfig;
use crate::deploy::{DeployManager, DeployOpts};
use crate::error::{EngineError, EngineResult, ErrorContext};
use crate::install::{InstallManager, InstallRequest};
use crate::parameter::merge_parameters;
use crate::register::RegisterManager;
use crate::resolver::{Entry, layered_topological_sort};

/// One install the manifest produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedInstall {
    pub install_name: String,
    pub application: String,
    pub version: String,
    pub suffix: String,
    /// The bundle's manifest parameters overlaid with parameters other
    /// bundles pass through their requirements.
    pub parameters: Vec<ParameterSpec>,
    /// Requirements with capability names replaced by the providing
    /// application, so `install_name()` is the install actually created.
    pub requires: Vec<Requirement>,
    /// Installs in this plan that must be deployed first.
    pub deps: Vec<String>,
}

/// Installs a manifest produces, in dependency layers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeployPlan {
    pub installs: BTreeMap<String, PlannedInstall>,
    pub layers: Vec<Vec<String>>,
}

impl DeployPlan {
    /// `applications` maps each manifest bundle name to its registered
    /// application.
    pub fn build(
        manifest: &Manifest,
        applications: &BTreeMap<String, Application>,
    ) -> EngineResult<Self> {
        let mut bundles: Vec<(&ManifestBundle, &Application)> = Vec::new();
        for bundle in &manifest.spec.bundles {
            let app = applications.get(&bundle.name).ok_or_else(|| {
                EngineError::NotFound(format!("application for bundle '{}'", bundle.name))
            })?;
            bundles.push((bundle, app));
        }

        // capability or application name → application name
        let mut providers: BTreeMap<&str, &str> = BTreeMap::new();
        for (_, app) in &bundles {
            providers.insert(app.name.as_str(), app.name.as_str());
            providers.insert(app.provided_name(), app.name.as_str());
        }

        let mut suffixes: BTreeMap<&str, BTreeSet<String>> = BTreeMap::new();
        let mut extra: BTreeMap<String, Vec<ParameterSpec>> = BTreeMap::new();
        for (bundle, app) in &bundles {
            for requirement in effective_requires(bundle, app) {
                if let Some(provider) = providers.get(requirement.name.as_str()) {
                    suffixes
                        .entry(*provider)
                        .or_default()
                        .insert(requirement.suffix.clone());
                }
            }
            for requirement in app.requires.iter().chain(&bundle.requires) {
                if let Some(provider) = providers.get(requirement.name.as_str()) {
                    extra
                        .entry(naming::suffixed(provider, &requirement.suffix))
                        .or_default()
                        .extend(requirement.parameters.iter().cloned());
                }
            }
        }

        let mut installs = BTreeMap::new();
        for (bundle, app) in &bundles {
            let app_suffixes = suffixes
                .get(app.name.as_str())
                .cloned()
                .unwrap_or_else(|| BTreeSet::from([String::new()]));
            let mut deps = Vec::new();
            let mut requires = effective_requires(bundle, app);
            for requirement in &mut requires {
                if let Some(provider) = providers.get(requirement.name.as_str()) {
                    requirement.name = provider.to_string();
                    deps.push(requirement.install_name());
                }
            }

            for suffix in app_suffixes {
                let install_name = naming::suffixed(&app.name, &suffix);
                let parameters = match extra.get(&install_name) {
                    Some(additional) => merge_parameters(&bundle.parameters, additional),
                    None => bundle.parameters.clone(),
                };
                installs.insert(
                    install_name.clone(),
                    PlannedInstall {
                        install_name,
                        application: app.name.clone(),
                        version: app.version.clone(),
                        suffix,
                        parameters,
                        requires: requires.clone(),
                        deps: deps.clone(),
                    },
                );
            }
        }

        let entries: Vec<Entry> = installs
            .values()
            .map(|planned| Entry::new(planned.install_name.clone(), planned.deps.clone()))
            .collect();
        let layers = layered_topological_sort(&entries)?;
        Ok(Self { installs, layers })
    }

    /// Install names in layer order.
    pub fn ordered(&self) -> impl Iterator<Item = &PlannedInstall> {
        self.layers
            .iter()
            .flatten()
            .filter_map(|name| self.installs.get(name))
    }
}

/// The manifest bundle's own requirements, plus the application's for
/// names the manifest does not mention.
fn effective_requires(bundle: &ManifestBundle, app: &Application) -> Vec<Requirement> {
    let mentioned: BTreeSet<&str> = bundle.requires.iter().map(|r| r.name.as_str()).collect();
    bundle
        .requires
        .iter()
        .chain(
            app.requires
                .iter()
                .filter(|r| !mentioned.contains(r.name.as_str())),
        )
        .cloned()
        .collect()
}

/// What to run for each install of a layer.
#[derive(Debug, Clone)]
enum LayerStep {
    Deploy(DeployOpts),
    DeploySmoketest { timeout: Duration, show_logs: bool },
    Smoketest { timeout: Duration, show_logs: bool },
}

impl LayerStep {
    async fn run(&self, deployer: &DeployManager, namespace: &str, install: &str) -> EngineResult<()> {
        match self {
            LayerStep::Deploy(opts) => deployer.deploy(namespace, install, opts).await,
            LayerStep::DeploySmoketest { timeout, show_logs } => {
                deployer
                    .deploy_smoketest(namespace, install, *timeout, *show_logs)
                    .await
            }
            LayerStep::Smoketest { timeout, show_logs } => {
                deployer
                    .smoketest(namespace, install, *timeout, *show_logs)
                    .await
            }
        }
    }
}

#[derive(Clone)]
pub struct ManifestManager {
    client: ResourceClient,
    runtime: Arc<dyn ClusterRuntime>,
    config: EngineConfig,
    register: RegisterManager,
    installer: InstallManager,
    deployer: DeployManager,
}

impl ManifestManager {
    pub fn new(
        client: ResourceClient,
        runtime: Arc<dyn ClusterRuntime>,
        deployer: DeployManager,
        config: &EngineConfig,
    ) -> Self {
        Self {
            register: RegisterManager::new(client.clone()),
            installer: InstallManager::new(
                client.clone(),
                runtime.clone(),
                &config.default_namespace,
            ),
            client,
            runtime,
            config: config.clone(),
            deployer,
        }
    }

    pub fn deployer(&self) -> &DeployManager {
        &self.deployer
    }

    /// Register the manifest's bundles and create or reuse every planned
    /// install, in dependency order.
    pub async fn install(&self, namespace: &str, name: &str, force: bool) -> EngineResult<DeployPlan> {
        let manifest = self.load(namespace, name).await?;
        info!(manifest = %name, namespace, "installing manifest");

        match verify_resource_requirements(self.runtime.as_ref(), &manifest.spec).await {
            Err(e) if force && e.is_admission() => {
                warn!(manifest = %name, error = %e, "forcing installation with insufficient cluster resources");
            }
            Err(e) => return Err(e).with_context(|| format!("couldn't install manifest '{name}'")),
            Ok(()) => {}
        }

        let source = self.source_chain(&manifest).await?;
        let refs: Vec<BundleRef> = manifest
            .spec
            .bundles
            .iter()
            .map(|b| BundleRef::new(&b.name, &b.version))
            .collect();
        let registered = self
            .register
            .register_all(&refs, &source, namespace)
            .await
            .with_context(|| format!("couldn't register bundles of manifest '{name}'"))?;
        let applications: BTreeMap<String, Application> = registered
            .into_iter()
            .map(|app| (app.name.clone(), app))
            .collect();

        let registry = self.registry_url(&manifest).await?;
        let flavor = flavor_name(&manifest);
        let plan = DeployPlan::build(&manifest, &applications)?;

        for (index, layer) in plan.layers.iter().enumerate() {
            debug!(layer = index, installs = ?layer, "installing layer");
            for install_name in layer {
                let Some(planned) = plan.installs.get(install_name) else {
                    continue;
                };
                let request = InstallRequest {
                    application: planned.application.clone(),
                    version: planned.version.clone(),
                    name: None,
                    namespace: namespace.to_string(),
                    suffix: planned.suffix.clone(),
                    flavor: flavor.clone(),
                    docker_registry: registry.clone(),
                    parameters: planned.parameters.clone(),
                    requires: Some(planned.requires.clone()),
                    force,
                };
                self.installer
                    .install(&request)
                    .await
                    .with_context(|| format!("couldn't install '{install_name}'"))?;
            }
        }
        info!(manifest = %name, installs = plan.installs.len(), "manifest installed");
        Ok(plan)
    }

    /// Deploy every install layer by layer with `apply outputs`.
    pub async fn deploy(
        &self,
        namespace: &str,
        name: &str,
        timeout: Duration,
        show_logs: bool,
    ) -> EngineResult<()> {
        let plan = self.plan(namespace, name).await?;
        let opts = DeployOpts::new(naming::ACTION_APPLY_OUTPUTS, timeout).with_logs(show_logs);
        self.run_layers(namespace, &plan.layers, LayerStep::Deploy(opts))
            .await
            .with_context(|| format!("couldn't deploy manifest '{name}'"))
    }

    /// Deploy, then smoketest, each install layer by layer.
    pub async fn deploy_smoketest(
        &self,
        namespace: &str,
        name: &str,
        timeout: Duration,
        show_logs: bool,
    ) -> EngineResult<()> {
        let plan = self.plan(namespace, name).await?;
        let step = LayerStep::DeploySmoketest { timeout, show_logs };
        self.run_layers(namespace, &plan.layers, step)
            .await
            .with_context(|| format!("couldn't deploy manifest '{name}'"))
    }

    pub async fn smoketest(
        &self,
        namespace: &str,
        name: &str,
        timeout: Duration,
        show_logs: bool,
    ) -> EngineResult<()> {
        let plan = self.plan(namespace, name).await?;
        let step = LayerStep::Smoketest { timeout, show_logs };
        self.run_layers(namespace, &plan.layers, step)
            .await
            .with_context(|| format!("couldn't smoketest manifest '{name}'"))
    }

    /// Run the diff action for every install, one at a time, with logs shown.
    pub async fn diff(&self, namespace: &str, name: &str, timeout: Duration) -> EngineResult<()> {
        let plan = self.plan(namespace, name).await?;
        let opts = DeployOpts::new(naming::ACTION_DIFF, timeout).with_logs(true);
        for planned in plan.ordered() {
            self.deployer
                .deploy(namespace, &planned.install_name, &opts)
                .await?;
        }
        Ok(())
    }

    /// The plan for a manifest whose applications are already registered.
    pub async fn plan(&self, namespace: &str, name: &str) -> EngineResult<DeployPlan> {
        let manifest = self.load(namespace, name).await?;
        let registered: Vec<Application> = self.client.list(namespace).await?;

        let mut applications = BTreeMap::new();
        for bundle in &manifest.spec.bundles {
            let app = select_application(&registered, bundle).ok_or_else(|| {
                EngineError::NotFound(format!(
                    "application {}-{} is not registered",
                    bundle.name, bundle.version
                ))
            })?;
            applications.insert(bundle.name.clone(), app.clone());
        }
        DeployPlan::build(&manifest, &applications)
    }

    async fn run_layers(
        &self,
        namespace: &str,
        layers: &[Vec<String>],
        step: LayerStep,
    ) -> EngineResult<()> {
        let workers = Arc::new(Semaphore::new(self.config.parallelism.max(1)));

        for (index, layer) in layers.iter().enumerate() {
            info!(layer = index, installs = ?layer, "running layer");
            let mut tasks = JoinSet::new();
            let mut names: HashMap<tokio::task::Id, String> = HashMap::new();
            for install in layer {
                let workers = workers.clone();
                let deployer = self.deployer.clone();
                let step = step.clone();
                let namespace = namespace.to_string();
                let name = install.clone();
                let handle = tasks.spawn(async move {
                    let result = match workers.acquire_owned().await {
                        Ok(_permit) => step.run(&deployer, &namespace, &name).await,
                        Err(e) => Err(EngineError::Task(e.to_string())),
                    };
                    (name, result)
                });
                names.insert(handle.id(), install.clone());
            }

            let mut failures: Vec<(String, EngineError)> = Vec::new();
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((_, Ok(()))) => {}
                    Ok((install, Err(e))) => failures.push((install, e)),
                    Err(e) => {
                        let install = names.remove(&e.id()).unwrap_or_default();
                        let error = EngineError::Task(format!("worker for install '{install}' failed: {e}"));
                        failures.push((install, error));
                    }
                }
            }

            if !failures.is_empty() {
                failures.sort_by(|a, b| a.0.cmp(&b.0));
                return Err(EngineError::Layer {
                    layer: index,
                    errors: failures.into_iter().map(|(_, e)| e).collect(),
                });
            }
        }
        Ok(())
    }

    async fn load(&self, namespace: &str, name: &str) -> EngineResult<Manifest> {
        Ok(self
            .client
            .require::<Manifest>(namespace, name)
            .await
            .with_context(|| format!("couldn't get manifest '{name}'"))?
            .value)
    }

    /// Sources named by the manifest, tried in order.
    async fn source_chain(&self, manifest: &Manifest) -> EngineResult<MultiSource> {
        let mut sources: Vec<Box<dyn Source>> = Vec::with_capacity(manifest.spec.sources.len());
        for entry in &manifest.spec.sources {
            let spec = self
                .client
                .require::<SourceSpec>(&self.config.default_namespace, &entry.name)
                .await
                .with_context(|| format!("couldn't get source '{}'", entry.name))?
                .value;
            let source = new_source(&spec, &entry.section, &entry.release)?;
            debug!(source = %source.describe(), "using bundle source");
            sources.push(source);
        }
        Ok(MultiSource::new(sources))
    }

    async fn registry_url(&self, manifest: &Manifest) -> EngineResult<String> {
        if manifest.spec.registry.is_empty() {
            return Ok(String::new());
        }
        let registry = self
            .client
            .require::<Registry>(&self.config.default_namespace, &manifest.spec.registry)
            .await
            .with_context(|| format!("couldn't get registry '{}'", manifest.spec.registry))?;
        Ok(registry.value.cluster_url())
    }
}

fn flavor_name(manifest: &Manifest) -> String {
    if manifest.spec.flavor.is_empty() {
        Flavor::single_node().name
    } else {
        manifest.spec.flavor.clone()
    }
}

/// The registered application a manifest bundle refers to. `latest` or a
/// blank version picks the highest semver.
fn select_application<'a>(
    registered: &'a [Application],
    bundle: &ManifestBundle,
) -> Option<&'a Application> {
    let mut candidates = registered.iter().filter(|app| app.name == bundle.name);
    if bundle.version.is_empty() || bundle.version == kb_bundle::bundle::LATEST {
        candidates
            .filter_map(|app| semver::Version::parse(&app.version).ok().map(|v| (v, app)))
            .max_by(|a, b| a.0.cmp(&b.0))
            .map(|(_, app)| app)
    } else {
        candidates.find(|app| app.version == bundle.version)
    }
}
