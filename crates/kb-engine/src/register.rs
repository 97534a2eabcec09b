//! RegisterManager — persists applications read from bundle archives.
//!
//! Registration is all-or-nothing with respect to validation: every bundle
//! is fetched and every requirement checked before the first write. Writes
//! then proceed layer by layer in dependency order and are create-if-absent,
//! so registering the same name and version twice is a no-op.

use std::collections::{BTreeMap, BTreeSet};

use kb_bundle::{BundleRef, Source};
use kb_cluster::ResourceClient;
use kb_core::Application;
use tracing::{debug, info};

use crate::error::{EngineError, EngineResult, ErrorContext};
use crate::resolver::{Entry, layered_topological_sort};

#[derive(Clone)]
pub struct RegisterManager {
    client: ResourceClient,
}

impl RegisterManager {
    pub fn new(client: ResourceClient) -> Self {
        Self { client }
    }

    /// Register one bundle. Its requirements must already be registered.
    pub async fn register(
        &self,
        bundle: &BundleRef,
        source: &dyn Source,
        namespace: &str,
    ) -> EngineResult<Application> {
        let mut apps = self
            .register_all(std::slice::from_ref(bundle), source, namespace)
            .await?;
        apps.pop()
            .ok_or_else(|| EngineError::NotFound(format!("bundle '{bundle}'")))
    }

    /// Register a set of bundles. Returns the applications in safe-install
    /// order.
    pub async fn register_all(
        &self,
        bundles: &[BundleRef],
        source: &dyn Source,
        namespace: &str,
    ) -> EngineResult<Vec<Application>> {
        // capability name → application
        let mut apps: BTreeMap<String, Application> = BTreeMap::new();
        for bundle in bundles {
            let file = source
                .get(bundle)
                .await
                .with_context(|| format!("couldn't find bundle file with name '{}'", bundle.filename()))?;
            let app = file.application().clone();
            app.validate().map_err(|e| {
                EngineError::Config(format!("invalid application in bundle '{bundle}': {e}"))
            })?;

            let provided = app.provided_name().to_string();
            if let Some(existing) = apps.get(&provided) {
                if existing.name != app.name || existing.version != app.version {
                    return Err(EngineError::Dependency(format!(
                        "capability '{provided}' is provided by both {}-{} and {}-{}",
                        existing.name, existing.version, app.name, app.version
                    )));
                }
                continue;
            }
            apps.insert(provided, app);
        }

        self.validate_dependencies(namespace, &apps)
            .await
            .with_context(|| "couldn't satisfy dependencies".to_string())?;

        // Requirements met by already-registered applications are outside
        // this batch's graph.
        let entries: Vec<Entry> = apps
            .iter()
            .map(|(provided, app)| {
                let deps = app
                    .requires
                    .iter()
                    .filter(|r| apps.contains_key(&r.name))
                    .map(|r| r.name.clone())
                    .collect::<Vec<_>>();
                Entry::new(provided.clone(), deps)
            })
            .collect();
        let layers = layered_topological_sort(&entries)?;

        let mut ordered = Vec::with_capacity(apps.len());
        for (level, layer) in layers.iter().enumerate() {
            info!(level, layer = ?layer, "registering layer");
            for provided in layer {
                let Some(app) = apps.remove(provided) else {
                    continue;
                };
                let created = self
                    .client
                    .create_if_absent(namespace, &app)
                    .await
                    .with_context(|| format!("couldn't register application '{}'", app.name))?;
                if created {
                    info!(application = %app.name, version = %app.version, "application registered");
                } else {
                    debug!(application = %app.name, version = %app.version, "application already registered");
                }
                ordered.push(app);
            }
        }
        Ok(ordered)
    }

    async fn validate_dependencies(
        &self,
        namespace: &str,
        apps: &BTreeMap<String, Application>,
    ) -> EngineResult<()> {
        let registered: Vec<Application> = self.client.list(namespace).await?;
        let mut available: BTreeSet<&str> = registered
            .iter()
            .flat_map(|a| [a.name.as_str(), a.provided_name()])
            .collect();
        for (provided, app) in apps {
            available.insert(provided.as_str());
            available.insert(app.name.as_str());
        }

        for app in apps.values() {
            for requirement in &app.requires {
                if requirement.name == app.name || requirement.name == app.provided_name() {
                    return Err(EngineError::Dependency(format!(
                        "bundle '{}' cannot require itself",
                        requirement.name
                    )));
                }
                if !available.contains(requirement.name.as_str()) {
                    return Err(EngineError::Dependency(format!(
                        "required dependency '{}' for app '{}' not found",
                        requirement.name, app.name
                    )));
                }
            }
        }
        Ok(())
    }
}
