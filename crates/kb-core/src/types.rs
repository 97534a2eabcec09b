//! Resource types shared across kube-bundler crates.
//!
//! Every type here is serialized with camelCase field names: the same JSON
//! documents are stored in the resource store and mounted into execution
//! units, so the wire shape is part of the contract.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::naming;

/// Validation failures for resource documents.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("empty field '{0}'")]
    EmptyField(&'static str),
    #[error("application '{0}' declares more than one provides entry")]
    MultipleProvides(String),
    #[error("invalid document: {0}")]
    Document(String),
}

/// The kinds of records kept in the resource store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Application,
    Install,
    Flavor,
    Manifest,
    Source,
    Registry,
    ConfigMap,
    Secret,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Application => "application",
            ResourceKind::Install => "install",
            ResourceKind::Flavor => "flavor",
            ResourceKind::Manifest => "manifest",
            ResourceKind::Source => "source",
            ResourceKind::Registry => "registry",
            ResourceKind::ConfigMap => "configmap",
            ResourceKind::Secret => "secret",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record that can be persisted in the resource store.
pub trait Resource: Serialize + serde::de::DeserializeOwned + Send + Sync {
    const KIND: ResourceKind;

    /// Name under which the record is stored.
    fn resource_name(&self) -> String;
}

// ── Parameters ─────────────────────────────────────────────────────

/// Instructions for lazily generating a secret value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateSecret {
    /// `hex` or `rsa`.
    pub format: String,
    /// Random byte count for `hex`.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub bytes: u32,
    /// Key size for `rsa`.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub bits: u32,
}

/// A parameter declared by an application.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub default: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generate_secret: Option<GenerateSecret>,
}

/// A parameter override supplied by an install, manifest, or requirement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterSpec {
    pub name: String,
    #[serde(default)]
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generate_secret: Option<GenerateSecret>,
}

impl ParameterSpec {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            generate_secret: None,
        }
    }
}

// ── Application ────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageSpec {
    pub image: String,
    #[serde(default)]
    pub scheme: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provides {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<OutputDefinition>,
}

/// A dependency on another bundle's capability.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Requirement {
    pub name: String,
    #[serde(default)]
    pub suffix: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<ParameterSpec>,
}

impl Requirement {
    /// Name of the install that satisfies this requirement.
    pub fn install_name(&self) -> String {
        naming::suffixed(&self.name, &self.suffix)
    }
}

/// A workload the application creates, checked after deploy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadResource {
    pub name: String,
    pub category: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCheck {
    pub endpoint: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub expected_code: String,
}

/// An immutable application template, registered once per name and version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub docker_registry: String,
    #[serde(default)]
    pub deploy_image: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImageSpec>,
    #[serde(default, rename = "parameters")]
    pub parameter_definitions: Vec<ParameterDefinition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub provides: Vec<Provides>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requires: Vec<Requirement>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<WorkloadResource>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub status: Vec<StatusCheck>,
}

impl Application {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyField("name"));
        }
        if self.version.trim().is_empty() {
            return Err(ValidationError::EmptyField("version"));
        }
        if self.deploy_image.trim().is_empty() {
            return Err(ValidationError::EmptyField("deployImage"));
        }
        if self.provides.len() > 1 {
            return Err(ValidationError::MultipleProvides(self.name.clone()));
        }
        Ok(())
    }

    /// The capability this application satisfies. Defaults to its own name.
    pub fn provided_name(&self) -> &str {
        self.provides
            .first()
            .map(|p| p.name.as_str())
            .filter(|name| !name.is_empty())
            .unwrap_or(self.name.as_str())
    }

    /// Names of the capabilities this application requires.
    pub fn required_names(&self) -> Vec<String> {
        self.requires.iter().map(|r| r.name.clone()).collect()
    }

    /// Whether the version is a semantic version rather than a free-form tag.
    pub fn has_semver(&self) -> bool {
        semver::Version::parse(&self.version).is_ok()
    }
}

impl Resource for Application {
    const KIND: ResourceKind = ResourceKind::Application;

    fn resource_name(&self) -> String {
        naming::application_record_name(&self.name, &self.version)
    }
}

// ── Install ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallSpec {
    pub application: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub suffix: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub deploy_image: String,
    #[serde(default)]
    pub flavor: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub docker_registry: String,
    #[serde(default)]
    pub parameters: Vec<ParameterSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secrets: Vec<ParameterSpec>,
    /// Requirements resolved against the installs a manifest created: each
    /// entry names the providing application and the suffix of its install.
    /// `None` for installs made outside a manifest, which use the
    /// application's own `requires`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires: Option<Vec<Requirement>>,
}

impl InstallSpec {
    /// Upstream requirements this install mounts, given its application.
    pub fn effective_requires<'a>(&'a self, app: &'a Application) -> &'a [Requirement] {
        self.requires.as_deref().unwrap_or(&app.requires)
    }
}

/// A named instantiation of an application.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Install {
    pub name: String,
    pub namespace: String,
    pub spec: InstallSpec,
}

impl Install {
    /// Record name of the application this install instantiates.
    pub fn application_record_name(&self) -> String {
        naming::application_record_name(&self.spec.application, &self.spec.version)
    }
}

impl Resource for Install {
    const KIND: ResourceKind = ResourceKind::Install;

    fn resource_name(&self) -> String {
        self.name.clone()
    }
}

// ── Flavor ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AntiAffinity {
    Required,
    #[default]
    Optional,
}

/// HA sizing profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flavor {
    pub name: String,
    pub stateful_quorum_replicas: u32,
    pub stateful_replication_replicas: u32,
    pub stateless_replicas: u32,
    #[serde(default)]
    pub anti_affinity: AntiAffinity,
    pub minimum_nodes: u32,
}

impl Flavor {
    /// The profile created when a cluster has no flavors yet.
    pub fn single_node() -> Self {
        Self {
            name: "single-node".to_string(),
            stateful_quorum_replicas: 1,
            stateful_replication_replicas: 1,
            stateless_replicas: 1,
            anti_affinity: AntiAffinity::Optional,
            minimum_nodes: 1,
        }
    }
}

impl Resource for Flavor {
    const KIND: ResourceKind = ResourceKind::Flavor;

    fn resource_name(&self) -> String {
        self.name.clone()
    }
}

// ── Manifest ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestSource {
    pub name: String,
    #[serde(default)]
    pub section: String,
    #[serde(default)]
    pub release: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestBundle {
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<ParameterSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requires: Vec<Requirement>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestSpec {
    #[serde(default)]
    pub flavor: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub registry: String,
    #[serde(default)]
    pub sources: Vec<ManifestSource>,
    #[serde(default)]
    pub bundles: Vec<ManifestBundle>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cpu: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub memory: String,
}

/// A declarative set of bundles installed and deployed together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub name: String,
    pub spec: ManifestSpec,
}

impl Resource for Manifest {
    const KIND: ResourceKind = ResourceKind::Manifest;

    fn resource_name(&self) -> String {
        self.name.clone()
    }
}

// ── Source / Registry ──────────────────────────────────────────────

/// A bundle source record: where `.kb` archives can be fetched from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, String>,
}

impl Resource for SourceSpec {
    const KIND: ResourceKind = ResourceKind::Source;

    fn resource_name(&self) -> String {
        self.name.clone()
    }
}

/// A cluster-local image registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registry {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub storage_size: String,
}

impl Registry {
    /// Address the registry is reachable at from inside the cluster.
    pub fn cluster_url(&self) -> String {
        format!("localhost:6000/registry-{}", naming::sanitize(&self.name))
    }
}

impl Resource for Registry {
    const KIND: ResourceKind = ResourceKind::Registry;

    fn resource_name(&self) -> String {
        self.name.clone()
    }
}

// ── Config maps and secrets ────────────────────────────────────────

/// Named string documents mounted into execution units.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMap {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl Resource for ConfigMap {
    const KIND: ResourceKind = ResourceKind::ConfigMap;

    fn resource_name(&self) -> String {
        self.name.clone()
    }
}

/// A key/value secret record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Secret {
    pub name: String,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl Resource for Secret {
    const KIND: ResourceKind = ResourceKind::Secret;

    fn resource_name(&self) -> String {
        self.name.clone()
    }
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

fn is_false(b: &bool) -> bool {
    !*b
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app(name: &str) -> Application {
        Application {
            name: name.to_string(),
            version: "1.0.0".to_string(),
            deploy_image: format!("example.com/{name}-deploy:1.0.0"),
            ..Default::default()
        }
    }

    #[test]
    fn validate_rejects_blank_fields() {
        let mut a = app("pg");
        a.deploy_image = "  ".to_string();
        assert_eq!(a.validate(), Err(ValidationError::EmptyField("deployImage")));

        let mut a = app("pg");
        a.version.clear();
        assert_eq!(a.validate(), Err(ValidationError::EmptyField("version")));
    }

    #[test]
    fn validate_rejects_multiple_provides() {
        let mut a = app("pg");
        a.provides = vec![
            Provides { name: "pg".into(), outputs: vec![] },
            Provides { name: "db".into(), outputs: vec![] },
        ];
        assert!(matches!(a.validate(), Err(ValidationError::MultipleProvides(_))));
    }

    #[test]
    fn provided_name_defaults_to_application_name() {
        let mut a = app("pg");
        assert_eq!(a.provided_name(), "pg");
        a.provides = vec![Provides { name: "database".into(), outputs: vec![] }];
        assert_eq!(a.provided_name(), "database");
    }

    #[test]
    fn application_parses_from_yaml_style_json() {
        let doc = r#"{
            "name": "app",
            "version": "2.1.0",
            "deployImage": "registry.example.com/app/deploy:2.1.0",
            "parameters": [
                {"name": "password", "generateSecret": {"format": "hex", "bytes": 16}},
                {"name": "replicas", "default": "3", "required": true}
            ],
            "requires": [{"name": "pg", "suffix": "primary"}],
            "resources": [{"name": "app", "category": "api", "type": "deployment"}]
        }"#;
        let a: Application = serde_json::from_str(doc).unwrap();
        assert_eq!(a.parameter_definitions.len(), 2);
        assert_eq!(
            a.parameter_definitions[0].generate_secret.as_ref().unwrap().bytes,
            16
        );
        assert_eq!(a.requires[0].install_name(), "pg-primary");
        assert_eq!(a.resources[0].kind, "deployment");
        assert_eq!(a.resource_name(), "app-2.1.0");
        assert!(a.has_semver());
    }

    #[test]
    fn resolved_requires_replace_application_requires() {
        let mut a = app("app");
        a.requires = vec![Requirement { name: "database".into(), suffix: "primary".into(), parameters: vec![] }];
        let mut spec = InstallSpec::default();
        assert_eq!(spec.effective_requires(&a)[0].install_name(), "database-primary");

        spec.requires = Some(vec![Requirement { name: "postgres".into(), ..Default::default() }]);
        assert_eq!(spec.effective_requires(&a)[0].install_name(), "postgres");

        spec.requires = Some(vec![]);
        assert!(spec.effective_requires(&a).is_empty());
    }

    #[test]
    fn registry_cluster_url_is_sanitized() {
        let r = Registry { name: "Main.Registry".into(), storage_size: String::new() };
        assert_eq!(r.cluster_url(), "localhost:6000/registry-main-registry");
    }
}
