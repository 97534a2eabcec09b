//! redb table definitions for the kube-bundler state store.
//!
//! One table per resource kind, `&str` keys of the form `{namespace}/{name}`
//! and `&[u8]` values holding a JSON [`StoredRecord`](kb_cluster::StoredRecord).

use kb_core::ResourceKind;
use redb::TableDefinition;

pub const APPLICATIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("applications");
pub const INSTALLS: TableDefinition<&str, &[u8]> = TableDefinition::new("installs");
pub const FLAVORS: TableDefinition<&str, &[u8]> = TableDefinition::new("flavors");
pub const MANIFESTS: TableDefinition<&str, &[u8]> = TableDefinition::new("manifests");
pub const SOURCES: TableDefinition<&str, &[u8]> = TableDefinition::new("sources");
pub const REGISTRIES: TableDefinition<&str, &[u8]> = TableDefinition::new("registries");
pub const CONFIG_MAPS: TableDefinition<&str, &[u8]> = TableDefinition::new("config_maps");
pub const SECRETS: TableDefinition<&str, &[u8]> = TableDefinition::new("secrets");

pub const ALL_TABLES: [TableDefinition<&str, &[u8]>; 8] = [
    APPLICATIONS,
    INSTALLS,
    FLAVORS,
    MANIFESTS,
    SOURCES,
    REGISTRIES,
    CONFIG_MAPS,
    SECRETS,
];

pub fn table_for(kind: ResourceKind) -> TableDefinition<'static, &'static str, &'static [u8]> {
    match kind {
        ResourceKind::Application => APPLICATIONS,
        ResourceKind::Install => INSTALLS,
        ResourceKind::Flavor => FLAVORS,
        ResourceKind::Manifest => MANIFESTS,
        ResourceKind::Source => SOURCES,
        ResourceKind::Registry => REGISTRIES,
        ResourceKind::ConfigMap => CONFIG_MAPS,
        ResourceKind::Secret => SECRETS,
    }
}

/// Composite key for a namespaced record.
pub fn table_key(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}
