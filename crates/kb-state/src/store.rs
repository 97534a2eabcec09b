//! StateStore — redb-backed resource persistence for kube-bundler.
//!
//! Records are JSON-serialized [`StoredRecord`]s in per-kind tables. Each
//! write runs in a single redb write transaction, so the version check of a
//! conditional update and the write itself are atomic. The store supports
//! both on-disk and in-memory backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use kb_cluster::{ClusterResult, ResourceStore, StoredRecord};
use kb_core::ResourceKind;
use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe resource store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        for table in ALL_TABLES {
            txn.open_table(table).map_err(map_err!(Table))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Reads ──────────────────────────────────────────────────────

    pub fn get_record(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> StateResult<Option<StoredRecord>> {
        let key = table_key(namespace, name);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table_for(kind)).map_err(map_err!(Table))?;
        match table.get(key.as_str()).map_err(map_err!(Read))? {
            Some(guard) => Ok(Some(decode(guard.value())?)),
            None => Ok(None),
        }
    }

    /// All records of a kind in one namespace, ordered by name.
    pub fn list_records(
        &self,
        kind: ResourceKind,
        namespace: &str,
    ) -> StateResult<Vec<StoredRecord>> {
        let prefix = format!("{namespace}/");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table_for(kind)).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.range(prefix.as_str()..).map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if !key.value().starts_with(&prefix) {
                break;
            }
            results.push(decode(value.value())?);
        }
        Ok(results)
    }

    // ── Writes ─────────────────────────────────────────────────────

    pub fn create_record(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        data: serde_json::Value,
    ) -> StateResult<u64> {
        let key = table_key(namespace, name);
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(table_for(kind)).map_err(map_err!(Table))?;
            let exists = table.get(key.as_str()).map_err(map_err!(Read))?.is_some();
            if exists {
                return Err(StateError::AlreadyExists(format!("{kind} {key}")));
            }
            let value = encode(&StoredRecord {
                resource_version: 1,
                data,
            })?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%kind, %key, "record created");
        Ok(1)
    }

    pub fn update_record(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        data: serde_json::Value,
        expected_version: Option<u64>,
    ) -> StateResult<u64> {
        let key = table_key(namespace, name);
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let version;
        {
            let mut table = txn.open_table(table_for(kind)).map_err(map_err!(Table))?;
            let current = match table.get(key.as_str()).map_err(map_err!(Read))? {
                Some(guard) => Some(decode(guard.value())?.resource_version),
                None => None,
            };
            version = match (current, expected_version) {
                (None, Some(_)) => return Err(StateError::NotFound(format!("{kind} {key}"))),
                (None, None) => 1,
                (Some(actual), Some(expected)) if actual != expected => {
                    return Err(StateError::Conflict {
                        key: format!("{kind} {key}"),
                        expected,
                        actual,
                    });
                }
                (Some(actual), _) => actual + 1,
            };
            let value = encode(&StoredRecord {
                resource_version: version,
                data,
            })?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%kind, %key, version, "record updated");
        Ok(version)
    }

    /// Delete a record. Returns true if it existed.
    pub fn delete_record(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> StateResult<bool> {
        let key = table_key(namespace, name);
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(table_for(kind)).map_err(map_err!(Table))?;
            existed = table.remove(key.as_str()).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%kind, %key, existed, "record deleted");
        Ok(existed)
    }
}

fn encode(record: &StoredRecord) -> StateResult<Vec<u8>> {
    serde_json::to_vec(record).map_err(map_err!(Serialize))
}

fn decode(bytes: &[u8]) -> StateResult<StoredRecord> {
    serde_json::from_slice(bytes).map_err(map_err!(Deserialize))
}

#[async_trait]
impl ResourceStore for StateStore {
    async fn get(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> ClusterResult<Option<StoredRecord>> {
        Ok(self.get_record(kind, namespace, name)?)
    }

    async fn list(&self, kind: ResourceKind, namespace: &str) -> ClusterResult<Vec<StoredRecord>> {
        Ok(self.list_records(kind, namespace)?)
    }

    async fn create(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        data: serde_json::Value,
    ) -> ClusterResult<u64> {
        Ok(self.create_record(kind, namespace, name, data)?)
    }

    async fn update(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        data: serde_json::Value,
        expected_version: Option<u64>,
    ) -> ClusterResult<u64> {
        Ok(self.update_record(kind, namespace, name, data, expected_version)?)
    }

    async fn delete(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> ClusterResult<bool> {
        Ok(self.delete_record(kind, namespace, name)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_and_get() {
        let store = StateStore::open_in_memory().unwrap();
        let version = store
            .create_record(ResourceKind::Flavor, "default", "ha", json!({"name": "ha"}))
            .unwrap();
        assert_eq!(version, 1);

        let record = store
            .get_record(ResourceKind::Flavor, "default", "ha")
            .unwrap()
            .unwrap();
        assert_eq!(record.resource_version, 1);
        assert_eq!(record.data["name"], "ha");
    }

    #[test]
    fn get_nonexistent_returns_none() {
        let store = StateStore::open_in_memory().unwrap();
        let result = store
            .get_record(ResourceKind::Install, "nope", "nothing")
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn create_twice_fails_with_already_exists() {
        let store = StateStore::open_in_memory().unwrap();
        store
            .create_record(ResourceKind::Application, "default", "pg-1.0", json!({}))
            .unwrap();
        let err = store
            .create_record(ResourceKind::Application, "default", "pg-1.0", json!({}))
            .unwrap_err();
        assert!(matches!(err, StateError::AlreadyExists(_)));
    }

    #[test]
    fn conditional_update_bumps_version() {
        let store = StateStore::open_in_memory().unwrap();
        store
            .create_record(ResourceKind::Install, "default", "app", json!({"v": 1}))
            .unwrap();
        let v2 = store
            .update_record(ResourceKind::Install, "default", "app", json!({"v": 2}), Some(1))
            .unwrap();
        assert_eq!(v2, 2);

        let err = store
            .update_record(ResourceKind::Install, "default", "app", json!({"v": 3}), Some(1))
            .unwrap_err();
        assert!(matches!(
            err,
            StateError::Conflict {
                expected: 1,
                actual: 2,
                ..
            }
        ));

        let record = store
            .get_record(ResourceKind::Install, "default", "app")
            .unwrap()
            .unwrap();
        assert_eq!(record.data["v"], 2);
    }

    #[test]
    fn conditional_update_of_missing_record_is_not_found() {
        let store = StateStore::open_in_memory().unwrap();
        let err = store
            .update_record(ResourceKind::Install, "default", "ghost", json!({}), Some(1))
            .unwrap_err();
        assert!(matches!(err, StateError::NotFound(_)));
    }

    #[test]
    fn unconditional_update_upserts() {
        let store = StateStore::open_in_memory().unwrap();
        let v1 = store
            .update_record(ResourceKind::ConfigMap, "default", "app-config", json!({}), None)
            .unwrap();
        let v2 = store
            .update_record(ResourceKind::ConfigMap, "default", "app-config", json!({}), None)
            .unwrap();
        assert_eq!((v1, v2), (1, 2));
    }

    #[test]
    fn list_is_scoped_to_namespace() {
        let store = StateStore::open_in_memory().unwrap();
        for (ns, name) in [("a", "one"), ("a", "two"), ("ab", "three"), ("b", "four")] {
            store
                .create_record(ResourceKind::Install, ns, name, json!({"name": name}))
                .unwrap();
        }

        let names: Vec<String> = store
            .list_records(ResourceKind::Install, "a")
            .unwrap()
            .into_iter()
            .map(|r| r.data["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["one", "two"]);
    }

    #[test]
    fn delete_reports_existence() {
        let store = StateStore::open_in_memory().unwrap();
        store
            .create_record(ResourceKind::Install, "default", "app", json!({}))
            .unwrap();

        assert!(store.delete_record(ResourceKind::Install, "default", "app").unwrap());
        assert!(!store.delete_record(ResourceKind::Install, "default", "app").unwrap());
    }

    #[test]
    fn kinds_are_isolated() {
        let store = StateStore::open_in_memory().unwrap();
        store
            .create_record(ResourceKind::Install, "default", "app", json!({}))
            .unwrap();
        assert!(store
            .get_record(ResourceKind::Application, "default", "app")
            .unwrap()
            .is_none());
    }
}
