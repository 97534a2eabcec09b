//! Resource store capability.
//!
//! A [`ResourceStore`] keeps JSON records keyed by kind, namespace and name.
//! Every write bumps a per-record `resource_version`; conditional updates
//! compare it so a stale read-modify-write fails instead of overwriting a
//! concurrent edit. [`ResourceClient`] layers typed access on top.

use std::sync::Arc;

use async_trait::async_trait;
use kb_core::{Resource, ResourceKind};
use serde::{Deserialize, Serialize};

use crate::error::{ClusterError, ClusterResult};

/// A stored record and the version it was read at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub resource_version: u64,
    pub data: serde_json::Value,
}

/// A typed record and the version it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub resource_version: u64,
    pub value: T,
}

#[async_trait]
pub trait ResourceStore: Send + Sync {
    async fn get(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> ClusterResult<Option<StoredRecord>>;

    async fn list(&self, kind: ResourceKind, namespace: &str) -> ClusterResult<Vec<StoredRecord>>;

    /// Create a record. Fails with [`ClusterError::AlreadyExists`] if present.
    async fn create(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        data: serde_json::Value,
    ) -> ClusterResult<u64>;

    /// Replace a record.
    ///
    /// With `expected_version` set, the write only succeeds if the stored
    /// version still matches (a missing record is [`ClusterError::NotFound`]).
    /// Without it the record is created or overwritten.
    async fn update(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        data: serde_json::Value,
        expected_version: Option<u64>,
    ) -> ClusterResult<u64>;

    /// Delete a record. Returns true if it existed.
    async fn delete(&self, kind: ResourceKind, namespace: &str, name: &str)
    -> ClusterResult<bool>;
}

/// Typed access to a [`ResourceStore`].
#[derive(Clone)]
pub struct ResourceClient {
    store: Arc<dyn ResourceStore>,
}

impl ResourceClient {
    pub fn new(store: Arc<dyn ResourceStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn ResourceStore> {
        &self.store
    }

    pub async fn get<T: Resource>(
        &self,
        namespace: &str,
        name: &str,
    ) -> ClusterResult<Option<Versioned<T>>> {
        match self.store.get(T::KIND, namespace, name).await? {
            Some(record) => Ok(Some(Versioned {
                resource_version: record.resource_version,
                value: serde_json::from_value(record.data)?,
            })),
            None => Ok(None),
        }
    }

    /// Like [`get`](Self::get), but a missing record is an error.
    pub async fn require<T: Resource>(
        &self,
        namespace: &str,
        name: &str,
    ) -> ClusterResult<Versioned<T>> {
        self.get(namespace, name).await?.ok_or_else(|| {
            ClusterError::NotFound(format!("{} {namespace}/{name}", T::KIND))
        })
    }

    pub async fn list<T: Resource>(&self, namespace: &str) -> ClusterResult<Vec<T>> {
        let records = self.store.list(T::KIND, namespace).await?;
        records
            .into_iter()
            .map(|record| serde_json::from_value(record.data).map_err(ClusterError::from))
            .collect()
    }

    /// Create the record unless one already exists. Returns true if created.
    pub async fn create_if_absent<T: Resource>(
        &self,
        namespace: &str,
        value: &T,
    ) -> ClusterResult<bool> {
        let data = serde_json::to_value(value)?;
        match self
            .store
            .create(T::KIND, namespace, &value.resource_name(), data)
            .await
        {
            Ok(_) => Ok(true),
            Err(ClusterError::AlreadyExists(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Create or overwrite unconditionally.
    pub async fn apply<T: Resource>(&self, namespace: &str, value: &T) -> ClusterResult<u64> {
        let data = serde_json::to_value(value)?;
        self.store
            .update(T::KIND, namespace, &value.resource_name(), data, None)
            .await
    }

    /// Overwrite only if the record is still at `expected_version`.
    pub async fn patch<T: Resource>(
        &self,
        namespace: &str,
        value: &T,
        expected_version: u64,
    ) -> ClusterResult<u64> {
        let data = serde_json::to_value(value)?;
        self.store
            .update(
                T::KIND,
                namespace,
                &value.resource_name(),
                data,
                Some(expected_version),
            )
            .await
    }

    pub async fn delete<T: Resource>(&self, namespace: &str, name: &str) -> ClusterResult<bool> {
        self.store.delete(T::KIND, namespace, name).await
    }
}
