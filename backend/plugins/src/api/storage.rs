//! Storage API: a key/value namespace private to each plugin.

use std::collections::{BTreeMap, HashMap};

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use plugdock_core::{Capability, HostResult};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::boundary;
use super::CapabilityApi;

/// Backing store. Values arrive already serialised.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<String>>;
    async fn set(&self, namespace: &str, key: &str, value: String) -> Result<()>;
    async fn remove(&self, namespace: &str, key: &str) -> Result<bool>;
    async fn keys(&self, namespace: &str) -> Result<Vec<String>>;
    async fn clear(&self, namespace: &str) -> Result<()>;
}

#[derive(Default)]
pub struct MemoryStorage {
    namespaces: RwLock<HashMap<String, BTreeMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<String>> {
        Ok(self
            .namespaces
            .read()
            .get(namespace)
            .and_then(|ns| ns.get(key).cloned()))
    }

    async fn set(&self, namespace: &str, key: &str, value: String) -> Result<()> {
        self.namespaces
            .write()
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, namespace: &str, key: &str) -> Result<bool> {
        Ok(self
            .namespaces
            .write()
            .get_mut(namespace)
            .map(|ns| ns.remove(key).is_some())
            .unwrap_or(false))
    }

    async fn keys(&self, namespace: &str) -> Result<Vec<String>> {
        Ok(self
            .namespaces
            .read()
            .get(namespace)
            .map(|ns| ns.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn clear(&self, namespace: &str) -> Result<()> {
        self.namespaces.write().remove(namespace);
        Ok(())
    }
}

/// `storage:read` guards `get`/`keys`; `storage:write` guards the rest.
pub struct StorageApi<'a> {
    api: &'a CapabilityApi,
}

impl<'a> StorageApi<'a> {
    pub(super) fn new(api: &'a CapabilityApi) -> Self {
        Self { api }
    }

    fn namespace(&self) -> &str {
        self.api.plugin_id()
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> HostResult<Option<T>> {
        self.api.require(Capability::STORAGE_READ, "storage.get")?;
        let raw = self.api.storage_backend().get(self.namespace(), key).await?;
        raw.map(|r| boundary::from_wire(&r)).transpose()
    }

    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> HostResult<()> {
        self.api.require(Capability::STORAGE_WRITE, "storage.set")?;
        let raw = boundary::to_wire(value)?;
        self.api
            .storage_backend()
            .set(self.namespace(), key, raw)
            .await?;
        Ok(())
    }

    pub async fn remove(&self, key: &str) -> HostResult<bool> {
        self.api.require(Capability::STORAGE_WRITE, "storage.remove")?;
        Ok(self.api.storage_backend().remove(self.namespace(), key).await?)
    }

    pub async fn keys(&self) -> HostResult<Vec<String>> {
        self.api.require(Capability::STORAGE_READ, "storage.keys")?;
        Ok(self.api.storage_backend().keys(self.namespace()).await?)
    }

    pub async fn clear(&self) -> HostResult<()> {
        self.api.require(Capability::STORAGE_WRITE, "storage.clear")?;
        Ok(self.api.storage_backend().clear(self.namespace()).await?)
    }
}
