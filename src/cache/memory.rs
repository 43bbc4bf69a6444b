use super::traits::{CacheError, CacheKey, CacheResult, ResourceCache};
use crate::resource::Resource;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

/// In-memory resource cache
#[derive(Debug, Default)]
pub struct MemoryCache {
    resources: RwLock<HashMap<CacheKey, Resource>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the resource stored under `key`
    pub fn get(&self, key: &CacheKey) -> CacheResult<Option<Resource>> {
        let resources = self.resources.read().map_err(|_| CacheError::Poisoned)?;
        Ok(resources.get(key).cloned())
    }

    pub fn len(&self) -> usize {
        self.resources.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every stored resource, ordered by key
    pub fn resources(&self) -> CacheResult<Vec<Resource>> {
        let resources = self.resources.read().map_err(|_| CacheError::Poisoned)?;
        let mut entries: Vec<(String, Resource)> = resources
            .iter()
            .map(|(key, resource)| (key.to_string(), resource.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries.into_iter().map(|(_, resource)| resource).collect())
    }
}

#[async_trait]
impl ResourceCache for MemoryCache {
    async fn lookup(&self, key: &CacheKey) -> CacheResult<Option<Resource>> {
        self.get(key)
    }

    async fn store(&self, key: &CacheKey, resource: &Resource) -> CacheResult<()> {
        if !resource.is_packaged() {
            return Err(CacheError::NotPackaged(resource.request_url().clone()));
        }
        let mut resources = self.resources.write().map_err(|_| CacheError::Poisoned)?;
        resources.insert(key.clone(), resource.clone());
        Ok(())
    }
}
