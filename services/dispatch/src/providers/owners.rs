use super::cache::{CacheLoader, ReadThroughCache};
use super::{ProviderError, ProviderResult};
use crate::store::AccessStore;
use async_trait::async_trait;
use std::sync::Arc;
use warden_common::ids::Identifier;

pub struct OwnerLoader {
    store: Arc<dyn AccessStore>,
}

#[async_trait]
impl CacheLoader<String, Identifier> for OwnerLoader {
    type Error = ProviderError;

    async fn load(&self, path_key: &String) -> ProviderResult<Identifier> {
        Ok(self.store.owner_of(path_key).await?)
    }
}

/// Resource owners keyed by resource path key.
pub struct OwnerProvider {
    cache: ReadThroughCache<String, Identifier, OwnerLoader>,
}

impl OwnerProvider {
    pub fn new(store: Arc<dyn AccessStore>, capacity: usize) -> Self {
        Self {
            cache: ReadThroughCache::adaptive("owners", capacity, OwnerLoader { store }),
        }
    }

    pub async fn owner_of(&self, path_key: &str) -> ProviderResult<Identifier> {
        self.cache.get(path_key.to_string()).await
    }

    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}
