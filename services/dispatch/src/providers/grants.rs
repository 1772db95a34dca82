use super::cache::{CacheLoader, ReadThroughCache};
use super::{ProviderError, ProviderResult};
use crate::store::AccessStore;
use async_trait::async_trait;
use std::sync::Arc;
use warden_authz::Permissions;
use warden_common::ids::Identifier;

/// Cache key for an explicit grant, rendered as `principal:path_key`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GrantKey {
    pub principal: Identifier,
    pub path_key: String,
}

impl std::fmt::Display for GrantKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.principal, self.path_key)
    }
}

pub struct GrantLoader {
    store: Arc<dyn AccessStore>,
}

#[async_trait]
impl CacheLoader<GrantKey, Permissions> for GrantLoader {
    type Error = ProviderError;

    async fn load(&self, key: &GrantKey) -> ProviderResult<Permissions> {
        Ok(self.store.grant_for(&key.path_key, &key.principal).await?)
    }
}

/// Explicit grants keyed by (principal, resource path key).
pub struct GrantProvider {
    cache: ReadThroughCache<GrantKey, Permissions, GrantLoader>,
}

impl GrantProvider {
    pub fn new(store: Arc<dyn AccessStore>, capacity: usize) -> Self {
        Self {
            cache: ReadThroughCache::adaptive("grants", capacity, GrantLoader { store }),
        }
    }

    pub async fn grant_for(
        &self,
        path_key: &str,
        principal: &Identifier,
    ) -> ProviderResult<Permissions> {
        self.cache
            .get(GrantKey {
                principal: *principal,
                path_key: path_key.to_string(),
            })
            .await
    }

    /// Grant for the principal, with `NotFound` folded into `None`.
    pub async fn find(
        &self,
        path_key: &str,
        principal: &Identifier,
    ) -> ProviderResult<Option<Permissions>> {
        match self.grant_for(path_key, principal).await {
            Ok(grant) => Ok(Some(grant)),
            Err(ProviderError::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;
    use warden_authz::Verb;

    #[test]
    fn key_renders_principal_then_path() {
        let principal = Identifier::generate();
        let key = GrantKey {
            principal,
            path_key: "item/42".to_string(),
        };
        assert_eq!(key.to_string(), format!("{principal}:item/42"));
    }

    #[tokio::test]
    async fn new_grant_is_visible_after_a_miss() {
        let store = Arc::new(InMemoryStore::new());
        let principal = Identifier::generate();
        store.register_resource("item/1", None).await.expect("register");
        let provider = GrantProvider::new(store.clone(), 10);

        assert_eq!(provider.find("item/1", &principal).await.expect("find"), None);
        let read = Permissions::from_verbs([Verb::Read]);
        store.set_grant("item/1", &principal, read).await.expect("grant");
        assert_eq!(
            provider.find("item/1", &principal).await.expect("find"),
            Some(read)
        );
        assert_eq!(provider.cached(), 1);
    }

    #[tokio::test]
    async fn store_failure_is_not_a_missing_grant() {
        let store = Arc::new(InMemoryStore::new());
        store.set_unavailable(true);
        let provider = GrantProvider::new(store, 10);
        let err = provider
            .find("item/1", &Identifier::generate())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Database(_)));
    }
}
