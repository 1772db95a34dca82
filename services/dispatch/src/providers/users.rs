use super::cache::{CacheLoader, ReadThroughCache};
use super::{ProviderError, ProviderResult};
use crate::store::{AccessStore, UserAccount};
use async_trait::async_trait;
use std::sync::Arc;
use warden_common::ids::Identifier;

pub struct UserByIdLoader {
    store: Arc<dyn AccessStore>,
}

#[async_trait]
impl CacheLoader<Identifier, UserAccount> for UserByIdLoader {
    type Error = ProviderError;

    async fn load(&self, id: &Identifier) -> ProviderResult<UserAccount> {
        Ok(self.store.find_user_by_id(id).await?)
    }
}

pub struct UserByNameLoader {
    store: Arc<dyn AccessStore>,
}

#[async_trait]
impl CacheLoader<String, UserAccount> for UserByNameLoader {
    type Error = ProviderError;

    async fn load(&self, username: &String) -> ProviderResult<UserAccount> {
        Ok(self.store.find_user_by_username(username).await?)
    }
}

/// Accounts cached by id and by username. Both caches share one capacity
/// setting and are filled independently.
pub struct UserProvider {
    by_id: ReadThroughCache<Identifier, UserAccount, UserByIdLoader>,
    by_name: ReadThroughCache<String, UserAccount, UserByNameLoader>,
}

impl UserProvider {
    pub fn new(store: Arc<dyn AccessStore>, capacity: usize) -> Self {
        Self {
            by_id: ReadThroughCache::adaptive(
                "users",
                capacity,
                UserByIdLoader {
                    store: store.clone(),
                },
            ),
            by_name: ReadThroughCache::adaptive("usernames", capacity, UserByNameLoader { store }),
        }
    }

    pub async fn find_by_id(&self, id: &Identifier) -> ProviderResult<UserAccount> {
        self.by_id.get(*id).await
    }

    pub async fn find_by_username(&self, username: &str) -> ProviderResult<UserAccount> {
        self.by_name.get(username.to_string()).await
    }
}
