//! Cache-fronted lookups over the access store.
//!
//! Each provider owns one or more [`cache::ReadThroughCache`]s whose loader
//! reads from the shared [`AccessStore`]. Store `NotFound` stays `NotFound`;
//! every other store failure becomes [`ProviderError::Database`].
use crate::config::CacheConfig;
use crate::store::{AccessStore, StoreError};
use std::sync::Arc;
use thiserror::Error;

pub mod cache;
pub mod grants;
pub mod owners;
pub mod users;

pub use grants::{GrantKey, GrantProvider};
pub use owners::OwnerProvider;
pub use users::UserProvider;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("database failure: {0}")]
    Database(#[source] anyhow::Error),
}

impl ProviderError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ProviderError::NotFound(_))
    }
}

impl From<StoreError> for ProviderError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => ProviderError::NotFound(what),
            StoreError::Conflict(what) => {
                ProviderError::Database(anyhow::anyhow!("unexpected conflict: {what}"))
            }
            StoreError::Unexpected(err) => ProviderError::Database(err),
        }
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// The three caching providers, built once per service.
pub struct Providers {
    pub users: UserProvider,
    pub owners: OwnerProvider,
    pub grants: GrantProvider,
}

impl Providers {
    pub fn new(store: Arc<dyn AccessStore>, caches: &CacheConfig) -> Self {
        Self {
            users: UserProvider::new(store.clone(), caches.users),
            owners: OwnerProvider::new(store.clone(), caches.owners),
            grants: GrantProvider::new(store, caches.grants),
        }
    }
}
