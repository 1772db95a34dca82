//! Persistent store abstraction for accounts, resource owners and grants.
//!
//! # Purpose
//! Defines the [`AccessStore`] trait the caching providers read through, the
//! record shapes it returns, and the error taxonomy shared by every backend.
//!
//! # Key invariants
//! - `NotFound` means the row is absent. Driver, connection and decoding
//!   failures are always `Unexpected`, never `NotFound`.
//! - Resources are addressed by their path key (`ResourceIdentifier::serialize`).
use async_trait::async_trait;
use thiserror::Error;
use warden_authz::Permissions;
use warden_common::ids::Identifier;

pub mod memory;
pub mod postgres;
pub mod transaction;

/// Account record. Read-only here; accounts are provisioned externally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAccount {
    pub id: Identifier,
    pub username: String,
    pub password_hash: String,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Unexpected(anyhow::Error::new(err))
    }
}

impl From<sqlx::migrate::MigrateError> for StoreError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        StoreError::Unexpected(anyhow::Error::new(err))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait AccessStore: Send + Sync {
    async fn find_user_by_id(&self, id: &Identifier) -> StoreResult<UserAccount>;
    async fn find_user_by_username(&self, username: &str) -> StoreResult<UserAccount>;

    /// Owner of the resource stored under `path_key`. A registered resource
    /// without an owner is `NotFound` as well.
    async fn owner_of(&self, path_key: &str) -> StoreResult<Identifier>;
    async fn grant_for(&self, path_key: &str, principal: &Identifier) -> StoreResult<Permissions>;

    /// Persist a resource instance. `Conflict` if the path key is taken.
    async fn register_resource(&self, path_key: &str, owner: Option<&Identifier>)
    -> StoreResult<()>;
    /// Insert or replace an explicit grant. `NotFound` if the resource was
    /// never registered.
    async fn set_grant(
        &self,
        path_key: &str,
        principal: &Identifier,
        permissions: Permissions,
    ) -> StoreResult<()>;
    async fn revoke_grant(&self, path_key: &str, principal: &Identifier) -> StoreResult<()>;

    async fn health_check(&self) -> StoreResult<()>;
    fn is_durable(&self) -> bool;
    fn backend_name(&self) -> &'static str;
}
