//! In-memory implementation of the access store.
//!
//! # Purpose
//! Implements [`AccessStore`] with `HashMap`s guarded by `tokio::sync::RwLock`.
//! It exists for local development, tests, and deployments that provision
//! accounts and resources at startup and do not need durability.
//!
//! # Durability and consistency
//! - **Not durable**: all state is lost on process restart.
//! - **Single-process consistency**: write locks for mutations, read locks for
//!   lookups.
//!
//! # Read accounting
//! Every lookup that reaches this store bumps a counter exposed through
//! [`InMemoryStore::reads`], so callers can observe whether a cache in front
//! of the store absorbed a lookup.
use super::{AccessStore, StoreError, StoreResult, UserAccount};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use warden_authz::Permissions;
use warden_common::ids::Identifier;

#[derive(Debug, Default)]
struct ResourceRow {
    owner: Option<Identifier>,
    grants: HashMap<Identifier, Permissions>,
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    users: RwLock<HashMap<Identifier, UserAccount>>,
    resources: RwLock<HashMap<String, ResourceRow>>,
    reads: AtomicU64,
    unavailable: std::sync::atomic::AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provision an account. Usernames are unique.
    pub async fn insert_user(&self, account: UserAccount) -> StoreResult<()> {
        let mut users = self.users.write().await;
        if users
            .values()
            .any(|existing| existing.username == account.username && existing.id != account.id)
        {
            return Err(StoreError::Conflict(format!(
                "username {} already taken",
                account.username
            )));
        }
        users.insert(account.id, account);
        Ok(())
    }

    /// Number of lookups served by this store since creation.
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Make every subsequent operation fail as if the backend were
    /// unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Relaxed);
    }

    fn begin_read(&self) -> StoreResult<()> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.ensure_available()
    }

    fn ensure_available(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::Relaxed) {
            return Err(StoreError::Unexpected(anyhow::anyhow!(
                "in-memory store marked unavailable"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl AccessStore for InMemoryStore {
    async fn find_user_by_id(&self, id: &Identifier) -> StoreResult<UserAccount> {
        self.begin_read()?;
        self.users
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("user {id}")))
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<UserAccount> {
        self.begin_read()?;
        self.users
            .read()
            .await
            .values()
            .find(|account| account.username == username)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("user {username}")))
    }

    async fn owner_of(&self, path_key: &str) -> StoreResult<Identifier> {
        self.begin_read()?;
        self.resources
            .read()
            .await
            .get(path_key)
            .and_then(|row| row.owner)
            .ok_or_else(|| StoreError::NotFound(format!("owner of {path_key}")))
    }

    async fn grant_for(&self, path_key: &str, principal: &Identifier) -> StoreResult<Permissions> {
        self.begin_read()?;
        self.resources
            .read()
            .await
            .get(path_key)
            .and_then(|row| row.grants.get(principal).copied())
            .ok_or_else(|| StoreError::NotFound(format!("grant for {principal} on {path_key}")))
    }

    async fn register_resource(
        &self,
        path_key: &str,
        owner: Option<&Identifier>,
    ) -> StoreResult<()> {
        self.ensure_available()?;
        let mut resources = self.resources.write().await;
        if resources.contains_key(path_key) {
            return Err(StoreError::Conflict(format!("resource {path_key}")));
        }
        resources.insert(
            path_key.to_string(),
            ResourceRow {
                owner: owner.copied(),
                grants: HashMap::new(),
            },
        );
        Ok(())
    }

    async fn set_grant(
        &self,
        path_key: &str,
        principal: &Identifier,
        permissions: Permissions,
    ) -> StoreResult<()> {
        self.ensure_available()?;
        let mut resources = self.resources.write().await;
        let row = resources
            .get_mut(path_key)
            .ok_or_else(|| StoreError::NotFound(format!("resource {path_key}")))?;
        row.grants.insert(*principal, permissions);
        Ok(())
    }

    async fn revoke_grant(&self, path_key: &str, principal: &Identifier) -> StoreResult<()> {
        self.ensure_available()?;
        let mut resources = self.resources.write().await;
        let removed = resources
            .get_mut(path_key)
            .and_then(|row| row.grants.remove(principal));
        match removed {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound(format!(
                "grant for {principal} on {path_key}"
            ))),
        }
    }

    async fn health_check(&self) -> StoreResult<()> {
        self.ensure_available()
    }

    fn is_durable(&self) -> bool {
        false
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
