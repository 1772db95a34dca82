//! Postgres-backed implementation of the access store.
//!
//! # Data model
//! - `users`: accounts, keyed by the 16 raw identifier bytes.
//! - `resources`: one row per registered resource instance, keyed by path key,
//!   with an optional owner.
//! - `resource_permissions`: explicit grants, one mask per (resource, principal).
//!
//! # Key invariants
//! - Identifier columns hold exactly 16 bytes; anything else fails decoding
//!   with `Unexpected`, never `NotFound`.
//! - Stored masks with undefined bits set are rejected on read.
//!
//! # Operational notes
//! - Migrations run at connect time via `sqlx::migrate!("./migrations")` so
//!   handlers can assume the schema exists.
//! - Pool and connect timeouts are explicit; a hung database surfaces as a
//!   failed request, not a hung one.
//! - Database URLs may contain credentials; never log them.
use super::{AccessStore, StoreError, StoreResult, UserAccount};
use crate::config::PostgresConfig;
use anyhow::anyhow;
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{FromRow, PgPool};
use std::str::FromStr;
use std::time::Duration;
use warden_authz::Permissions;
use warden_common::ids::Identifier;

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

#[derive(Debug, FromRow)]
struct DbUser {
    id: Vec<u8>,
    username: String,
    password_hash: String,
}

impl PostgresStore {
    /// Connect, size the pool, and apply pending migrations.
    pub async fn connect(pg: &PostgresConfig) -> StoreResult<Self> {
        let connect_options = PgConnectOptions::from_str(&pg.url)?;
        let pool = PgPoolOptions::new()
            .max_connections(pg.max_connections)
            .acquire_timeout(Duration::from_millis(pg.acquire_timeout_ms))
            .connect_with(connect_options);
        let pool = tokio::time::timeout(Duration::from_millis(pg.connect_timeout_ms), pool)
            .await
            .map_err(|_| StoreError::Unexpected(anyhow!("postgres connect timed out")))??;

        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool. The schema must already be migrated.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Provision an account. Used by operators and integration tests.
    pub async fn insert_user(&self, account: &UserAccount) -> StoreResult<()> {
        let insert = sqlx::query("INSERT INTO users (id, username, password_hash) VALUES ($1, $2, $3)")
            .bind(account.id.to_bytes().as_slice())
            .bind(&account.username)
            .bind(&account.password_hash)
            .execute(&self.pool)
            .await;
        match insert {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => Err(StoreError::Conflict(format!(
                "user {} exists",
                account.username
            ))),
            Err(err) => Err(StoreError::Unexpected(err.into())),
        }
    }
}

#[async_trait]
impl AccessStore for PostgresStore {
    async fn find_user_by_id(&self, id: &Identifier) -> StoreResult<UserAccount> {
        let row: Option<DbUser> =
            sqlx::query_as("SELECT id, username, password_hash FROM users WHERE id = $1")
                .bind(id.to_bytes().as_slice())
                .fetch_optional(&self.pool)
                .await?;
        let row = row.ok_or_else(|| StoreError::NotFound(format!("user {id}")))?;
        user_from_db(row)
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<UserAccount> {
        let row: Option<DbUser> =
            sqlx::query_as("SELECT id, username, password_hash FROM users WHERE username = $1")
                .bind(username)
                .fetch_optional(&self.pool)
                .await?;
        let row = row.ok_or_else(|| StoreError::NotFound(format!("user {username}")))?;
        user_from_db(row)
    }

    async fn owner_of(&self, path_key: &str) -> StoreResult<Identifier> {
        let owner: Option<Option<Vec<u8>>> =
            sqlx::query_scalar("SELECT owner_id FROM resources WHERE path_key = $1")
                .bind(path_key)
                .fetch_optional(&self.pool)
                .await?;
        match owner.flatten() {
            Some(bytes) => decode_identifier(&bytes),
            None => Err(StoreError::NotFound(format!("owner of {path_key}"))),
        }
    }

    async fn grant_for(&self, path_key: &str, principal: &Identifier) -> StoreResult<Permissions> {
        let mask: Option<i32> = sqlx::query_scalar(
            "SELECT p.permission_mask FROM resource_permissions p \
             JOIN resources r ON r.id = p.resource_id \
             WHERE r.path_key = $1 AND p.principal_id = $2",
        )
        .bind(path_key)
        .bind(principal.to_bytes().as_slice())
        .fetch_optional(&self.pool)
        .await?;
        let mask =
            mask.ok_or_else(|| StoreError::NotFound(format!("grant for {principal} on {path_key}")))?;
        decode_mask(mask)
    }

    async fn register_resource(
        &self,
        path_key: &str,
        owner: Option<&Identifier>,
    ) -> StoreResult<()> {
        let owner = owner.map(|id| id.to_bytes().to_vec());
        let insert = sqlx::query("INSERT INTO resources (path_key, owner_id) VALUES ($1, $2)")
            .bind(path_key)
            .bind(owner)
            .execute(&self.pool)
            .await;
        match insert {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => {
                Err(StoreError::Conflict(format!("resource {path_key}")))
            }
            Err(err) => Err(StoreError::Unexpected(err.into())),
        }
    }

    async fn set_grant(
        &self,
        path_key: &str,
        principal: &Identifier,
        permissions: Permissions,
    ) -> StoreResult<()> {
        let mask = i32::try_from(permissions.mask())
            .map_err(|_| StoreError::Unexpected(anyhow!("permission mask out of range")))?;
        let result = sqlx::query(
            "INSERT INTO resource_permissions (resource_id, principal_id, permission_mask) \
             SELECT id, $2, $3 FROM resources WHERE path_key = $1 \
             ON CONFLICT (resource_id, principal_id) \
             DO UPDATE SET permission_mask = EXCLUDED.permission_mask",
        )
        .bind(path_key)
        .bind(principal.to_bytes().as_slice())
        .bind(mask)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("resource {path_key}")));
        }
        Ok(())
    }

    async fn revoke_grant(&self, path_key: &str, principal: &Identifier) -> StoreResult<()> {
        let result = sqlx::query(
            "DELETE FROM resource_permissions p USING resources r \
             WHERE r.id = p.resource_id AND r.path_key = $1 AND p.principal_id = $2",
        )
        .bind(path_key)
        .bind(principal.to_bytes().as_slice())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!(
                "grant for {principal} on {path_key}"
            )));
        }
        Ok(())
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn is_durable(&self) -> bool {
        true
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        return db_err.code().map(|code| code == "23505").unwrap_or(false);
    }
    false
}

fn decode_identifier(bytes: &[u8]) -> StoreResult<Identifier> {
    Identifier::from_bytes(bytes).map_err(|err| StoreError::Unexpected(anyhow!(err)))
}

fn decode_mask(mask: i32) -> StoreResult<Permissions> {
    let mask = u32::try_from(mask)
        .map_err(|_| StoreError::Unexpected(anyhow!("negative permission mask {mask}")))?;
    Permissions::try_from_mask(mask).map_err(|err| StoreError::Unexpected(anyhow!(err)))
}

fn user_from_db(row: DbUser) -> StoreResult<UserAccount> {
    Ok(UserAccount {
        id: decode_identifier(&row.id)?,
        username: row.username,
        password_hash: row.password_hash,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_authz::Verb;

    #[test]
    fn mask_decoding_is_strict() {
        let read = Permissions::from_verbs([Verb::Read]);
        assert_eq!(decode_mask(read.mask() as i32).expect("decode"), read);
        assert!(matches!(decode_mask(-1), Err(StoreError::Unexpected(_))));
        assert!(matches!(decode_mask(1 << 20), Err(StoreError::Unexpected(_))));
    }

    #[test]
    fn identifier_decoding_rejects_wrong_width() {
        let id = Identifier::generate();
        assert_eq!(decode_identifier(&id.to_bytes()).expect("decode"), id);
        assert!(matches!(
            decode_identifier(&[0u8; 15]),
            Err(StoreError::Unexpected(_))
        ));
    }
}
