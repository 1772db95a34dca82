//! Named savepoints over a live Postgres connection.
//!
//! A [`Savepoint`] wraps an already-open connection (usually one inside a
//! `sqlx::Transaction`) and gives handlers a scoped unit of work that can be
//! committed or rolled back on its own. Savepoint names are fresh random
//! identifiers, so nested savepoints never collide.
//!
//! Begin, commit and rollback failures mean the connection is in an unknown
//! state. They are logged at error level and returned as
//! [`TransactionError`]; callers must abort the request rather than retry on
//! the same connection.
use sqlx::PgConnection;
use thiserror::Error;
use warden_common::ids::Identifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SavepointStage {
    Begin,
    Commit,
    Rollback,
}

impl std::fmt::Display for SavepointStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            SavepointStage::Begin => "begin",
            SavepointStage::Commit => "commit",
            SavepointStage::Rollback => "rollback",
        })
    }
}

#[derive(Debug, Error)]
#[error("savepoint {name} {stage} failed: {source}")]
pub struct TransactionError {
    pub stage: SavepointStage,
    pub name: String,
    #[source]
    pub source: sqlx::Error,
}

#[derive(Debug)]
pub struct Savepoint<'c> {
    conn: &'c mut PgConnection,
    name: String,
    finished: bool,
}

impl<'c> Savepoint<'c> {
    /// Open a savepoint with a random name on `conn`.
    pub async fn begin(conn: &'c mut PgConnection) -> Result<Self, TransactionError> {
        let name = savepoint_name();
        run(conn, SavepointStage::Begin, &name, &format!("SAVEPOINT {name}")).await?;
        tracing::trace!(savepoint = %name, "savepoint opened");
        Ok(Self {
            conn,
            name,
            finished: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Connection to run statements on inside this savepoint.
    pub fn connection(&mut self) -> &mut PgConnection {
        &mut *self.conn
    }

    /// Open a savepoint nested inside this one.
    pub async fn nested(&mut self) -> Result<Savepoint<'_>, TransactionError> {
        Savepoint::begin(&mut *self.conn).await
    }

    pub async fn commit(mut self) -> Result<(), TransactionError> {
        let sql = format!("RELEASE SAVEPOINT {}", self.name);
        run(&mut *self.conn, SavepointStage::Commit, &self.name, &sql).await?;
        self.finished = true;
        Ok(())
    }

    pub async fn rollback(mut self) -> Result<(), TransactionError> {
        let sql = format!("ROLLBACK TO SAVEPOINT {}", self.name);
        run(&mut *self.conn, SavepointStage::Rollback, &self.name, &sql).await?;
        self.finished = true;
        Ok(())
    }
}

impl Drop for Savepoint<'_> {
    fn drop(&mut self) {
        if !self.finished {
            // Left open: the enclosing transaction decides its fate.
            tracing::warn!(savepoint = %self.name, "savepoint dropped without commit or rollback");
        }
    }
}

/// Fresh savepoint name: `sp_` plus 32 lowercase hex characters, always a
/// valid unquoted SQL identifier.
fn savepoint_name() -> String {
    format!("sp_{}", Identifier::generate())
}

async fn run(
    conn: &mut PgConnection,
    stage: SavepointStage,
    name: &str,
    sql: &str,
) -> Result<(), TransactionError> {
    sqlx::raw_sql(sql)
        .execute(conn)
        .await
        .map(|_| ())
        .map_err(|source| {
            tracing::error!(savepoint = %name, %stage, error = %source, "savepoint failed");
            TransactionError {
                stage,
                name: name.to_string(),
                source,
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn savepoint_names_are_fresh_sql_identifiers() {
        let outer = savepoint_name();
        let nested = savepoint_name();
        assert_ne!(outer, nested);
        for name in [&outer, &nested] {
            let suffix = name.strip_prefix("sp_").expect("sp_ prefix");
            assert_eq!(suffix.len(), 32);
            assert!(
                suffix
                    .chars()
                    .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
            );
        }
    }

    #[test]
    fn error_names_stage_and_savepoint() {
        let err = TransactionError {
            stage: SavepointStage::Rollback,
            name: "sp_x".to_string(),
            source: sqlx::Error::PoolClosed,
        };
        let rendered = err.to_string();
        assert!(rendered.contains("sp_x"));
        assert!(rendered.contains("rollback"));
    }
}
