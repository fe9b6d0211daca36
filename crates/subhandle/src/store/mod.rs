//! SQLite-backed storage for handle bindings.
//!
//! A binding maps one identity (DID) to one chosen label. The table carries no
//! uniqueness constraint; [`HandleStore::bind`] keeps one row per identity by
//! checking for an existing row first and updating it in place.

use crate::{Did, HandleLabel, Result};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

/// SQLite schema (embedded).
const SQLITE_SCHEMA: &str = include_str!("schema.sql");

fn schema_statements(schema: &str) -> Vec<&str> {
    schema
        .split(';')
        .filter_map(|statement| {
            let trimmed = statement.trim();
            let has_sql = trimmed.lines().any(|line| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with("--")
            });
            has_sql.then_some(trimmed)
        })
        .collect()
}

/// A stored identity to label association.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HandleBinding {
    pub did: Did,
    pub handle: String,
}

/// Whether [`HandleStore::bind`] created a row or rewrote an existing one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BindAction {
    Inserted,
    Updated,
}

#[derive(sqlx::FromRow)]
struct HandleRow {
    did: String,
    handle_name: String,
}

impl From<HandleRow> for HandleBinding {
    fn from(row: HandleRow) -> Self {
        Self {
            did: Did::from_stored(row.did),
            handle: row.handle_name,
        }
    }
}

#[derive(Clone, Debug)]
pub struct HandleStore {
    pool: SqlitePool,
}

impl HandleStore {
    /// Open (creating if missing) the database at `url` and apply the schema.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let opts = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await?;
        tracing::info!(url, max_connections, "Connected to SQLite handle store");

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Private in-memory database. Uses a single connection that is never
    /// recycled, since each SQLite memory connection is its own database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        for statement in schema_statements(SQLITE_SCHEMA) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Bind `label` to `did`, overwriting any label the identity already has.
    ///
    /// Another identity holding the same label is not checked for.
    #[tracing::instrument(level = "debug", skip_all, fields(did = %did, label = %label))]
    pub async fn bind(&self, did: &Did, label: &HandleLabel) -> Result<(HandleBinding, BindAction)> {
        let mut tx = self.pool.begin().await?;

        let count: i64 = sqlx::query_scalar("SELECT count(1) FROM handles WHERE did = ?1")
            .bind(did.as_str())
            .fetch_one(&mut *tx)
            .await?;

        let action = if count > 0 {
            sqlx::query("UPDATE handles SET handle_name = ?1 WHERE did = ?2")
                .bind(label.as_str())
                .bind(did.as_str())
                .execute(&mut *tx)
                .await?;
            BindAction::Updated
        } else {
            sqlx::query("INSERT INTO handles (did, handle_name) VALUES (?1, ?2)")
                .bind(did.as_str())
                .bind(label.as_str())
                .execute(&mut *tx)
                .await?;
            BindAction::Inserted
        };

        tx.commit().await?;

        let binding = HandleBinding {
            did: did.clone(),
            handle: label.as_str().to_string(),
        };
        Ok((binding, action))
    }

    /// Identity bound to `label`, compared case-insensitively.
    pub async fn lookup(&self, label: &str) -> Result<Option<Did>> {
        let did: Option<String> = sqlx::query_scalar(
            "SELECT did FROM handles WHERE handle_name = ?1 COLLATE NOCASE LIMIT 1",
        )
        .bind(label)
        .fetch_optional(&self.pool)
        .await?;
        Ok(did.map(Did::from_stored))
    }

    pub async fn binding_for(&self, did: &Did) -> Result<Option<HandleBinding>> {
        let row = sqlx::query_as::<_, HandleRow>(
            "SELECT did, handle_name FROM handles WHERE did = ?1 LIMIT 1",
        )
        .bind(did.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(HandleBinding::from))
    }

    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
