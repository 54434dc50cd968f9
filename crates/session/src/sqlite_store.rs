//! SQLite-backed key/value store (durable across restarts).

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tokio::sync::Mutex;

use crate::store::{KeyValueStore, StoreError};

/// SQLite-backed [`KeyValueStore`].
///
/// The connection pool is opened lazily on first use; the handle is cheap to
/// clone and share across tasks.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    url: String,
    ephemeral: bool,
    pool: Arc<Mutex<Option<SqlitePool>>>,
}

impl SqliteStore {
    /// Store backed by the database at `path` (created if missing).
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            url: format!("sqlite://{}", path.to_string_lossy()),
            ephemeral: false,
            pool: Arc::new(Mutex::new(None)),
        }
    }

    /// Store backed by `{app_data_dir}/tradelink/session.db`.
    pub fn at_default_location() -> Result<Self, StoreError> {
        store_db_path().map(Self::open).map_err(backend)
    }

    /// Private in-memory database; contents vanish with the handle.
    pub fn in_memory() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            ephemeral: true,
            pool: Arc::new(Mutex::new(None)),
        }
    }

    /// Get the pool, initializing it (and the schema) if necessary.
    async fn pool(&self) -> anyhow::Result<SqlitePool> {
        let mut pool_guard = self.pool.lock().await;
        if let Some(pool) = pool_guard.as_ref() {
            return Ok(pool.clone());
        }

        let options = SqliteConnectOptions::from_str(&self.url)
            .with_context(|| format!("invalid SQLite url {}", self.url))?
            .create_if_missing(true);

        // An in-memory database lives exactly as long as its single connection.
        let pool_options = if self.ephemeral {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>)
        } else {
            SqlitePoolOptions::new().max_connections(4)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .with_context(|| format!("failed to open SQLite store at {}", self.url))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv_store (
                key   TEXT PRIMARY KEY NOT NULL,
                value TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .context("failed to create kv_store table")?;

        *pool_guard = Some(pool.clone());
        Ok(pool)
    }

    async fn read(&self, key: &str) -> anyhow::Result<Option<String>> {
        let pool = self.pool().await?;
        let row = sqlx::query("SELECT value FROM kv_store WHERE key = ?1")
            .bind(key)
            .fetch_optional(&pool)
            .await
            .context("failed to read key")?;
        row.map(|row| row.try_get::<String, _>("value"))
            .transpose()
            .context("malformed kv_store row")
    }

    async fn upsert(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let pool = self.pool().await?;
        sqlx::query(
            r#"
            INSERT INTO kv_store (key, value)
            VALUES (?1, ?2)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&pool)
        .await
        .context("failed to upsert key")?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        let pool = self.pool().await?;
        sqlx::query("DELETE FROM kv_store WHERE key = ?1")
            .bind(key)
            .execute(&pool)
            .await
            .context("failed to delete key")?;
        Ok(())
    }

    async fn list_keys(&self) -> anyhow::Result<Vec<String>> {
        let pool = self.pool().await?;
        let rows = sqlx::query("SELECT key FROM kv_store ORDER BY key")
            .fetch_all(&pool)
            .await
            .context("failed to list keys")?;
        rows.iter()
            .map(|row| row.try_get::<String, _>("key").context("malformed kv_store row"))
            .collect()
    }
}

fn backend(err: anyhow::Error) -> StoreError {
    tracing::error!("sqlite store failure: {err:?}");
    StoreError::Backend(format!("{err:#}"))
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.read(key).await.map_err(backend)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.upsert(key, value).await.map_err(backend)
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.delete(key).await.map_err(backend)
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        self.list_keys().await.map_err(backend)
    }
}

/// Resolve the path to the SQLite store:
/// `{app_data_dir}/tradelink/session.db`.
fn store_db_path() -> anyhow::Result<PathBuf> {
    let base = dirs::data_dir()
        .or_else(|| {
            dirs::home_dir().map(|mut h| {
                h.push(".local");
                h.push("share");
                h
            })
        })
        .context("failed to resolve OS app data directory - tried data_dir() and home_dir()/.local/share")?;

    let mut dir = base;
    dir.push("tradelink");

    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create store directory at {:?}", dir))?;

    dir.push("session.db");
    Ok(dir)
}
