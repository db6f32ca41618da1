//! SQLite-backed key-value store
//!
//! One `kv_store(key, value)` table. `update_all` runs in a transaction opened
//! with `BEGIN IMMEDIATE`, so the write lock is held from the first read and
//! writers in other processes wait on the busy timeout.

use super::{BlobUpdate, KeyValueStore};
use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{SqliteConnection, SqlitePool};
use std::path::Path;
use tripai_common::Result;

pub struct SqliteKvStore {
    pool: SqlitePool,
}

impl SqliteKvStore {
    /// Open (or create) the database file and ensure the table exists
    pub async fn open(db_path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // mode=rwc: read, write, create
        let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
        tracing::debug!("Connecting to database: {}", db_url);

        let pool = SqlitePool::connect(&db_url).await?;
        Self::from_pool(pool).await
    }

    /// Private in-memory database; a single connection keeps it one database
    pub async fn open_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

async fn select_value(conn: &mut SqliteConnection, key: &str) -> Result<Option<String>> {
    let row: Option<(String,)> = sqlx::query_as("SELECT value FROM kv_store WHERE key = ?")
        .bind(key)
        .fetch_optional(conn)
        .await?;

    Ok(row.map(|(value,)| value))
}

async fn upsert_value(conn: &mut SqliteConnection, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO kv_store (key, value) VALUES (?, ?)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value
        "#,
    )
    .bind(key)
    .bind(value)
    .execute(conn)
    .await?;
    Ok(())
}

#[async_trait]
impl KeyValueStore for SqliteKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.pool.acquire().await?;
        select_value(&mut conn, key).await
    }

    async fn update_all(&self, keys: &[&str], f: BlobUpdate<'_>) -> Result<()> {
        // Dropping `tx` before commit rolls back
        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;

        let mut current = Vec::with_capacity(keys.len());
        for key in keys {
            current.push(select_value(&mut tx, key).await?);
        }

        let values = f(current)?;
        for (key, value) in keys.iter().zip(&values) {
            upsert_value(&mut tx, key, value).await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
