use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqliteConnection};
use tokio::sync::Mutex;

use super::{Bucket, DataStore, Entries, PluginStore, RawUpdateFn, StoreError, UpdateFn};
use crate::DbPool;

/// Sqlite-backed store. One writer transaction runs at a time across every namespace.
#[derive(Clone)]
pub struct SqlDataStore {
    pool: DbPool,
    writer: Arc<Mutex<()>>,
}

impl SqlDataStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool, writer: Arc::new(Mutex::new(())) }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl DataStore for SqlDataStore {
    async fn init_namespace(&self, plugin_id: &str) -> Result<(), StoreError> {
        let _writer = self.writer.lock().await;
        sqlx::query(
            "INSERT INTO plugin_namespace (plugin_id, created_at) VALUES (?, ?)
             ON CONFLICT(plugin_id) DO NOTHING",
        )
        .bind(plugin_id)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn plugin_store(&self, plugin_id: &str) -> Arc<dyn PluginStore> {
        Arc::new(SqlPluginStore {
            plugin_id: plugin_id.to_owned(),
            pool: self.pool.clone(),
            writer: Arc::clone(&self.writer),
        })
    }

    async fn ping(&self) -> Result<(), StoreError> {
        crate::connection::ping(&self.pool).await.map_err(StoreError::from)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

struct SqlPluginStore {
    plugin_id: String,
    pool: DbPool,
    writer: Arc<Mutex<()>>,
}

async fn ensure_namespace(conn: &mut SqliteConnection, plugin_id: &str) -> Result<(), StoreError> {
    let found = sqlx::query("SELECT 1 FROM plugin_namespace WHERE plugin_id = ?")
        .bind(plugin_id)
        .fetch_optional(&mut *conn)
        .await?;
    match found {
        Some(_) => Ok(()),
        None => Err(StoreError::UnknownNamespace(plugin_id.to_owned())),
    }
}

async fn select_value(
    conn: &mut SqliteConnection,
    plugin_id: &str,
    key: &str,
) -> Result<Option<Vec<u8>>, StoreError> {
    let row = sqlx::query("SELECT value FROM plugin_kv WHERE plugin_id = ? AND key = ?")
        .bind(plugin_id)
        .bind(key)
        .fetch_optional(&mut *conn)
        .await?;
    row.map(|row| row.try_get::<Vec<u8>, _>("value")).transpose().map_err(StoreError::from)
}

async fn upsert_value(
    conn: &mut SqliteConnection,
    plugin_id: &str,
    key: &str,
    value: &[u8],
) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO plugin_kv (plugin_id, key, value, updated_at) VALUES (?, ?, ?, ?)
         ON CONFLICT(plugin_id, key) DO UPDATE
         SET value = excluded.value, updated_at = excluded.updated_at",
    )
    .bind(plugin_id)
    .bind(key)
    .bind(value)
    .bind(Utc::now().to_rfc3339())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn select_entries(
    conn: &mut SqliteConnection,
    plugin_id: &str,
) -> Result<Entries, StoreError> {
    let rows = sqlx::query("SELECT key, value FROM plugin_kv WHERE plugin_id = ? ORDER BY key")
        .bind(plugin_id)
        .fetch_all(&mut *conn)
        .await?;

    let mut entries = Entries::new();
    for row in rows {
        entries.insert(row.try_get("key")?, row.try_get("value")?);
    }
    Ok(entries)
}

#[async_trait]
impl PluginStore for SqlPluginStore {
    fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        select_value(&mut conn, &self.plugin_id, key).await
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        let _writer = self.writer.lock().await;
        let mut tx = self.pool.begin().await?;
        ensure_namespace(&mut tx, &self.plugin_id).await?;
        upsert_value(&mut tx, &self.plugin_id, key, &value).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_and_update(
        &self,
        key: &str,
        update: UpdateFn,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        let _writer = self.writer.lock().await;
        let mut tx = self.pool.begin().await?;
        ensure_namespace(&mut tx, &self.plugin_id).await?;

        let current = select_value(&mut tx, &self.plugin_id, key).await?;
        let stored = match update(current.as_deref())? {
            Some(next) => {
                upsert_value(&mut tx, &self.plugin_id, key, &next).await?;
                Some(next)
            }
            None => current,
        };

        tx.commit().await?;
        Ok(stored)
    }

    async fn update_raw(&self, update: RawUpdateFn) -> Result<(), StoreError> {
        let _writer = self.writer.lock().await;
        let mut tx = self.pool.begin().await?;
        ensure_namespace(&mut tx, &self.plugin_id).await?;

        let mut bucket = Bucket::new(select_entries(&mut tx, &self.plugin_id).await?);
        update(&mut bucket)?;

        for (key, change) in bucket.into_changes() {
            match change {
                Some(value) => upsert_value(&mut tx, &self.plugin_id, &key, &value).await?,
                None => {
                    sqlx::query("DELETE FROM plugin_kv WHERE plugin_id = ? AND key = ?")
                        .bind(&self.plugin_id)
                        .bind(&key)
                        .execute(&mut *tx)
                        .await?;
                }
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn entries(&self) -> Result<Entries, StoreError> {
        let mut conn = self.pool.acquire().await?;
        select_entries(&mut conn, &self.plugin_id).await
    }
}
