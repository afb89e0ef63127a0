// src/store/sqlite.rs

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tokio::sync::Mutex;

use super::{
    Document, DocumentStore, Filter, ServerTimestamp, StoreError, Subscription, WatcherRegistry,
    merge_patch,
};

/// Document store persisted in a single SQLite table.
///
/// Writes are serialized so that the state pushed to subscribers after each
/// write is never older than the state pushed before it.
pub struct SqliteStore {
    pool: SqlitePool,
    watchers: WatcherRegistry,
    writes: Mutex<()>,
    probe_id: String,
}

impl SqliteStore {
    /// Connects (creating the database file if needed) and applies migrations.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        // Every connection to `:memory:` is a separate database, so keep exactly one alive.
        let in_memory = database_url.contains(":memory:");
        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 5 })
            .acquire_timeout(Duration::from_secs(3))
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!("Document store migrations applied.");
        Ok(Self {
            pool,
            watchers: WatcherRegistry::new(),
            writes: Mutex::new(()),
            probe_id: uuid::Uuid::new_v4().to_string(),
        })
    }

    async fn load(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT id, data FROM documents WHERE collection = ? ORDER BY id",
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(id, data)| {
                Ok(Document {
                    id,
                    data: serde_json::from_str(&data)?,
                })
            })
            .collect()
    }

    async fn publish(&self, collection: &str) -> Result<(), StoreError> {
        if self.watchers.is_watching(collection) {
            let docs = self.load(collection).await?;
            self.watchers.publish(collection, &docs);
        }
        Ok(())
    }

    /// Read-merge-write inside a transaction, optionally guarded by `precondition`.
    async fn patch(
        &self,
        collection: &str,
        id: &str,
        precondition: Option<&Filter>,
        patch: Value,
    ) -> Result<bool, StoreError> {
        let _guard = self.writes.lock().await;
        let mut tx = self.pool.begin().await?;

        let row: Option<(String,)> =
            sqlx::query_as("SELECT data FROM documents WHERE collection = ? AND id = ?")
                .bind(collection)
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some((raw,)) = row else {
            return Err(StoreError::not_found(collection, id));
        };

        let mut data: Value = serde_json::from_str(&raw)?;
        if let Some(precondition) = precondition {
            if !precondition.matches(&data) {
                return Ok(false);
            }
        }
        merge_patch(&mut data, &patch)?;

        sqlx::query("UPDATE documents SET data = ?, updated_at = ? WHERE collection = ? AND id = ?")
            .bind(data.to_string())
            .bind(chrono::Utc::now().timestamp_millis())
            .bind(collection)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        self.publish(collection).await?;
        Ok(true)
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn create(&self, collection: &str, data: Value) -> Result<String, StoreError> {
        let id = uuid::Uuid::new_v4().to_string();
        self.insert(collection, &id, data).await?;
        Ok(id)
    }

    async fn insert(&self, collection: &str, id: &str, data: Value) -> Result<(), StoreError> {
        if !data.is_object() {
            return Err(StoreError::Serialization(
                "documents must be JSON objects".to_string(),
            ));
        }
        let _guard = self.writes.lock().await;
        sqlx::query("INSERT INTO documents (collection, id, data, updated_at) VALUES (?, ?, ?, ?)")
            .bind(collection)
            .bind(id)
            .bind(data.to_string())
            .bind(chrono::Utc::now().timestamp_millis())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if matches!(&e, sqlx::Error::Database(db) if db.is_unique_violation()) {
                    StoreError::AlreadyExists {
                        collection: collection.to_string(),
                        id: id.to_string(),
                    }
                } else {
                    StoreError::from(e)
                }
            })?;
        self.publish(collection).await
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT data FROM documents WHERE collection = ? AND id = ?")
                .bind(collection)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(|(data,)| {
            Ok(Document {
                id: id.to_string(),
                data: serde_json::from_str(&data)?,
            })
        })
        .transpose()
    }

    async fn update(&self, collection: &str, id: &str, patch: Value) -> Result<(), StoreError> {
        self.patch(collection, id, None, patch).await.map(|_| ())
    }

    async fn update_if(
        &self,
        collection: &str,
        id: &str,
        precondition: &Filter,
        patch: Value,
    ) -> Result<bool, StoreError> {
        self.patch(collection, id, Some(precondition), patch).await
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let _guard = self.writes.lock().await;
        let result = sqlx::query("DELETE FROM documents WHERE collection = ? AND id = ?")
            .bind(collection)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() > 0 {
            self.publish(collection).await?;
        }
        Ok(())
    }

    async fn get_all(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>, StoreError> {
        Ok(self
            .load(collection)
            .await?
            .into_iter()
            .filter(|doc| filter.matches_document(doc))
            .collect())
    }

    async fn subscribe(&self, collection: &str, filter: Filter) -> Result<Subscription, StoreError> {
        // Hold the write lock so no write slips between the load and the registration.
        let _guard = self.writes.lock().await;
        let docs = self.load(collection).await?;
        Ok(self.watchers.register(collection, filter, &docs))
    }

    async fn server_timestamp(&self) -> Result<ServerTimestamp, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO clock_probes (probe_id, server_ms)
            VALUES (?, CAST((julianday('now') - 2440587.5) * 86400000.0 AS INTEGER))
            ON CONFLICT(probe_id) DO UPDATE SET server_ms = excluded.server_ms
            "#,
        )
        .bind(&self.probe_id)
        .execute(&self.pool)
        .await?;

        let (server_ms,): (i64,) =
            sqlx::query_as("SELECT server_ms FROM clock_probes WHERE probe_id = ?")
                .bind(&self.probe_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(ServerTimestamp::from_epoch_millis(server_ms))
    }
}
