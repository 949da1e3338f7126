use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::PgPool;

use crate::store::{Checkpoint, CheckpointStore, StoreError};

/// Checkpoints in a single `waymark_checkpoints` table, one row per key,
/// snapshot stored as jsonb. Row upserts give the same crash guarantee the
/// file backend gets from rename.
pub struct PostgresCheckpointStore {
    pool: PgPool,
}

impl PostgresCheckpointStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
CREATE TABLE IF NOT EXISTS waymark_checkpoints (
    key        TEXT PRIMARY KEY,
    data       JSONB NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
)
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for PostgresCheckpointStore {
    async fn save(&self, key: &str, checkpoint: &Checkpoint) -> Result<(), StoreError> {
        let data =
            serde_json::to_value(checkpoint).map_err(|e| StoreError::Other(e.to_string()))?;
        sqlx::query(
            r#"
INSERT INTO waymark_checkpoints (key, data, updated_at)
VALUES ($1, $2, now())
ON CONFLICT (key) DO UPDATE SET data = EXCLUDED.data, updated_at = now()
            "#,
        )
        .bind(key)
        .bind(data)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Option<Checkpoint>, StoreError> {
        let row: Option<JsonValue> = sqlx::query_scalar(
            r#"
SELECT data FROM waymark_checkpoints WHERE key = $1
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(data) => {
                let checkpoint = serde_json::from_value(data)
                    .map_err(|e| StoreError::Corrupt(format!("key '{key}': {e}")))?;
                Ok(Some(checkpoint))
            }
            None => Ok(None),
        }
    }

    async fn clear(&self, key: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
DELETE FROM waymark_checkpoints WHERE key = $1
            "#,
        )
        .bind(key)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
