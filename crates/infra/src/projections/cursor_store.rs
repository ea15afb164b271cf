//! Projection cursor/checkpoint persistence.
//!
//! This module persists the runner's cursor (highest block applied plus the
//! log indices applied inside it) per projection name. This enables:
//! - Resume after crash (the source restarts from the checkpoint block)
//! - Skipping exact redeliveries across restarts
//! - Deterministic rebuilds (clear the cursor and replay from the start block)

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use sqlx::{PgPool, Row};

use pkgmg_events::ProjectionCursor;

use crate::read_model::StoreError;
use crate::read_model::postgres::store_error;

/// Projection cursor store for persisting checkpoints.
#[async_trait]
pub trait CursorStore: Send + Sync {
    /// Load the saved cursor for a projection, if any.
    async fn load(&self, projection_name: &str) -> Result<Option<ProjectionCursor>, StoreError>;

    /// Replace the saved cursor.
    async fn save(&self, projection_name: &str, cursor: &ProjectionCursor) -> Result<(), StoreError>;

    /// Forget the cursor (for rebuilds).
    async fn clear(&self, projection_name: &str) -> Result<(), StoreError>;
}

#[async_trait]
impl<C> CursorStore for Arc<C>
where
    C: CursorStore + ?Sized,
{
    async fn load(&self, projection_name: &str) -> Result<Option<ProjectionCursor>, StoreError> {
        (**self).load(projection_name).await
    }

    async fn save(&self, projection_name: &str, cursor: &ProjectionCursor) -> Result<(), StoreError> {
        (**self).save(projection_name, cursor).await
    }

    async fn clear(&self, projection_name: &str) -> Result<(), StoreError> {
        (**self).clear(projection_name).await
    }
}

/// In-memory cursor store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryCursorStore {
    cursors: RwLock<HashMap<String, ProjectionCursor>>,
}

impl InMemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CursorStore for InMemoryCursorStore {
    async fn load(&self, projection_name: &str) -> Result<Option<ProjectionCursor>, StoreError> {
        let cursors = self
            .cursors
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;
        Ok(cursors.get(projection_name).cloned())
    }

    async fn save(&self, projection_name: &str, cursor: &ProjectionCursor) -> Result<(), StoreError> {
        let mut cursors = self
            .cursors
            .write()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;
        cursors.insert(projection_name.to_string(), cursor.clone());
        Ok(())
    }

    async fn clear(&self, projection_name: &str) -> Result<(), StoreError> {
        let mut cursors = self
            .cursors
            .write()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;
        cursors.remove(projection_name);
        Ok(())
    }
}

/// Postgres-backed projection cursor store.
///
/// Applied log indices are kept as a JSON array next to the block number.
#[derive(Debug, Clone)]
pub struct PostgresCursorStore {
    pool: PgPool,
}

impl PostgresCursorStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS projection_cursors (
                projection_name     TEXT PRIMARY KEY,
                block_number        BIGINT NOT NULL,
                applied_log_indices TEXT NOT NULL,
                updated_at          TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(())
    }
}

#[async_trait]
impl CursorStore for PostgresCursorStore {
    async fn load(&self, projection_name: &str) -> Result<Option<ProjectionCursor>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT block_number, applied_log_indices
            FROM projection_cursors
            WHERE projection_name = $1
            "#,
        )
        .bind(projection_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let block: i64 = row
            .try_get("block_number")
            .map_err(store_error)?;
        let indices: String = row
            .try_get("applied_log_indices")
            .map_err(store_error)?;
        let indices: Vec<u32> = serde_json::from_str(&indices)
            .map_err(|e| StoreError::Corrupt(format!("cursor {projection_name}: {e}")))?;
        let block = u64::try_from(block)
            .map_err(|_| StoreError::Corrupt(format!("cursor {projection_name}: negative block")))?;

        Ok(Some(ProjectionCursor::new(block, indices)))
    }

    async fn save(&self, projection_name: &str, cursor: &ProjectionCursor) -> Result<(), StoreError> {
        let block = i64::try_from(cursor.block_number())
            .map_err(|_| StoreError::Corrupt(format!("cursor {projection_name}: block out of range")))?;
        let indices = serde_json::to_string(cursor.applied_log_indices())
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO projection_cursors (projection_name, block_number, applied_log_indices)
            VALUES ($1, $2, $3)
            ON CONFLICT (projection_name)
            DO UPDATE SET
                block_number = EXCLUDED.block_number,
                applied_log_indices = EXCLUDED.applied_log_indices,
                updated_at = NOW()
            "#,
        )
        .bind(projection_name)
        .bind(block)
        .bind(indices)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(())
    }

    async fn clear(&self, projection_name: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM projection_cursors WHERE projection_name = $1")
            .bind(projection_name)
            .execute(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(())
    }
}
