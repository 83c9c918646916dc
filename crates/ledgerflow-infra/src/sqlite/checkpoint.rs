//! SQLite checkpoint store implementation.
//!
//! Implements `CheckpointStore` from `ledgerflow-core` using sqlx with split
//! read/write pools. The checkpoint body is stored as a JSON blob; status,
//! tombstone flag, and cleanup expiry are extracted into columns for the
//! recovery and janitor queries.

use chrono::{DateTime, Utc};
use ledgerflow_core::store::CheckpointStore;
use ledgerflow_types::checkpoint::FlowCheckpoint;
use ledgerflow_types::error::StoreError;
use ledgerflow_types::event::FlowId;
use sqlx::Row;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `CheckpointStore`.
pub struct SqliteCheckpointStore {
    pool: DatabasePool,
}

impl SqliteCheckpointStore {
    /// Create a new store backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Internal row type
// ---------------------------------------------------------------------------

struct CheckpointRow {
    checkpoint: String,
}

impl CheckpointRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            checkpoint: row.try_get("checkpoint")?,
        })
    }

    fn into_checkpoint(self) -> Result<FlowCheckpoint, StoreError> {
        serde_json::from_str(&self.checkpoint)
            .map_err(|e| StoreError::Query(format!("invalid checkpoint JSON: {e}")))
    }
}

fn parse_flow_id(raw: &str) -> Result<FlowId, StoreError> {
    raw.parse()
        .map_err(|_| StoreError::Query(format!("invalid flow id: {raw}")))
}

// ---------------------------------------------------------------------------
// CheckpointStore impl
// ---------------------------------------------------------------------------

impl CheckpointStore for SqliteCheckpointStore {
    async fn get(&self, flow_id: &FlowId) -> Result<Option<FlowCheckpoint>, StoreError> {
        let row = sqlx::query("SELECT checkpoint FROM flow_checkpoints WHERE flow_id = ?")
            .bind(flow_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        row.map(|row| {
            CheckpointRow::from_row(&row)
                .map_err(|e| StoreError::Query(e.to_string()))?
                .into_checkpoint()
        })
        .transpose()
    }

    async fn put(&self, checkpoint: &FlowCheckpoint) -> Result<(), StoreError> {
        let body = serde_json::to_string(checkpoint)
            .map_err(|e| StoreError::Query(format!("checkpoint serialization: {e}")))?;
        let status = serde_json::to_value(checkpoint.status)
            .ok()
            .and_then(|value| value.as_str().map(str::to_string))
            .unwrap_or_else(|| "running".to_string());

        sqlx::query(
            r#"
            INSERT INTO flow_checkpoints
                (flow_id, flow_key, status, marked_for_deletion, cleanup_expiry, checkpoint, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(flow_id) DO UPDATE SET
                flow_key = excluded.flow_key,
                status = excluded.status,
                marked_for_deletion = excluded.marked_for_deletion,
                cleanup_expiry = excluded.cleanup_expiry,
                checkpoint = excluded.checkpoint,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(checkpoint.flow_id.to_string())
        .bind(checkpoint.flow_key.to_string())
        .bind(status)
        .bind(checkpoint.marked_for_deletion)
        .bind(checkpoint.cleanup_expiry.map(|expiry| expiry.to_rfc3339()))
        .bind(body)
        .bind(checkpoint.last_updated_at.to_rfc3339())
        .execute(&self.pool.writer)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        Ok(())
    }

    async fn delete(&self, flow_id: &FlowId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM flow_checkpoints WHERE flow_id = ?")
            .bind(flow_id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_active(&self) -> Result<Vec<FlowCheckpoint>, StoreError> {
        let rows = sqlx::query(
            "SELECT checkpoint FROM flow_checkpoints WHERE marked_for_deletion = 0 ORDER BY flow_id",
        )
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        rows.iter()
            .map(|row| {
                CheckpointRow::from_row(row)
                    .map_err(|e| StoreError::Query(e.to_string()))?
                    .into_checkpoint()
            })
            .collect()
    }

    async fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<FlowId>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT flow_id FROM flow_checkpoints
            WHERE marked_for_deletion = 1 AND cleanup_expiry IS NOT NULL AND cleanup_expiry <= ?
            ORDER BY flow_id
            "#,
        )
        .bind(now.to_rfc3339())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        rows.iter()
            .map(|row| {
                let raw: String = row
                    .try_get("flow_id")
                    .map_err(|e| StoreError::Query(e.to_string()))?;
                parse_flow_id(&raw)
            })
            .collect()
    }
}
