//! Checkpoint store port.
//!
//! Defines the storage interface for flow checkpoints. The infrastructure
//! layer (ledgerflow-infra) implements this trait with SQLite persistence
//! and an in-memory variant for tests and embedded use.
//!
//! Uses native async fn in traits (Rust 2024 edition, no async_trait macro).

use chrono::{DateTime, Utc};
use ledgerflow_types::checkpoint::FlowCheckpoint;
use ledgerflow_types::error::StoreError;
use ledgerflow_types::event::FlowId;

/// Repository trait for checkpoint persistence.
///
/// The processor itself never touches the store: the surrounding worker
/// reads the checkpoint before invoking it and commits the returned one
/// atomically with event consumption.
pub trait CheckpointStore: Send + Sync {
    /// Get the checkpoint for a flow, tombstoned or not.
    fn get(
        &self,
        flow_id: &FlowId,
    ) -> impl std::future::Future<Output = Result<Option<FlowCheckpoint>, StoreError>> + Send;

    /// Upsert a checkpoint (insert or replace by flow id).
    fn put(
        &self,
        checkpoint: &FlowCheckpoint,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Delete a checkpoint by flow id. Returns `true` if it existed.
    fn delete(
        &self,
        flow_id: &FlowId,
    ) -> impl std::future::Future<Output = Result<bool, StoreError>> + Send;

    /// Checkpoints of live (non-tombstoned) flows, for crash-recovery
    /// sweeps that re-arm wakeup deadlines after a restart.
    fn list_active(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<FlowCheckpoint>, StoreError>> + Send;

    /// Flow ids of tombstoned checkpoints whose cleanup expiry has passed.
    fn list_expired(
        &self,
        now: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<Vec<FlowId>, StoreError>> + Send;
}
