//! In-memory checkpoint store for tests and embedded use.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use ledgerflow_core::store::CheckpointStore;
use ledgerflow_types::checkpoint::FlowCheckpoint;
use ledgerflow_types::error::StoreError;
use ledgerflow_types::event::FlowId;

/// `DashMap`-backed implementation of `CheckpointStore`.
#[derive(Default)]
pub struct InMemoryCheckpointStore {
    checkpoints: DashMap<FlowId, FlowCheckpoint>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self {
            checkpoints: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.checkpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty()
    }
}

impl CheckpointStore for InMemoryCheckpointStore {
    async fn get(&self, flow_id: &FlowId) -> Result<Option<FlowCheckpoint>, StoreError> {
        Ok(self
            .checkpoints
            .get(flow_id)
            .map(|entry| entry.value().clone()))
    }

    async fn put(&self, checkpoint: &FlowCheckpoint) -> Result<(), StoreError> {
        self.checkpoints
            .insert(checkpoint.flow_id.clone(), checkpoint.clone());
        Ok(())
    }

    async fn delete(&self, flow_id: &FlowId) -> Result<bool, StoreError> {
        Ok(self.checkpoints.remove(flow_id).is_some())
    }

    async fn list_active(&self) -> Result<Vec<FlowCheckpoint>, StoreError> {
        Ok(self
            .checkpoints
            .iter()
            .filter(|entry| !entry.marked_for_deletion)
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<FlowId>, StoreError> {
        Ok(self
            .checkpoints
            .iter()
            .filter(|entry| entry.is_expired(now))
            .map(|entry| entry.flow_id.clone())
            .collect())
    }
}
