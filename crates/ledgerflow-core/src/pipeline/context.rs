//! Per-event working state.
//!
//! A `FlowEventContext` is owned exclusively by the pipeline for the
//! duration of one event and discarded after the processor extracts the
//! final checkpoint and records. One timestamp is resolved per event so a
//! pipeline pass is deterministic.

use chrono::{DateTime, Utc};
use ledgerflow_types::checkpoint::FlowCheckpoint;
use ledgerflow_types::config::FlowEngineConfig;
use ledgerflow_types::event::FlowEvent;
use ledgerflow_types::record::OutboundRecord;

/// Working state for one event against one flow.
#[derive(Debug)]
pub struct FlowEventContext {
    /// The triggering event.
    pub event: FlowEvent,
    /// The checkpoint, mutable during pipeline execution.
    pub checkpoint: FlowCheckpoint,
    /// Records accumulated across the stages, published on commit.
    pub output_records: Vec<OutboundRecord>,
    /// Resolved engine configuration.
    pub config: FlowEngineConfig,
    /// The single timestamp for this pipeline pass.
    pub now: DateTime<Utc>,
}

impl FlowEventContext {
    pub fn new(
        event: FlowEvent,
        checkpoint: FlowCheckpoint,
        config: FlowEngineConfig,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            event,
            checkpoint,
            output_records: Vec::new(),
            config,
            now,
        }
    }

    pub fn push_record(&mut self, record: OutboundRecord) {
        self.output_records.push(record);
    }

    pub fn extend_records(&mut self, records: impl IntoIterator<Item = OutboundRecord>) {
        self.output_records.extend(records);
    }
}
