//! Outbound records produced by one pipeline pass.
//!
//! The processor returns a batch of records alongside the updated checkpoint;
//! the caller publishes them atomically with checkpoint commit. Records are
//! addressed by topic: flow status updates, outbound session messages for the
//! gateway, and scheduling instructions for the wakeup/cleanup scheduler.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::checkpoint::FlowStatus;
use crate::event::{FlowEvent, FlowId, FlowKey, SessionEvent};

// ---------------------------------------------------------------------------
// Topics
// ---------------------------------------------------------------------------

/// Destination topic of an outbound record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordTopic {
    /// Flow status updates for API/RPC observers.
    FlowStatus,
    /// Session messages addressed to peers via the gateway.
    PeerMessaging,
    /// Wakeup and cleanup instructions for the scheduler.
    FlowScheduling,
    /// Self-addressed flow events (immediate wakeups).
    FlowEvent,
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One outbound record: topic, partition key, payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundRecord {
    pub topic: RecordTopic,
    pub key: String,
    pub payload: RecordPayload,
}

/// Payload of an outbound record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecordPayload {
    /// A flow status transition.
    FlowStatus(FlowStatusUpdate),
    /// A session message bound for the counterparty.
    SessionOutbound(SessionEvent),
    /// Purge the flow's state at or after `expiry`.
    ScheduleCleanup { flow_key: FlowKey, expiry: DateTime<Utc> },
    /// Deliver a wakeup event for the flow at or after `deadline`.
    ScheduleWakeup { flow_id: FlowId, deadline: DateTime<Utc> },
    /// A self-addressed flow event driving the next pipeline pass.
    FlowEvent(FlowEvent),
}

/// A flow status transition published on the status topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowStatusUpdate {
    pub flow_key: FlowKey,
    pub flow_id: FlowId,
    pub status: FlowStatus,
    /// Flow result, present for `Completed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Error message, present for `Failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
