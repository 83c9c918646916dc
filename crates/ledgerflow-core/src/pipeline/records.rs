//! Outbound record construction.
//!
//! One place builds every record shape the pipeline emits, so topic/key
//! conventions stay consistent: status records are keyed by flow id,
//! session messages by the recipient's session id, scheduling records by
//! flow key or flow id.

use chrono::{DateTime, Utc};
use ledgerflow_types::checkpoint::{FlowCheckpoint, FlowStatus};
use ledgerflow_types::event::{FlowEvent, FlowEventPayload, FlowId, SessionEvent};
use ledgerflow_types::record::{FlowStatusUpdate, OutboundRecord, RecordPayload, RecordTopic};

/// A flow status transition on the status topic.
pub fn flow_status_record(
    checkpoint: &FlowCheckpoint,
    status: FlowStatus,
    result: Option<serde_json::Value>,
    error: Option<String>,
) -> OutboundRecord {
    OutboundRecord {
        topic: RecordTopic::FlowStatus,
        key: checkpoint.flow_id.to_string(),
        payload: RecordPayload::FlowStatus(FlowStatusUpdate {
            flow_key: checkpoint.flow_key.clone(),
            flow_id: checkpoint.flow_id.clone(),
            status,
            result,
            error,
        }),
    }
}

/// A session message bound for the counterparty via the gateway.
pub fn session_outbound_record(event: SessionEvent) -> OutboundRecord {
    OutboundRecord {
        topic: RecordTopic::PeerMessaging,
        key: event.session_id.to_string(),
        payload: RecordPayload::SessionOutbound(event),
    }
}

/// Schedule the purge of this flow's state at or after `expiry`.
pub fn schedule_cleanup_record(
    checkpoint: &FlowCheckpoint,
    expiry: DateTime<Utc>,
) -> OutboundRecord {
    OutboundRecord {
        topic: RecordTopic::FlowScheduling,
        key: checkpoint.flow_key.to_string(),
        payload: RecordPayload::ScheduleCleanup {
            flow_key: checkpoint.flow_key.clone(),
            expiry,
        },
    }
}

/// Schedule a wakeup event for the flow at or after `deadline`.
pub fn schedule_wakeup_record(flow_id: &FlowId, deadline: DateTime<Utc>) -> OutboundRecord {
    OutboundRecord {
        topic: RecordTopic::FlowScheduling,
        key: flow_id.to_string(),
        payload: RecordPayload::ScheduleWakeup {
            flow_id: flow_id.clone(),
            deadline,
        },
    }
}

/// A self-addressed wakeup driving the flow's next pipeline pass.
pub fn self_wakeup_record(flow_id: &FlowId) -> OutboundRecord {
    OutboundRecord {
        topic: RecordTopic::FlowEvent,
        key: flow_id.to_string(),
        payload: RecordPayload::FlowEvent(FlowEvent::new(
            flow_id.clone(),
            FlowEventPayload::Wakeup,
        )),
    }
}
