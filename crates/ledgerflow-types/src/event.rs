//! Inbound event types for the flow engine.
//!
//! A `FlowEvent` is one record delivered on the flow-id-partitioned event
//! topic. All events for a given flow id arrive in order; the engine assumes
//! at-least-once delivery and folds every event idempotently.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::identity::PartyIdentity;
use crate::session::SessionId;

// ---------------------------------------------------------------------------
// FlowId / FlowKey
// ---------------------------------------------------------------------------

/// Unique identifier for a flow instance, wrapping a UUID v7 (time-sortable).
///
/// Doubles as the message-bus partition key, which guarantees ordered,
/// single-writer processing per flow.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowId(pub Uuid);

impl FlowId {
    /// Create a new FlowId using UUID v7.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for FlowId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for FlowId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// The logical key of a flow: who started it, and which run of theirs it is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowKey {
    pub initiator: PartyIdentity,
    pub flow_run_id: Uuid,
}

impl FlowKey {
    pub fn new(initiator: PartyIdentity, flow_run_id: Uuid) -> Self {
        Self {
            initiator,
            flow_run_id,
        }
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.initiator, self.flow_run_id)
    }
}

// ---------------------------------------------------------------------------
// FlowEvent
// ---------------------------------------------------------------------------

/// One inbound event for one flow, as delivered by the message bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowEvent {
    pub flow_id: FlowId,
    pub payload: FlowEventPayload,
}

impl FlowEvent {
    pub fn new(flow_id: FlowId, payload: FlowEventPayload) -> Self {
        Self { flow_id, payload }
    }

    /// Short label for logging.
    pub fn kind(&self) -> &'static str {
        match &self.payload {
            FlowEventPayload::StartFlow(_) => "start_flow",
            FlowEventPayload::SessionEvent(_) => "session_event",
            FlowEventPayload::Wakeup => "wakeup",
        }
    }
}

/// The payload of an inbound flow event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlowEventPayload {
    /// Start a new flow on this flow id.
    StartFlow(StartFlowPayload),
    /// A session message from a peer (or a loopback ack).
    SessionEvent(SessionEvent),
    /// Resume a flow waiting on a wakeup (sleep deadline, self-wakeup).
    Wakeup,
}

/// Payload of a `StartFlow` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartFlowPayload {
    pub flow_key: FlowKey,
    /// Fully qualified name of the flow class to run in the sandbox.
    pub flow_name: String,
    /// Set when a peer's session-init caused this start.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initiated_by: Option<PartyIdentity>,
    /// The session the initiating peer opened; the flow parks on its
    /// arrival before the body first runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initiated_session_id: Option<SessionId>,
    /// Caller-supplied start arguments, passed to the flow body on first run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_args: Option<serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Session messages
// ---------------------------------------------------------------------------

/// One message on a session, inbound or outbound.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEvent {
    pub session_id: SessionId,
    /// Per-direction sequence number, starting at 1 for the session-init.
    pub sequence_number: u64,
    pub timestamp: DateTime<Utc>,
    pub message: SessionMessage,
}

/// The session sub-protocol message set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionMessage {
    /// Open a session: carries everything the peer needs to start the
    /// counter-flow and mirror the session.
    Init {
        flow_name: String,
        initiator: PartyIdentity,
        initiated_session_id: SessionId,
    },
    /// Acknowledge receipt of everything up to a sequence number.
    Ack { received_sequence_number: u64 },
    /// Application payload.
    Data { payload: Vec<u8> },
    /// Close this half of the session.
    Close,
    /// Terminal session error; the peer's flow will observe it.
    Error { message: String },
}

impl SessionMessage {
    /// Short label for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            SessionMessage::Init { .. } => "init",
            SessionMessage::Ack { .. } => "ack",
            SessionMessage::Data { .. } => "data",
            SessionMessage::Close => "close",
            SessionMessage::Error { .. } => "error",
        }
    }
}
