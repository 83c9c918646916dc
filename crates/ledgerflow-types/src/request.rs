//! Flow suspension requests and wait conditions.
//!
//! `FlowIoRequest` describes why a flow suspended; `WaitingFor` describes the
//! one condition that will resume it. Exactly one request is active per
//! suspension -- it is never mutated, only replaced by the next one the
//! runner produces.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::PartyIdentity;
use crate::session::SessionId;

// ---------------------------------------------------------------------------
// FlowIoRequest
// ---------------------------------------------------------------------------

/// The I/O request a flow suspends with.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlowIoRequest {
    /// Send one payload on each named session; does not block on delivery.
    Send {
        payloads: BTreeMap<SessionId, Vec<u8>>,
    },
    /// Wait for one in-order payload on each named session.
    Receive { sessions: Vec<SessionId> },
    /// Send, then wait for a reply on the same sessions.
    SendAndReceive {
        payloads: BTreeMap<SessionId, Vec<u8>>,
    },
    /// Open a new session with a counterparty.
    InitiateFlow {
        counterparty: PartyIdentity,
        session_id: SessionId,
    },
    /// Close the named sessions and wait for the peers to close their halves.
    CloseSessions { sessions: Vec<SessionId> },
    /// Suspend until a wakeup at or after the deadline.
    Sleep { duration_ms: u64 },
    /// Ask the engine for session/flow metadata; resumes on the next pass.
    GetFlowInfo { sessions: Vec<SessionId> },
    /// Wait until the named sessions reach the confirmation kind.
    WaitForSessionConfirmations {
        kind: ConfirmationKind,
        sessions: Vec<SessionId>,
    },
    /// Persist the checkpoint now; resumes on the next pass.
    ForceCheckpoint,
    /// A sub-flow frame completed; its sessions are closed.
    SubFlowFinished { session_ids: Vec<SessionId> },
    /// A sub-flow frame failed; its sessions are errored.
    SubFlowFailed {
        error: String,
        session_ids: Vec<SessionId>,
    },
    /// The root flow completed with a result.
    FlowFinished { result: Option<serde_json::Value> },
    /// The root flow failed with an error.
    FlowFailed { error: String },
}

impl FlowIoRequest {
    /// Short label for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            FlowIoRequest::Send { .. } => "send",
            FlowIoRequest::Receive { .. } => "receive",
            FlowIoRequest::SendAndReceive { .. } => "send_and_receive",
            FlowIoRequest::InitiateFlow { .. } => "initiate_flow",
            FlowIoRequest::CloseSessions { .. } => "close_sessions",
            FlowIoRequest::Sleep { .. } => "sleep",
            FlowIoRequest::GetFlowInfo { .. } => "get_flow_info",
            FlowIoRequest::WaitForSessionConfirmations { .. } => {
                "wait_for_session_confirmations"
            }
            FlowIoRequest::ForceCheckpoint => "force_checkpoint",
            FlowIoRequest::SubFlowFinished { .. } => "sub_flow_finished",
            FlowIoRequest::SubFlowFailed { .. } => "sub_flow_failed",
            FlowIoRequest::FlowFinished { .. } => "flow_finished",
            FlowIoRequest::FlowFailed { .. } => "flow_failed",
        }
    }

    /// Whether this request terminates the flow.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FlowIoRequest::FlowFinished { .. } | FlowIoRequest::FlowFailed { .. }
        )
    }
}

// ---------------------------------------------------------------------------
// WaitingFor
// ---------------------------------------------------------------------------

/// Which session confirmation a flow is waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationKind {
    /// Session-init acknowledged by the peer.
    Initiate,
    /// Session closed by both halves.
    Close,
}

/// The single pending condition that will resume a suspended flow.
///
/// A live checkpoint always holds exactly one of these; `None` at the
/// checkpoint level means the flow is terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WaitingFor {
    /// A brand-new flow waiting for its StartFlow event to run it.
    StartFlow,
    /// Waiting on a wakeup event; `deadline` is set for sleeps and `None`
    /// for immediate self-wakeups (force-checkpoint, post-send).
    Wakeup {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        deadline: Option<DateTime<Utc>>,
    },
    /// Waiting for the named sessions to reach a confirmation kind.
    SessionConfirmation {
        kind: ConfirmationKind,
        session_ids: Vec<SessionId>,
    },
    /// Waiting for one in-order data payload on each named session.
    SessionData { session_ids: Vec<SessionId> },
    /// An initiated flow waiting for its opening session-init to arrive.
    SessionInit { session_id: SessionId },
}

impl WaitingFor {
    /// Short label for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            WaitingFor::StartFlow => "start_flow",
            WaitingFor::Wakeup { .. } => "wakeup",
            WaitingFor::SessionConfirmation { .. } => "session_confirmation",
            WaitingFor::SessionData { .. } => "session_data",
            WaitingFor::SessionInit { .. } => "session_init",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_terminal() {
        assert!(FlowIoRequest::FlowFinished { result: None }.is_terminal());
        assert!(
            FlowIoRequest::FlowFailed {
                error: "boom".to_string()
            }
            .is_terminal()
        );
        assert!(!FlowIoRequest::ForceCheckpoint.is_terminal());
    }

    #[test]
    fn test_request_serde_tagged() {
        let req = FlowIoRequest::InitiateFlow {
            counterparty: PartyIdentity::new("O=Bob, L=London, C=GB", "group-1"),
            session_id: SessionId::new("s1"),
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"type\":\"initiate_flow\""));
        let parsed: FlowIoRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.kind(), "initiate_flow");
    }

    #[test]
    fn test_waiting_for_serde() {
        let waiting = WaitingFor::SessionConfirmation {
            kind: ConfirmationKind::Initiate,
            session_ids: vec![SessionId::new("s1")],
        };
        let json = serde_json::to_string(&waiting).unwrap();
        let parsed: WaitingFor = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, waiting);
    }

    #[test]
    fn test_wakeup_deadline_optional() {
        let json = serde_json::to_string(&WaitingFor::Wakeup { deadline: None }).unwrap();
        assert!(!json.contains("deadline"));
        let parsed: WaitingFor = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, WaitingFor::Wakeup { deadline: None });
    }
}
