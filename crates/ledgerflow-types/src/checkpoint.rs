//! The flow checkpoint: durable state of one flow instance between
//! suspensions.
//!
//! The checkpoint is the single unit of transactional state in the engine.
//! It is read once at pipeline entry, mutated in memory while one event is
//! processed, and written once at pipeline exit, atomically with the
//! consumption of the triggering event.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::{FlowId, FlowKey, StartFlowPayload};
use crate::identity::PartyIdentity;
use crate::request::WaitingFor;
use crate::session::{SessionId, SessionState};

// ---------------------------------------------------------------------------
// FlowStatus
// ---------------------------------------------------------------------------

/// Top-level lifecycle state of a flow instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStatus {
    Running,
    Completed,
    Failed,
    /// A transient fault occurred and the triggering event will be
    /// redelivered; recorded on the status topic by embedders.
    Retrying,
}

impl FlowStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, FlowStatus::Completed | FlowStatus::Failed)
    }
}

// ---------------------------------------------------------------------------
// FlowStackFrame
// ---------------------------------------------------------------------------

/// One active (sub-)flow frame. The stack is ordered innermost-last and is
/// empty only before the root flow first runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowStackFrame {
    /// Fully qualified flow class name.
    pub flow_name: String,
    /// Whether this frame may initiate new sessions.
    pub initiating: bool,
    /// Sessions created by this frame, closed when the frame finishes.
    #[serde(default)]
    pub session_ids: Vec<SessionId>,
}

impl FlowStackFrame {
    pub fn new(flow_name: impl Into<String>, initiating: bool) -> Self {
        Self {
            flow_name: flow_name.into(),
            initiating,
            session_ids: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// FlowCheckpoint
// ---------------------------------------------------------------------------

/// Durable serialized state of one flow instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowCheckpoint {
    /// Flow identifier; also the bus partition key.
    pub flow_id: FlowId,
    /// Logical key: initiating identity + flow run reference.
    pub flow_key: FlowKey,
    /// Fully qualified name of the root flow.
    pub flow_name: String,
    /// Set when a peer's session-init caused this flow to start.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initiated_by: Option<PartyIdentity>,
    /// Caller-supplied start arguments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow_start_args: Option<serde_json::Value>,
    /// Active sub-flow frames, innermost last.
    #[serde(default)]
    pub flow_stack: Vec<FlowStackFrame>,
    /// Peer sessions keyed by session id.
    #[serde(default)]
    pub sessions: BTreeMap<SessionId, SessionState>,
    /// The single condition that will resume this flow; `None` once terminal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waiting_for: Option<WaitingFor>,
    pub status: FlowStatus,
    /// Tombstone flag set when the flow terminates.
    #[serde(default)]
    pub marked_for_deletion: bool,
    /// When a tombstoned checkpoint may be purged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleanup_expiry: Option<DateTime<Utc>>,
    /// Number of suspensions processed so far.
    #[serde(default)]
    pub suspend_count: u64,
    pub started_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

impl FlowCheckpoint {
    /// Fold a `StartFlow` event into a blank checkpoint.
    pub fn init_flow_state(
        flow_id: FlowId,
        start: &StartFlowPayload,
        now: DateTime<Utc>,
    ) -> Self {
        // A peer-initiated flow parks on its opening session-init; a locally
        // started flow runs as soon as its StartFlow event arrives.
        let waiting_for = match (&start.initiated_by, &start.initiated_session_id) {
            (Some(_), Some(session_id)) => WaitingFor::SessionInit {
                session_id: session_id.clone(),
            },
            _ => WaitingFor::StartFlow,
        };
        Self {
            flow_id,
            flow_key: start.flow_key.clone(),
            flow_name: start.flow_name.clone(),
            initiated_by: start.initiated_by.clone(),
            flow_start_args: start.start_args.clone(),
            flow_stack: Vec::new(),
            sessions: BTreeMap::new(),
            waiting_for: Some(waiting_for),
            status: FlowStatus::Running,
            marked_for_deletion: false,
            cleanup_expiry: None,
            suspend_count: 0,
            started_at: now,
            last_updated_at: now,
        }
    }

    // -----------------------------------------------------------------------
    // Sessions
    // -----------------------------------------------------------------------

    pub fn session(&self, session_id: &SessionId) -> Option<&SessionState> {
        self.sessions.get(session_id)
    }

    pub fn session_mut(&mut self, session_id: &SessionId) -> Option<&mut SessionState> {
        self.sessions.get_mut(session_id)
    }

    pub fn put_session(&mut self, session: SessionState) {
        self.sessions.insert(session.session_id.clone(), session);
    }

    // -----------------------------------------------------------------------
    // Flow stack
    // -----------------------------------------------------------------------

    /// The innermost active frame.
    pub fn current_frame(&self) -> Option<&FlowStackFrame> {
        self.flow_stack.last()
    }

    pub fn current_frame_mut(&mut self) -> Option<&mut FlowStackFrame> {
        self.flow_stack.last_mut()
    }

    pub fn push_frame(&mut self, frame: FlowStackFrame) {
        self.flow_stack.push(frame);
    }

    pub fn pop_frame(&mut self) -> Option<FlowStackFrame> {
        self.flow_stack.pop()
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Tombstone this checkpoint; it stays readable until `cleanup_expiry`
    /// so late events are consumed quietly, then a janitor purges it.
    pub fn mark_deleted(&mut self, cleanup_expiry: DateTime<Utc>) {
        self.marked_for_deletion = true;
        self.cleanup_expiry = Some(cleanup_expiry);
        self.waiting_for = None;
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whether a tombstoned checkpoint has outlived its cleanup window.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.marked_for_deletion
            && self.cleanup_expiry.is_some_and(|expiry| now >= expiry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;

    fn sample_start() -> StartFlowPayload {
        StartFlowPayload {
            flow_key: FlowKey::new(
                PartyIdentity::new("O=Alice, L=Dublin, C=IE", "group-1"),
                Uuid::now_v7(),
            ),
            flow_name: "com.example.TransferFlow".to_string(),
            initiated_by: None,
            initiated_session_id: None,
            start_args: None,
        }
    }

    #[test]
    fn test_init_flow_state() {
        let now = Utc::now();
        let checkpoint = FlowCheckpoint::init_flow_state(FlowId::new(), &sample_start(), now);
        assert_eq!(checkpoint.status, FlowStatus::Running);
        assert_eq!(checkpoint.waiting_for, Some(WaitingFor::StartFlow));
        assert!(checkpoint.flow_stack.is_empty());
        assert!(checkpoint.sessions.is_empty());
        assert!(!checkpoint.marked_for_deletion);
    }

    #[test]
    fn test_initiated_flow_waits_on_session_init() {
        let now = Utc::now();
        let mut start = sample_start();
        start.initiated_by = Some(PartyIdentity::new("O=Bob, L=London, C=GB", "group-1"));
        start.initiated_session_id = Some(SessionId::new("s1-INITIATED"));

        let checkpoint = FlowCheckpoint::init_flow_state(FlowId::new(), &start, now);
        assert_eq!(
            checkpoint.waiting_for,
            Some(WaitingFor::SessionInit {
                session_id: SessionId::new("s1-INITIATED"),
            })
        );
    }

    #[test]
    fn test_mark_deleted_clears_waiting_for() {
        let now = Utc::now();
        let mut checkpoint =
            FlowCheckpoint::init_flow_state(FlowId::new(), &sample_start(), now);
        checkpoint.status = FlowStatus::Completed;
        checkpoint.mark_deleted(now + Duration::minutes(10));

        assert!(checkpoint.marked_for_deletion);
        assert!(checkpoint.waiting_for.is_none());
        assert!(checkpoint.is_terminal());
        assert!(!checkpoint.is_expired(now));
        assert!(checkpoint.is_expired(now + Duration::minutes(11)));
    }

    #[test]
    fn test_frame_stack_order() {
        let now = Utc::now();
        let mut checkpoint =
            FlowCheckpoint::init_flow_state(FlowId::new(), &sample_start(), now);
        checkpoint.push_frame(FlowStackFrame::new("root", true));
        checkpoint.push_frame(FlowStackFrame::new("sub", false));

        assert_eq!(checkpoint.current_frame().unwrap().flow_name, "sub");
        let popped = checkpoint.pop_frame().unwrap();
        assert_eq!(popped.flow_name, "sub");
        assert_eq!(checkpoint.current_frame().unwrap().flow_name, "root");
    }

    #[test]
    fn test_checkpoint_serde_roundtrip() {
        let now = Utc::now();
        let mut checkpoint =
            FlowCheckpoint::init_flow_state(FlowId::new(), &sample_start(), now);
        checkpoint.put_session(SessionState::new(
            SessionId::new("s1"),
            PartyIdentity::new("O=Bob, L=London, C=GB", "group-1"),
            now,
        ));

        let json = serde_json::to_string(&checkpoint).unwrap();
        let parsed: FlowCheckpoint = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.flow_id, checkpoint.flow_id);
        assert_eq!(parsed.sessions.len(), 1);
        assert_eq!(parsed.waiting_for, Some(WaitingFor::StartFlow));
    }
}
