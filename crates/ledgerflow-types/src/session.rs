//! Peer-session state types.
//!
//! A session is a logical, ordered message channel between one flow and one
//! counterparty. The session sub-state-machine (init, confirm, data transfer,
//! close, error) lives in `ledgerflow-core`; this module defines the durable
//! state it operates on.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::SessionMessage;
use crate::identity::PartyIdentity;

// ---------------------------------------------------------------------------
// SessionId
// ---------------------------------------------------------------------------

/// Unique identifier for a session within a flow.
///
/// The initiating side picks the id; the peer's mirror of the session carries
/// the `-INITIATED` suffix so both halves are distinguishable on the wire.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    /// Suffix appended to the initiator's id to name the peer's half.
    pub const INITIATED_SUFFIX: &'static str = "-INITIATED";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id the counterparty uses for its half of this session.
    pub fn initiated_counterpart(&self) -> SessionId {
        if self.is_initiated_side() {
            SessionId(
                self.0
                    .trim_end_matches(Self::INITIATED_SUFFIX)
                    .to_string(),
            )
        } else {
            SessionId(format!("{}{}", self.0, Self::INITIATED_SUFFIX))
        }
    }

    /// Whether this id names the peer (initiated) half of a session.
    pub fn is_initiated_side(&self) -> bool {
        self.0.ends_with(Self::INITIATED_SUFFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// SessionStatus
// ---------------------------------------------------------------------------

/// Lifecycle state of a peer session.
///
/// Created -> Confirmed -> Closing -> Closed, with Error reachable from any
/// non-terminal state. Error and Closed are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Session-init sent, acknowledgment not yet received.
    Created,
    /// Both sides have seen the session; data transfer is allowed.
    Confirmed,
    /// A close has been sent or received; awaiting the other half.
    Closing,
    /// Both sides closed. Terminal.
    Closed,
    /// Protocol violation, peer failure, or heartbeat expiry. Terminal.
    Error,
}

impl SessionStatus {
    /// Whether the session can still carry traffic.
    pub fn is_open(&self) -> bool {
        matches!(self, SessionStatus::Created | SessionStatus::Confirmed)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Closed | SessionStatus::Error)
    }
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Durable state of one peer session within a flow checkpoint.
///
/// Sequence numbers are monotonically increasing per direction.
/// `receive_sequence_number` is the highest inbound sequence number accepted
/// so far; the next acceptable inbound message carries exactly that + 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: SessionId,
    pub counterparty: PartyIdentity,
    pub status: SessionStatus,
    /// Sequence number of the last message sent on this session.
    pub send_sequence_number: u64,
    /// Sequence number of the last inbound message accepted.
    pub receive_sequence_number: u64,
    /// Highest inbound sequence number we have acknowledged to the peer.
    pub last_acked_sequence_number: u64,
    pub last_sent_at: DateTime<Utc>,
    pub last_received_at: DateTime<Utc>,
    /// The last message sent, retained until acknowledged for resend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sent_message: Option<SessionMessage>,
    /// In-order data payloads accepted but not yet consumed by the flow body.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pending_payloads: Vec<Vec<u8>>,
}

impl SessionState {
    /// Create the initiating half of a new session.
    pub fn new(
        session_id: SessionId,
        counterparty: PartyIdentity,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id,
            counterparty,
            status: SessionStatus::Created,
            send_sequence_number: 0,
            receive_sequence_number: 0,
            last_acked_sequence_number: 0,
            last_sent_at: now,
            last_received_at: now,
            last_sent_message: None,
            pending_payloads: Vec::new(),
        }
    }

    /// Whether an unacknowledged outbound message is awaiting resend.
    pub fn has_unacked_message(&self) -> bool {
        self.last_sent_message.is_some()
    }
}
