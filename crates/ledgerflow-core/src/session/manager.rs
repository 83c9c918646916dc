//! Session manager: the peer-session sub-state-machine.
//!
//! Owns every mutation of `SessionState`: folding inbound messages with
//! duplicate detection, recording outbound sends, close/error transitions,
//! and the housekeeping timers (acknowledgments, resend window, heartbeat
//! timeout). All methods are pure folds over checkpoint state -- no I/O --
//! so replaying the same inbound sequence number never duplicates a
//! mutation.

use chrono::{DateTime, Utc};
use ledgerflow_types::checkpoint::FlowCheckpoint;
use ledgerflow_types::config::FlowEngineConfig;
use ledgerflow_types::event::{SessionEvent, SessionMessage};
use ledgerflow_types::identity::PartyIdentity;
use ledgerflow_types::session::{SessionId, SessionState, SessionStatus};

use super::error::SessionStateError;

// ---------------------------------------------------------------------------
// InboundOutcome
// ---------------------------------------------------------------------------

/// Result of folding one inbound session message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundOutcome {
    /// The message advanced session state.
    Applied,
    /// Sequence number already seen; dropped without mutation.
    Duplicate,
    /// Sequence number ahead of the expected one; dropped, the peer's
    /// resend window recovers the gap.
    OutOfOrder,
}

// ---------------------------------------------------------------------------
// SessionManager
// ---------------------------------------------------------------------------

/// Folds session messages into checkpoint state and produces outbound ones.
pub struct SessionManager;

impl SessionManager {
    pub fn new() -> Self {
        Self
    }

    // -----------------------------------------------------------------------
    // Session creation
    // -----------------------------------------------------------------------

    /// Create the initiating half of a session and build its session-init
    /// message (sequence number 1, retained for resend until acknowledged).
    pub fn create_initiating_session(
        &self,
        checkpoint: &mut FlowCheckpoint,
        session_id: &SessionId,
        counterparty: PartyIdentity,
        now: DateTime<Utc>,
    ) -> Result<SessionEvent, SessionStateError> {
        if checkpoint.session(session_id).is_some() {
            return Err(SessionStateError::AlreadyExists(session_id.clone()));
        }

        let init = SessionMessage::Init {
            flow_name: checkpoint.flow_name.clone(),
            initiator: checkpoint.flow_key.initiator.clone(),
            initiated_session_id: session_id.initiated_counterpart(),
        };

        let mut session = SessionState::new(session_id.clone(), counterparty, now);
        session.send_sequence_number = 1;
        session.last_sent_message = Some(init.clone());
        session.last_sent_at = now;
        checkpoint.put_session(session);

        if let Some(frame) = checkpoint.current_frame_mut() {
            frame.session_ids.push(session_id.clone());
        }

        tracing::debug!(
            flow_id = %checkpoint.flow_id,
            session_id = %session_id,
            "created initiating session"
        );

        Ok(SessionEvent {
            session_id: session_id.initiated_counterpart(),
            sequence_number: 1,
            timestamp: now,
            message: init,
        })
    }

    /// Create the initiated (peer) half of a session from an inbound
    /// session-init. Idempotent: a duplicate init for a known session is a
    /// no-op.
    pub fn create_initiated_session(
        &self,
        checkpoint: &mut FlowCheckpoint,
        event: &SessionEvent,
        initiator: PartyIdentity,
        now: DateTime<Utc>,
    ) {
        if checkpoint.session(&event.session_id).is_some() {
            tracing::debug!(
                flow_id = %checkpoint.flow_id,
                session_id = %event.session_id,
                "duplicate session init dropped"
            );
            return;
        }

        let mut session = SessionState::new(event.session_id.clone(), initiator, now);
        // Receiving real traffic confirms the session from this side.
        session.status = SessionStatus::Confirmed;
        session.receive_sequence_number = event.sequence_number;
        session.last_received_at = now;
        checkpoint.put_session(session);

        if let Some(frame) = checkpoint.current_frame_mut() {
            frame.session_ids.push(event.session_id.clone());
        }
    }

    // -----------------------------------------------------------------------
    // Inbound fold
    // -----------------------------------------------------------------------

    /// Fold one inbound non-init message into its session.
    ///
    /// Sequence numbers at or below the last accepted one are duplicates and
    /// mutate nothing; numbers beyond the next expected one are out-of-order
    /// and mutate nothing either.
    pub fn apply_inbound(
        &self,
        session: &mut SessionState,
        event: &SessionEvent,
        now: DateTime<Utc>,
    ) -> InboundOutcome {
        match &event.message {
            SessionMessage::Init { .. } => {
                // Handled by create_initiated_session; a re-init of a live
                // session is a duplicate.
                InboundOutcome::Duplicate
            }
            SessionMessage::Ack {
                received_sequence_number,
            } => {
                session.last_received_at = now;
                if *received_sequence_number >= session.send_sequence_number {
                    session.last_sent_message = None;
                }
                if session.status == SessionStatus::Created {
                    session.status = SessionStatus::Confirmed;
                    tracing::debug!(
                        session_id = %session.session_id,
                        "session confirmed"
                    );
                }
                InboundOutcome::Applied
            }
            SessionMessage::Data { payload } => {
                match self.check_sequence(session, event.sequence_number) {
                    Some(out_of_band) => out_of_band,
                    None => {
                        session.receive_sequence_number = event.sequence_number;
                        session.last_received_at = now;
                        session.pending_payloads.push(payload.clone());
                        if session.status == SessionStatus::Created {
                            session.status = SessionStatus::Confirmed;
                        }
                        InboundOutcome::Applied
                    }
                }
            }
            SessionMessage::Close => {
                match self.check_sequence(session, event.sequence_number) {
                    Some(out_of_band) => out_of_band,
                    None => {
                        session.receive_sequence_number = event.sequence_number;
                        session.last_received_at = now;
                        session.status = match session.status {
                            // We closed first; the peer's close completes it.
                            SessionStatus::Closing => SessionStatus::Closed,
                            SessionStatus::Closed => SessionStatus::Closed,
                            SessionStatus::Error => SessionStatus::Error,
                            // Peer closed first; our close will complete it.
                            _ => SessionStatus::Closing,
                        };
                        InboundOutcome::Applied
                    }
                }
            }
            SessionMessage::Error { message } => {
                session.last_received_at = now;
                if session.status != SessionStatus::Error {
                    tracing::warn!(
                        session_id = %session.session_id,
                        error = message.as_str(),
                        "session errored by peer"
                    );
                    session.status = SessionStatus::Error;
                }
                InboundOutcome::Applied
            }
        }
    }

    /// Duplicate / out-of-order detection for sequenced messages.
    /// Returns `None` when the sequence number is the next expected one.
    fn check_sequence(
        &self,
        session: &SessionState,
        sequence_number: u64,
    ) -> Option<InboundOutcome> {
        let expected = session.receive_sequence_number + 1;
        if sequence_number < expected {
            tracing::debug!(
                session_id = %session.session_id,
                sequence_number,
                expected,
                "duplicate session message dropped"
            );
            Some(InboundOutcome::Duplicate)
        } else if sequence_number > expected {
            tracing::warn!(
                session_id = %session.session_id,
                sequence_number,
                expected,
                "out-of-order session message dropped"
            );
            Some(InboundOutcome::OutOfOrder)
        } else {
            None
        }
    }

    // -----------------------------------------------------------------------
    // Outbound
    // -----------------------------------------------------------------------

    /// Record an outbound data payload: bump the send sequence number and
    /// retain the message for resend until acknowledged.
    pub fn record_send(
        &self,
        session: &mut SessionState,
        payload: Vec<u8>,
        now: DateTime<Utc>,
    ) -> SessionEvent {
        session.send_sequence_number += 1;
        let message = SessionMessage::Data { payload };
        session.last_sent_message = Some(message.clone());
        session.last_sent_at = now;

        SessionEvent {
            session_id: session.session_id.initiated_counterpart(),
            sequence_number: session.send_sequence_number,
            timestamp: now,
            message,
        }
    }

    /// Send a close on this session and advance its status. Returns `None`
    /// when the session is already fully closed.
    pub fn initiate_close(
        &self,
        session: &mut SessionState,
        now: DateTime<Utc>,
    ) -> Result<Option<SessionEvent>, SessionStateError> {
        match session.status {
            SessionStatus::Closed => return Ok(None),
            SessionStatus::Error => {
                return Err(SessionStateError::InvalidStatus {
                    session_id: session.session_id.clone(),
                    actual: session.status,
                    expected: vec![
                        SessionStatus::Created,
                        SessionStatus::Confirmed,
                        SessionStatus::Closing,
                    ],
                });
            }
            SessionStatus::Closing => {
                // The peer closed first; our close completes the handshake.
                session.status = SessionStatus::Closed;
            }
            SessionStatus::Created | SessionStatus::Confirmed => {
                session.status = SessionStatus::Closing;
            }
        }

        session.send_sequence_number += 1;
        session.last_sent_message = Some(SessionMessage::Close);
        session.last_sent_at = now;

        Ok(Some(SessionEvent {
            session_id: session.session_id.initiated_counterpart(),
            sequence_number: session.send_sequence_number,
            timestamp: now,
            message: SessionMessage::Close,
        }))
    }

    /// Send error notifications on the named sessions and mark them errored.
    pub fn send_error_messages(
        &self,
        checkpoint: &mut FlowCheckpoint,
        session_ids: &[SessionId],
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<SessionEvent>, SessionStateError> {
        let mut events = Vec::with_capacity(session_ids.len());
        for session_id in session_ids {
            let session = checkpoint
                .session_mut(session_id)
                .ok_or_else(|| SessionStateError::UnknownSession(session_id.clone()))?;

            session.status = SessionStatus::Error;
            session.send_sequence_number += 1;
            session.last_sent_message = None;
            session.last_sent_at = now;

            events.push(SessionEvent {
                session_id: session.session_id.initiated_counterpart(),
                sequence_number: session.send_sequence_number,
                timestamp: now,
                message: SessionMessage::Error {
                    message: error.to_string(),
                },
            });
        }
        Ok(events)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// The named sessions whose status is in the given set. Unknown ids are
    /// a session-state error.
    pub fn get_sessions_with_statuses<'a>(
        &self,
        checkpoint: &'a FlowCheckpoint,
        session_ids: &[SessionId],
        statuses: &[SessionStatus],
    ) -> Result<Vec<&'a SessionState>, SessionStateError> {
        let mut matched = Vec::new();
        for session_id in session_ids {
            let session = checkpoint
                .session(session_id)
                .ok_or_else(|| SessionStateError::UnknownSession(session_id.clone()))?;
            if statuses.contains(&session.status) {
                matched.push(session);
            }
        }
        Ok(matched)
    }

    /// Require every named session to exist with a status in the given set.
    pub fn validate_session_statuses(
        &self,
        checkpoint: &FlowCheckpoint,
        session_ids: &[SessionId],
        statuses: &[SessionStatus],
    ) -> Result<(), SessionStateError> {
        for session_id in session_ids {
            let session = checkpoint
                .session(session_id)
                .ok_or_else(|| SessionStateError::UnknownSession(session_id.clone()))?;
            if !statuses.contains(&session.status) {
                return Err(SessionStateError::InvalidStatus {
                    session_id: session_id.clone(),
                    actual: session.status,
                    expected: statuses.to_vec(),
                });
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Housekeeping timers
    // -----------------------------------------------------------------------

    /// Apply the timer configuration to one session and collect the
    /// messages to send this pass: heartbeat expiry, acknowledgments of
    /// received traffic, and resends of unacknowledged messages past the
    /// resend window.
    ///
    /// Idempotent per state: an ack is only produced while received traffic
    /// is unacknowledged, and a resend refreshes `last_sent_at` so the next
    /// pass inside the window produces nothing.
    pub fn housekeeping(
        &self,
        session: &mut SessionState,
        now: DateTime<Utc>,
        config: &FlowEngineConfig,
    ) -> Vec<SessionEvent> {
        if session.status.is_terminal() {
            return Vec::new();
        }

        let mut events = Vec::new();

        // Heartbeat: silence beyond the timeout window errors the session.
        if now - session.last_received_at >= config.heartbeat_timeout_window() {
            tracing::warn!(
                session_id = %session.session_id,
                last_received_at = %session.last_received_at,
                "session heartbeat expired"
            );
            session.status = SessionStatus::Error;
            session.send_sequence_number += 1;
            session.last_sent_message = None;
            events.push(SessionEvent {
                session_id: session.session_id.initiated_counterpart(),
                sequence_number: session.send_sequence_number,
                timestamp: now,
                message: SessionMessage::Error {
                    message: "session heartbeat expired".to_string(),
                },
            });
            return events;
        }

        // Acknowledge everything received since the last ack.
        if session.receive_sequence_number > session.last_acked_sequence_number {
            session.last_acked_sequence_number = session.receive_sequence_number;
            events.push(SessionEvent {
                session_id: session.session_id.initiated_counterpart(),
                sequence_number: session.send_sequence_number,
                timestamp: now,
                message: SessionMessage::Ack {
                    received_sequence_number: session.receive_sequence_number,
                },
            });
        }

        // Resend the last unacknowledged message once the window lapses.
        if let Some(message) = &session.last_sent_message
            && now - session.last_sent_at >= config.resend_window()
        {
            tracing::debug!(
                session_id = %session.session_id,
                sequence_number = session.send_sequence_number,
                "resending unacknowledged session message"
            );
            events.push(SessionEvent {
                session_id: session.session_id.initiated_counterpart(),
                sequence_number: session.send_sequence_number,
                timestamp: now,
                message: message.clone(),
            });
            session.last_sent_at = now;
        }

        events
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use ledgerflow_types::event::{FlowId, FlowKey, StartFlowPayload};
    use uuid::Uuid;

    fn bob() -> PartyIdentity {
        PartyIdentity::new("O=Bob, L=London, C=GB", "group-1")
    }

    fn checkpoint(now: DateTime<Utc>) -> FlowCheckpoint {
        let start = StartFlowPayload {
            flow_key: FlowKey::new(
                PartyIdentity::new("O=Alice, L=Dublin, C=IE", "group-1"),
                Uuid::now_v7(),
            ),
            flow_name: "com.example.TransferFlow".to_string(),
            initiated_by: None,
            initiated_session_id: None,
            start_args: None,
        };
        FlowCheckpoint::init_flow_state(FlowId::new(), &start, now)
    }

    fn data_event(session_id: &SessionId, seq: u64, now: DateTime<Utc>) -> SessionEvent {
        SessionEvent {
            session_id: session_id.clone(),
            sequence_number: seq,
            timestamp: now,
            message: SessionMessage::Data {
                payload: vec![seq as u8],
            },
        }
    }

    #[test]
    fn create_initiating_session_emits_init_with_seq_one() {
        let now = Utc::now();
        let manager = SessionManager::new();
        let mut checkpoint = checkpoint(now);
        let session_id = SessionId::new("s1");

        let event = manager
            .create_initiating_session(&mut checkpoint, &session_id, bob(), now)
            .unwrap();

        assert_eq!(event.sequence_number, 1);
        assert_eq!(event.session_id.as_str(), "s1-INITIATED");
        assert!(matches!(event.message, SessionMessage::Init { .. }));

        let session = checkpoint.session(&session_id).unwrap();
        assert_eq!(session.status, SessionStatus::Created);
        assert_eq!(session.send_sequence_number, 1);
        assert!(session.has_unacked_message());
    }

    #[test]
    fn create_initiating_session_rejects_existing_id() {
        let now = Utc::now();
        let manager = SessionManager::new();
        let mut checkpoint = checkpoint(now);
        let session_id = SessionId::new("s1");

        manager
            .create_initiating_session(&mut checkpoint, &session_id, bob(), now)
            .unwrap();
        let err = manager
            .create_initiating_session(&mut checkpoint, &session_id, bob(), now)
            .unwrap_err();
        assert!(matches!(err, SessionStateError::AlreadyExists(_)));
    }

    #[test]
    fn ack_confirms_created_session_and_clears_unacked() {
        let now = Utc::now();
        let manager = SessionManager::new();
        let mut checkpoint = checkpoint(now);
        let session_id = SessionId::new("s1");
        manager
            .create_initiating_session(&mut checkpoint, &session_id, bob(), now)
            .unwrap();

        let ack = SessionEvent {
            session_id: session_id.clone(),
            sequence_number: 0,
            timestamp: now,
            message: SessionMessage::Ack {
                received_sequence_number: 1,
            },
        };
        let session = checkpoint.session_mut(&session_id).unwrap();
        let outcome = manager.apply_inbound(session, &ack, now);

        assert_eq!(outcome, InboundOutcome::Applied);
        assert_eq!(session.status, SessionStatus::Confirmed);
        assert!(!session.has_unacked_message());
    }

    #[test]
    fn duplicate_data_is_dropped_without_mutation() {
        let now = Utc::now();
        let manager = SessionManager::new();
        let session_id = SessionId::new("s1");
        let mut session = SessionState::new(session_id.clone(), bob(), now);
        session.status = SessionStatus::Confirmed;

        assert_eq!(
            manager.apply_inbound(&mut session, &data_event(&session_id, 1, now), now),
            InboundOutcome::Applied
        );
        assert_eq!(session.receive_sequence_number, 1);
        assert_eq!(session.pending_payloads.len(), 1);

        // Same sequence number again: duplicate.
        assert_eq!(
            manager.apply_inbound(&mut session, &data_event(&session_id, 1, now), now),
            InboundOutcome::Duplicate
        );
        assert_eq!(session.receive_sequence_number, 1);
        assert_eq!(session.pending_payloads.len(), 1);
    }

    #[test]
    fn out_of_order_data_is_dropped() {
        let now = Utc::now();
        let manager = SessionManager::new();
        let session_id = SessionId::new("s1");
        let mut session = SessionState::new(session_id.clone(), bob(), now);
        session.status = SessionStatus::Confirmed;

        assert_eq!(
            manager.apply_inbound(&mut session, &data_event(&session_id, 3, now), now),
            InboundOutcome::OutOfOrder
        );
        assert_eq!(session.receive_sequence_number, 0);
        assert!(session.pending_payloads.is_empty());
    }

    #[test]
    fn close_handshake_both_directions() {
        let now = Utc::now();
        let manager = SessionManager::new();
        let session_id = SessionId::new("s1");

        // We close first, then the peer's close completes it.
        let mut session = SessionState::new(session_id.clone(), bob(), now);
        session.status = SessionStatus::Confirmed;
        let event = manager.initiate_close(&mut session, now).unwrap().unwrap();
        assert!(matches!(event.message, SessionMessage::Close));
        assert_eq!(session.status, SessionStatus::Closing);

        let peer_close = SessionEvent {
            session_id: session_id.clone(),
            sequence_number: 1,
            timestamp: now,
            message: SessionMessage::Close,
        };
        manager.apply_inbound(&mut session, &peer_close, now);
        assert_eq!(session.status, SessionStatus::Closed);

        // Peer closes first, then our close completes it.
        let mut session = SessionState::new(session_id.clone(), bob(), now);
        session.status = SessionStatus::Confirmed;
        manager.apply_inbound(&mut session, &peer_close, now);
        assert_eq!(session.status, SessionStatus::Closing);
        manager.initiate_close(&mut session, now).unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Closed);
    }

    #[test]
    fn initiate_close_on_errored_session_fails() {
        let now = Utc::now();
        let manager = SessionManager::new();
        let mut session = SessionState::new(SessionId::new("s1"), bob(), now);
        session.status = SessionStatus::Error;

        let err = manager.initiate_close(&mut session, now).unwrap_err();
        assert!(matches!(err, SessionStateError::InvalidStatus { .. }));
    }

    #[test]
    fn housekeeping_acks_received_traffic_once() {
        let now = Utc::now();
        let manager = SessionManager::new();
        let config = FlowEngineConfig::default();
        let session_id = SessionId::new("s1");
        let mut session = SessionState::new(session_id.clone(), bob(), now);
        session.status = SessionStatus::Confirmed;
        manager.apply_inbound(&mut session, &data_event(&session_id, 1, now), now);

        let events = manager.housekeeping(&mut session, now, &config);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0].message,
            SessionMessage::Ack {
                received_sequence_number: 1
            }
        ));

        // Second pass with no new traffic: nothing to ack.
        let events = manager.housekeeping(&mut session, now, &config);
        assert!(events.is_empty());
    }

    #[test]
    fn housekeeping_resends_after_window() {
        let now = Utc::now();
        let manager = SessionManager::new();
        let config = FlowEngineConfig::default();
        let mut session = SessionState::new(SessionId::new("s1"), bob(), now);
        session.status = SessionStatus::Confirmed;
        manager.record_send(&mut session, vec![42], now);

        // Inside the window: no resend.
        let events = manager.housekeeping(&mut session, now, &config);
        assert!(events.is_empty());

        // Past the window: resend with the same sequence number.
        let later = now + config.resend_window() + Duration::seconds(1);
        // Keep the heartbeat alive for this test.
        session.last_received_at = later;
        let events = manager.housekeeping(&mut session, later, &config);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].sequence_number, session.send_sequence_number);
        assert!(matches!(events[0].message, SessionMessage::Data { .. }));

        // Immediately after: the resend refreshed the window.
        let events = manager.housekeeping(&mut session, later, &config);
        assert!(events.is_empty());
    }

    #[test]
    fn housekeeping_errors_session_on_heartbeat_expiry() {
        let now = Utc::now();
        let manager = SessionManager::new();
        let config = FlowEngineConfig::default();
        let mut session = SessionState::new(SessionId::new("s1"), bob(), now);
        session.status = SessionStatus::Confirmed;

        let later = now + config.heartbeat_timeout_window() + Duration::seconds(1);
        let events = manager.housekeeping(&mut session, later, &config);

        assert_eq!(session.status, SessionStatus::Error);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0].message, SessionMessage::Error { .. }));

        // Terminal sessions produce nothing further.
        let events = manager.housekeeping(&mut session, later, &config);
        assert!(events.is_empty());
    }

    #[test]
    fn send_error_messages_marks_sessions_errored() {
        let now = Utc::now();
        let manager = SessionManager::new();
        let mut checkpoint = checkpoint(now);
        for id in ["s1", "s2"] {
            manager
                .create_initiating_session(&mut checkpoint, &SessionId::new(id), bob(), now)
                .unwrap();
        }

        let ids = vec![SessionId::new("s1"), SessionId::new("s2")];
        let events = manager
            .send_error_messages(&mut checkpoint, &ids, "flow failed", now)
            .unwrap();

        assert_eq!(events.len(), 2);
        for id in &ids {
            assert_eq!(
                checkpoint.session(id).unwrap().status,
                SessionStatus::Error
            );
        }
    }

    #[test]
    fn get_sessions_with_statuses_filters_and_errors_on_unknown() {
        let now = Utc::now();
        let manager = SessionManager::new();
        let mut checkpoint = checkpoint(now);
        manager
            .create_initiating_session(&mut checkpoint, &SessionId::new("s1"), bob(), now)
            .unwrap();

        let matched = manager
            .get_sessions_with_statuses(
                &checkpoint,
                &[SessionId::new("s1")],
                &[SessionStatus::Created],
            )
            .unwrap();
        assert_eq!(matched.len(), 1);

        let err = manager
            .get_sessions_with_statuses(
                &checkpoint,
                &[SessionId::new("nope")],
                &[SessionStatus::Created],
            )
            .unwrap_err();
        assert!(matches!(err, SessionStateError::UnknownSession(_)));
    }
}
