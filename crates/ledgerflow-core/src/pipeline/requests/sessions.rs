//! Session request handlers.
//!
//! Sends are fire-and-forget: the flow suspends on an immediate self-wakeup
//! and the session layer's resend window owns delivery. Receives park the
//! flow on `SessionData` until every named session holds its next in-order
//! payload. Target sessions must be `Confirmed`, or `Created` while the
//! session-init is still in flight.

use std::collections::BTreeMap;

use ledgerflow_types::identity::PartyIdentity;
use ledgerflow_types::request::{ConfirmationKind, WaitingFor};
use ledgerflow_types::session::{SessionId, SessionStatus};

use crate::pipeline::context::FlowEventContext;
use crate::pipeline::error::FlowProcessingError;
use crate::pipeline::records;
use crate::session::SessionManager;

/// Statuses a session may hold to be targeted by send/receive/close.
const TRANSFER_STATUSES: [SessionStatus; 2] =
    [SessionStatus::Created, SessionStatus::Confirmed];

// ---------------------------------------------------------------------------
// InitiateFlow
// ---------------------------------------------------------------------------

pub(super) fn initiate_flow_waiting_for(session_id: &SessionId) -> Option<WaitingFor> {
    Some(WaitingFor::SessionConfirmation {
        kind: ConfirmationKind::Initiate,
        session_ids: vec![session_id.clone()],
    })
}

pub(super) fn initiate_flow(
    ctx: &mut FlowEventContext,
    counterparty: &PartyIdentity,
    session_id: &SessionId,
    session_manager: &SessionManager,
) -> Result<(), FlowProcessingError> {
    let now = ctx.now;
    let init = session_manager.create_initiating_session(
        &mut ctx.checkpoint,
        session_id,
        counterparty.clone(),
        now,
    )?;
    ctx.push_record(records::session_outbound_record(init));
    Ok(())
}

// ---------------------------------------------------------------------------
// Send
// ---------------------------------------------------------------------------

pub(super) fn send_waiting_for() -> Option<WaitingFor> {
    Some(WaitingFor::Wakeup { deadline: None })
}

pub(super) fn send(
    ctx: &mut FlowEventContext,
    payloads: &BTreeMap<SessionId, Vec<u8>>,
    session_manager: &SessionManager,
) -> Result<(), FlowProcessingError> {
    send_payloads(ctx, payloads, session_manager)?;
    let record = records::self_wakeup_record(&ctx.checkpoint.flow_id);
    ctx.push_record(record);
    Ok(())
}

// ---------------------------------------------------------------------------
// Receive
// ---------------------------------------------------------------------------

pub(super) fn receive_waiting_for(sessions: &[SessionId]) -> Option<WaitingFor> {
    Some(WaitingFor::SessionData {
        session_ids: sessions.to_vec(),
    })
}

pub(super) fn receive(
    ctx: &mut FlowEventContext,
    sessions: &[SessionId],
    session_manager: &SessionManager,
) -> Result<(), FlowProcessingError> {
    session_manager.validate_session_statuses(&ctx.checkpoint, sessions, &TRANSFER_STATUSES)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// SendAndReceive
// ---------------------------------------------------------------------------

pub(super) fn send_and_receive_waiting_for(
    payloads: &BTreeMap<SessionId, Vec<u8>>,
) -> Option<WaitingFor> {
    // The receive side is the earlier-registered condition: the flow parks
    // on the replies, never on delivery of its own sends.
    Some(WaitingFor::SessionData {
        session_ids: payloads.keys().cloned().collect(),
    })
}

pub(super) fn send_and_receive(
    ctx: &mut FlowEventContext,
    payloads: &BTreeMap<SessionId, Vec<u8>>,
    session_manager: &SessionManager,
) -> Result<(), FlowProcessingError> {
    send_payloads(ctx, payloads, session_manager)
}

// ---------------------------------------------------------------------------
// CloseSessions
// ---------------------------------------------------------------------------

pub(super) fn close_sessions_waiting_for(sessions: &[SessionId]) -> Option<WaitingFor> {
    Some(WaitingFor::SessionConfirmation {
        kind: ConfirmationKind::Close,
        session_ids: sessions.to_vec(),
    })
}

pub(super) fn close_sessions(
    ctx: &mut FlowEventContext,
    sessions: &[SessionId],
    session_manager: &SessionManager,
) -> Result<(), FlowProcessingError> {
    let now = ctx.now;
    let mut events = Vec::new();
    for session_id in sessions {
        let session = ctx
            .checkpoint
            .session_mut(session_id)
            .ok_or_else(|| FlowProcessingError::fatal(format!(
                "close requested for unknown session '{session_id}'"
            )))?;
        if let Some(event) = session_manager.initiate_close(session, now)? {
            events.push(event);
        }
    }
    for event in events {
        ctx.push_record(records::session_outbound_record(event));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// WaitForSessionConfirmations
// ---------------------------------------------------------------------------

pub(super) fn wait_for_confirmations_waiting_for(
    kind: ConfirmationKind,
    sessions: &[SessionId],
) -> Option<WaitingFor> {
    Some(WaitingFor::SessionConfirmation {
        kind,
        session_ids: sessions.to_vec(),
    })
}

pub(super) fn wait_for_confirmations(
    ctx: &mut FlowEventContext,
    sessions: &[SessionId],
    session_manager: &SessionManager,
) -> Result<(), FlowProcessingError> {
    // Only existence matters here; the waiting-for handler reads statuses.
    session_manager.get_sessions_with_statuses(
        &ctx.checkpoint,
        sessions,
        &[
            SessionStatus::Created,
            SessionStatus::Confirmed,
            SessionStatus::Closing,
            SessionStatus::Closed,
            SessionStatus::Error,
        ],
    )?;
    Ok(())
}

// ---------------------------------------------------------------------------
// GetFlowInfo
// ---------------------------------------------------------------------------

pub(super) fn get_flow_info_waiting_for() -> Option<WaitingFor> {
    Some(WaitingFor::Wakeup { deadline: None })
}

/// Flow metadata is served by the sandbox's injected services; the engine
/// only needs to validate the targets and drive the next pass.
pub(super) fn get_flow_info(
    ctx: &mut FlowEventContext,
    sessions: &[SessionId],
    session_manager: &SessionManager,
) -> Result<(), FlowProcessingError> {
    wait_for_confirmations(ctx, sessions, session_manager)?;
    let record = records::self_wakeup_record(&ctx.checkpoint.flow_id);
    ctx.push_record(record);
    Ok(())
}

// ---------------------------------------------------------------------------
// Shared
// ---------------------------------------------------------------------------

fn send_payloads(
    ctx: &mut FlowEventContext,
    payloads: &BTreeMap<SessionId, Vec<u8>>,
    session_manager: &SessionManager,
) -> Result<(), FlowProcessingError> {
    let now = ctx.now;
    let session_ids: Vec<SessionId> = payloads.keys().cloned().collect();
    session_manager.validate_session_statuses(
        &ctx.checkpoint,
        &session_ids,
        &TRANSFER_STATUSES,
    )?;

    let mut events = Vec::with_capacity(payloads.len());
    for (session_id, payload) in payloads {
        // Validated above.
        if let Some(session) = ctx.checkpoint.session_mut(session_id) {
            events.push(session_manager.record_send(session, payload.clone(), now));
        }
    }
    for event in events {
        ctx.push_record(records::session_outbound_record(event));
    }
    Ok(())
}
