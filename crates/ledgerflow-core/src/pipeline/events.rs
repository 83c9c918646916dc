//! Event handlers: the first pipeline stage.
//!
//! One handler per inbound event type, dispatched by a match over the
//! payload enum. A handler validates the event against current checkpoint
//! state and folds its data in before any run-or-continue decision is made.
//! Failures here are transient by default: the event is not consumed and
//! redelivery repeats the fold against the unmodified prior checkpoint.

use ledgerflow_types::event::{FlowEventPayload, SessionEvent, SessionMessage, StartFlowPayload};
use ledgerflow_types::request::WaitingFor;

use crate::session::SessionManager;

use super::context::FlowEventContext;
use super::error::FlowProcessingError;

/// Dispatch the event to its handler.
pub(crate) fn handle_event(
    ctx: &mut FlowEventContext,
    session_manager: &SessionManager,
) -> Result<(), FlowProcessingError> {
    let payload = ctx.event.payload.clone();
    match payload {
        FlowEventPayload::StartFlow(start) => handle_start_flow(ctx, &start),
        FlowEventPayload::SessionEvent(event) => {
            handle_session_event(ctx, &event, session_manager)
        }
        FlowEventPayload::Wakeup => handle_wakeup(ctx),
    }
}

/// Validate a `StartFlow` against the checkpoint.
///
/// The processor folds the very first start into a blank checkpoint before
/// the pipeline runs, so by the time this handler executes the checkpoint is
/// always initialized: a matching flow key is a redelivered duplicate (the
/// run-or-continue stage will decline to run unless the flow is still
/// waiting on its start), a different key on the same flow id is fatal.
fn handle_start_flow(
    ctx: &mut FlowEventContext,
    start: &StartFlowPayload,
) -> Result<(), FlowProcessingError> {
    if ctx.checkpoint.flow_key != start.flow_key {
        return Err(FlowProcessingError::fatal(format!(
            "start flow for flow id {} carries key {} but checkpoint holds {}",
            ctx.checkpoint.flow_id, start.flow_key, ctx.checkpoint.flow_key
        )));
    }

    if ctx.checkpoint.waiting_for != Some(WaitingFor::StartFlow) {
        tracing::debug!(
            flow_id = %ctx.checkpoint.flow_id,
            "duplicate start flow event"
        );
    }
    Ok(())
}

/// Fold an inbound session message into the addressed session.
fn handle_session_event(
    ctx: &mut FlowEventContext,
    event: &SessionEvent,
    session_manager: &SessionManager,
) -> Result<(), FlowProcessingError> {
    let now = ctx.now;

    if let SessionMessage::Init { initiator, .. } = &event.message {
        session_manager.create_initiated_session(
            &mut ctx.checkpoint,
            event,
            initiator.clone(),
            now,
        );
        return Ok(());
    }

    let Some(session) = ctx.checkpoint.session_mut(&event.session_id) else {
        // State may lag the peer (e.g. our init not yet committed when the
        // ack arrives): not consumed, redelivery will find the session.
        return Err(FlowProcessingError::transient(format!(
            "session event for unknown session '{}'",
            event.session_id
        )));
    };

    let outcome = session_manager.apply_inbound(session, event, now);
    tracing::debug!(
        flow_id = %ctx.checkpoint.flow_id,
        session_id = %event.session_id,
        message = event.message.kind(),
        outcome = ?outcome,
        "folded session event"
    );
    Ok(())
}

/// Wakeups carry no data; the checkpoint must simply exist.
fn handle_wakeup(ctx: &mut FlowEventContext) -> Result<(), FlowProcessingError> {
    tracing::debug!(flow_id = %ctx.checkpoint.flow_id, "wakeup received");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ledgerflow_types::checkpoint::FlowCheckpoint;
    use ledgerflow_types::config::FlowEngineConfig;
    use ledgerflow_types::event::{FlowEvent, FlowId, FlowKey};
    use ledgerflow_types::identity::PartyIdentity;
    use ledgerflow_types::session::{SessionId, SessionStatus};
    use uuid::Uuid;

    fn start_payload() -> StartFlowPayload {
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

    fn context_for(payload: FlowEventPayload) -> FlowEventContext {
        let now = Utc::now();
        let start = start_payload();
        let flow_id = FlowId::new();
        let checkpoint = FlowCheckpoint::init_flow_state(flow_id.clone(), &start, now);
        FlowEventContext::new(
            FlowEvent::new(flow_id, payload),
            checkpoint,
            FlowEngineConfig::default(),
            now,
        )
    }

    #[test]
    fn start_flow_with_conflicting_key_is_fatal() {
        let mut ctx = context_for(FlowEventPayload::StartFlow(start_payload()));
        // The context's checkpoint was initialized from a different key.
        let err = handle_event(&mut ctx, &SessionManager::new()).unwrap_err();
        assert!(!err.is_retryable());
    }

    #[test]
    fn start_flow_with_matching_key_is_idempotent() {
        let now = Utc::now();
        let start = start_payload();
        let flow_id = FlowId::new();
        let checkpoint = FlowCheckpoint::init_flow_state(flow_id.clone(), &start, now);
        let mut ctx = FlowEventContext::new(
            FlowEvent::new(flow_id, FlowEventPayload::StartFlow(start)),
            checkpoint,
            FlowEngineConfig::default(),
            now,
        );

        handle_event(&mut ctx, &SessionManager::new()).unwrap();
        assert_eq!(ctx.checkpoint.waiting_for, Some(WaitingFor::StartFlow));
    }

    #[test]
    fn session_init_creates_confirmed_session() {
        let session_id = SessionId::new("s1-INITIATED");
        let event = SessionEvent {
            session_id: session_id.clone(),
            sequence_number: 1,
            timestamp: Utc::now(),
            message: SessionMessage::Init {
                flow_name: "com.example.TransferFlow".to_string(),
                initiator: PartyIdentity::new("O=Bob, L=London, C=GB", "group-1"),
                initiated_session_id: session_id.clone(),
            },
        };
        let mut ctx = context_for(FlowEventPayload::SessionEvent(event));

        handle_event(&mut ctx, &SessionManager::new()).unwrap();

        let session = ctx.checkpoint.session(&session_id).unwrap();
        assert_eq!(session.status, SessionStatus::Confirmed);
        assert_eq!(session.receive_sequence_number, 1);
    }

    #[test]
    fn session_event_for_unknown_session_is_transient() {
        let event = SessionEvent {
            session_id: SessionId::new("missing"),
            sequence_number: 1,
            timestamp: Utc::now(),
            message: SessionMessage::Data { payload: vec![1] },
        };
        let mut ctx = context_for(FlowEventPayload::SessionEvent(event));

        let err = handle_event(&mut ctx, &SessionManager::new()).unwrap_err();
        assert!(err.is_retryable());
    }
}
