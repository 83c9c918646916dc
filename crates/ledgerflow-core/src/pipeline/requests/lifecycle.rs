//! Flow and sub-flow lifecycle request handlers.
//!
//! Terminal requests tombstone the checkpoint: the flow status record and a
//! cleanup-scheduling record are emitted, and the checkpoint stays readable
//! (consuming late events quietly) until its cleanup expiry passes.

use ledgerflow_types::checkpoint::FlowStatus;
use ledgerflow_types::request::{ConfirmationKind, WaitingFor};
use ledgerflow_types::session::{SessionId, SessionStatus};

use crate::pipeline::context::FlowEventContext;
use crate::pipeline::error::FlowProcessingError;
use crate::pipeline::records;
use crate::session::SessionManager;

// ---------------------------------------------------------------------------
// FlowFinished
// ---------------------------------------------------------------------------

pub(super) fn flow_finished(
    ctx: &mut FlowEventContext,
    result: Option<serde_json::Value>,
) -> Result<(), FlowProcessingError> {
    let open: Vec<&SessionId> = ctx
        .checkpoint
        .sessions
        .values()
        .filter(|session| !session.status.is_terminal())
        .map(|session| &session.session_id)
        .collect();
    if !open.is_empty() {
        tracing::warn!(
            flow_id = %ctx.checkpoint.flow_id,
            open_sessions = open.len(),
            "flow finished with sessions still open"
        );
    }

    ctx.checkpoint.status = FlowStatus::Completed;
    let expiry = ctx.now + ctx.config.cleanup_time();
    let status = records::flow_status_record(&ctx.checkpoint, FlowStatus::Completed, result, None);
    let cleanup = records::schedule_cleanup_record(&ctx.checkpoint, expiry);
    ctx.push_record(status);
    ctx.push_record(cleanup);
    ctx.checkpoint.mark_deleted(expiry);

    tracing::info!(flow_id = %ctx.checkpoint.flow_id, "flow completed");
    Ok(())
}

// ---------------------------------------------------------------------------
// FlowFailed
// ---------------------------------------------------------------------------

/// Best-effort-notify every open peer session, then terminate the flow.
///
/// A session-state failure while notifying peers is escalated to fatal:
/// the engine cannot safely leave peers unnotified and continue.
pub(super) fn flow_failed(
    ctx: &mut FlowEventContext,
    error: &str,
    session_manager: &SessionManager,
) -> Result<(), FlowProcessingError> {
    notify_sessions_of_failure(ctx, error, session_manager)
        .map_err(|e| FlowProcessingError::from(e).into_fatal())?;
    terminate_failed(ctx, error);
    Ok(())
}

/// The infallible failure path used when converting a fatal pipeline error:
/// notification problems are logged, never propagated.
pub(crate) fn fail_flow(ctx: &mut FlowEventContext, error: &str, session_manager: &SessionManager) {
    if let Err(e) = notify_sessions_of_failure(ctx, error, session_manager) {
        tracing::error!(
            flow_id = %ctx.checkpoint.flow_id,
            error = %e,
            "failed to notify peer sessions during flow failure"
        );
    }
    terminate_failed(ctx, error);
    ctx.checkpoint.suspend_count += 1;
}

fn notify_sessions_of_failure(
    ctx: &mut FlowEventContext,
    error: &str,
    session_manager: &SessionManager,
) -> Result<(), crate::session::SessionStateError> {
    let all_ids: Vec<SessionId> = ctx.checkpoint.sessions.keys().cloned().collect();
    let settled: Vec<SessionId> = session_manager
        .get_sessions_with_statuses(
            &ctx.checkpoint,
            &all_ids,
            &[SessionStatus::Error, SessionStatus::Closed],
        )?
        .iter()
        .map(|session| session.session_id.clone())
        .collect();
    let to_error: Vec<SessionId> = all_ids
        .into_iter()
        .filter(|id| !settled.contains(id))
        .collect();

    let events =
        session_manager.send_error_messages(&mut ctx.checkpoint, &to_error, error, ctx.now)?;
    for event in events {
        ctx.push_record(records::session_outbound_record(event));
    }
    Ok(())
}

fn terminate_failed(ctx: &mut FlowEventContext, error: &str) {
    ctx.checkpoint.status = FlowStatus::Failed;
    let expiry = ctx.now + ctx.config.cleanup_time();
    let status = records::flow_status_record(
        &ctx.checkpoint,
        FlowStatus::Failed,
        None,
        Some(error.to_string()),
    );
    let cleanup = records::schedule_cleanup_record(&ctx.checkpoint, expiry);
    ctx.push_record(status);
    ctx.push_record(cleanup);
    ctx.checkpoint.mark_deleted(expiry);

    tracing::info!(flow_id = %ctx.checkpoint.flow_id, error, "flow failed");
}

// ---------------------------------------------------------------------------
// SubFlowFinished
// ---------------------------------------------------------------------------

pub(super) fn sub_flow_finished_waiting_for(session_ids: &[SessionId]) -> Option<WaitingFor> {
    if session_ids.is_empty() {
        Some(WaitingFor::Wakeup { deadline: None })
    } else {
        Some(WaitingFor::SessionConfirmation {
            kind: ConfirmationKind::Close,
            session_ids: session_ids.to_vec(),
        })
    }
}

/// Pop the finished frame and close the sessions it initiated.
pub(super) fn sub_flow_finished(
    ctx: &mut FlowEventContext,
    session_ids: &[SessionId],
    session_manager: &SessionManager,
) -> Result<(), FlowProcessingError> {
    let frame = ctx.checkpoint.pop_frame();
    tracing::debug!(
        flow_id = %ctx.checkpoint.flow_id,
        frame = frame.as_ref().map(|f| f.flow_name.as_str()),
        sessions = session_ids.len(),
        "sub-flow finished"
    );

    if session_ids.is_empty() {
        let record = records::self_wakeup_record(&ctx.checkpoint.flow_id);
        ctx.push_record(record);
        return Ok(());
    }

    let now = ctx.now;
    let mut events = Vec::new();
    for session_id in session_ids {
        let session = ctx
            .checkpoint
            .session_mut(session_id)
            .ok_or_else(|| FlowProcessingError::fatal(format!(
                "sub-flow finished with unknown session '{session_id}'"
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
// SubFlowFailed
// ---------------------------------------------------------------------------

pub(super) fn sub_flow_failed_waiting_for() -> Option<WaitingFor> {
    Some(WaitingFor::Wakeup { deadline: None })
}

/// Pop the failed frame, error its sessions, and let the parent's error
/// handling continue on the next pass.
pub(super) fn sub_flow_failed(
    ctx: &mut FlowEventContext,
    error: &str,
    session_ids: &[SessionId],
    session_manager: &SessionManager,
) -> Result<(), FlowProcessingError> {
    let frame = ctx.checkpoint.pop_frame();
    tracing::debug!(
        flow_id = %ctx.checkpoint.flow_id,
        frame = frame.as_ref().map(|f| f.flow_name.as_str()),
        error,
        "sub-flow failed"
    );

    let to_error: Vec<SessionId> = session_ids
        .iter()
        .filter(|id| {
            ctx.checkpoint
                .session(id)
                .is_some_and(|session| !session.status.is_terminal())
        })
        .cloned()
        .collect();
    let events =
        session_manager.send_error_messages(&mut ctx.checkpoint, &to_error, error, ctx.now)?;
    for event in events {
        ctx.push_record(records::session_outbound_record(event));
    }

    let record = records::self_wakeup_record(&ctx.checkpoint.flow_id);
    ctx.push_record(record);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::requests::handle_request;
    use chrono::Utc;
    use ledgerflow_types::checkpoint::{FlowCheckpoint, FlowStackFrame};
    use ledgerflow_types::config::FlowEngineConfig;
    use ledgerflow_types::event::{
        FlowEvent, FlowEventPayload, FlowId, FlowKey, SessionMessage, StartFlowPayload,
    };
    use ledgerflow_types::identity::PartyIdentity;
    use ledgerflow_types::record::{RecordPayload, RecordTopic};
    use ledgerflow_types::request::FlowIoRequest;
    use ledgerflow_types::session::SessionState;
    use uuid::Uuid;

    fn context() -> FlowEventContext {
        let now = Utc::now();
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
        let flow_id = FlowId::new();
        let mut checkpoint = FlowCheckpoint::init_flow_state(flow_id.clone(), &start, now);
        checkpoint.push_frame(FlowStackFrame::new("com.example.TransferFlow", true));
        FlowEventContext::new(
            FlowEvent::new(flow_id, FlowEventPayload::Wakeup),
            checkpoint,
            FlowEngineConfig::default(),
            now,
        )
    }

    fn add_session(ctx: &mut FlowEventContext, id: &str, status: SessionStatus) {
        let mut session = SessionState::new(
            SessionId::new(id),
            PartyIdentity::new("O=Bob, L=London, C=GB", "group-1"),
            ctx.now,
        );
        session.status = status;
        ctx.checkpoint.put_session(session);
    }

    #[test]
    fn flow_finished_emits_status_and_cleanup_and_tombstones() {
        let mut ctx = context();
        let request = FlowIoRequest::FlowFinished {
            result: Some(serde_json::json!({ "ok": true })),
        };

        handle_request(&mut ctx, &request, &SessionManager::new()).unwrap();

        assert_eq!(ctx.checkpoint.status, FlowStatus::Completed);
        assert!(ctx.checkpoint.marked_for_deletion);
        assert!(ctx.checkpoint.waiting_for.is_none());
        assert_eq!(ctx.output_records.len(), 2);
        assert_eq!(ctx.output_records[0].topic, RecordTopic::FlowStatus);
        assert_eq!(ctx.output_records[1].topic, RecordTopic::FlowScheduling);
    }

    #[test]
    fn flow_failed_notifies_open_sessions_exactly() {
        let mut ctx = context();
        add_session(&mut ctx, "s1", SessionStatus::Confirmed);
        add_session(&mut ctx, "s2", SessionStatus::Confirmed);
        add_session(&mut ctx, "s3", SessionStatus::Closed);

        let request = FlowIoRequest::FlowFailed {
            error: "ledger rejected transaction".to_string(),
        };
        handle_request(&mut ctx, &request, &SessionManager::new()).unwrap();

        // Two error notifications (s3 already closed), one failed status,
        // one cleanup schedule.
        let error_records: Vec<_> = ctx
            .output_records
            .iter()
            .filter(|record| {
                matches!(
                    &record.payload,
                    RecordPayload::SessionOutbound(event)
                        if matches!(event.message, SessionMessage::Error { .. })
                )
            })
            .collect();
        assert_eq!(error_records.len(), 2);

        let status_records: Vec<_> = ctx
            .output_records
            .iter()
            .filter(|record| record.topic == RecordTopic::FlowStatus)
            .collect();
        assert_eq!(status_records.len(), 1);
        assert!(matches!(
            &status_records[0].payload,
            RecordPayload::FlowStatus(update) if update.status == FlowStatus::Failed
        ));

        let cleanup_records: Vec<_> = ctx
            .output_records
            .iter()
            .filter(|record| record.topic == RecordTopic::FlowScheduling)
            .collect();
        assert_eq!(cleanup_records.len(), 1);
        match &cleanup_records[0].payload {
            RecordPayload::ScheduleCleanup { expiry, .. } => {
                assert_eq!(*expiry, ctx.now + ctx.config.cleanup_time());
            }
            other => panic!("expected cleanup schedule, got {other:?}"),
        }

        assert!(ctx.checkpoint.marked_for_deletion);
        assert_eq!(ctx.checkpoint.status, FlowStatus::Failed);
        assert_eq!(
            ctx.checkpoint
                .session(&SessionId::new("s1"))
                .unwrap()
                .status,
            SessionStatus::Error
        );
    }

    #[test]
    fn sub_flow_finished_pops_frame_and_closes_sessions() {
        let mut ctx = context();
        ctx.checkpoint
            .push_frame(FlowStackFrame::new("com.example.SubFlow", true));
        add_session(&mut ctx, "s1", SessionStatus::Confirmed);

        let request = FlowIoRequest::SubFlowFinished {
            session_ids: vec![SessionId::new("s1")],
        };
        handle_request(&mut ctx, &request, &SessionManager::new()).unwrap();

        assert_eq!(ctx.checkpoint.flow_stack.len(), 1);
        assert_eq!(
            ctx.checkpoint
                .session(&SessionId::new("s1"))
                .unwrap()
                .status,
            SessionStatus::Closing
        );
        assert_eq!(
            ctx.checkpoint.waiting_for,
            Some(WaitingFor::SessionConfirmation {
                kind: ConfirmationKind::Close,
                session_ids: vec![SessionId::new("s1")],
            })
        );
    }

    #[test]
    fn sub_flow_finished_without_sessions_self_wakes() {
        let mut ctx = context();
        ctx.checkpoint
            .push_frame(FlowStackFrame::new("com.example.SubFlow", false));

        let request = FlowIoRequest::SubFlowFinished {
            session_ids: Vec::new(),
        };
        handle_request(&mut ctx, &request, &SessionManager::new()).unwrap();

        assert_eq!(ctx.checkpoint.flow_stack.len(), 1);
        assert_eq!(ctx.output_records.len(), 1);
        assert_eq!(ctx.output_records[0].topic, RecordTopic::FlowEvent);
        assert_eq!(
            ctx.checkpoint.waiting_for,
            Some(WaitingFor::Wakeup { deadline: None })
        );
    }

    #[test]
    fn sub_flow_failed_errors_sessions_and_self_wakes() {
        let mut ctx = context();
        ctx.checkpoint
            .push_frame(FlowStackFrame::new("com.example.SubFlow", true));
        add_session(&mut ctx, "s1", SessionStatus::Confirmed);
        add_session(&mut ctx, "s2", SessionStatus::Closed);

        let request = FlowIoRequest::SubFlowFailed {
            error: "sub-flow threw".to_string(),
            session_ids: vec![SessionId::new("s1"), SessionId::new("s2")],
        };
        handle_request(&mut ctx, &request, &SessionManager::new()).unwrap();

        assert_eq!(
            ctx.checkpoint
                .session(&SessionId::new("s1"))
                .unwrap()
                .status,
            SessionStatus::Error
        );
        // Closed session untouched.
        assert_eq!(
            ctx.checkpoint
                .session(&SessionId::new("s2"))
                .unwrap()
                .status,
            SessionStatus::Closed
        );
        // One error notification + one self wakeup.
        assert_eq!(ctx.output_records.len(), 2);
        assert_eq!(ctx.output_records[1].topic, RecordTopic::FlowEvent);
    }

    #[test]
    fn fail_flow_is_infallible_and_tombstones() {
        let mut ctx = context();
        add_session(&mut ctx, "s1", SessionStatus::Confirmed);

        fail_flow(&mut ctx, "post-body fault", &SessionManager::new());

        assert_eq!(ctx.checkpoint.status, FlowStatus::Failed);
        assert!(ctx.checkpoint.marked_for_deletion);
        assert!(
            ctx.output_records
                .iter()
                .any(|record| record.topic == RecordTopic::FlowStatus)
        );
    }
}
