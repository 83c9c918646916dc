//! Waiting-for handlers: the run-or-continue decision.
//!
//! One handler per suspension reason. Each inspects the folded checkpoint
//! and the triggering event and decides whether the flow's single wait
//! condition is now met. A checkpoint whose `waiting_for` is `None` is
//! terminal and never resumes.

use std::collections::BTreeMap;

use ledgerflow_types::event::FlowEventPayload;
use ledgerflow_types::request::{ConfirmationKind, WaitingFor};
use ledgerflow_types::session::{SessionId, SessionStatus};

use crate::runner::{FlowContinuation, ResumeValue};

use super::context::FlowEventContext;
use super::error::FlowProcessingError;

/// Decide whether the flow body runs for this event, and with what input.
pub(crate) fn evaluate(
    ctx: &mut FlowEventContext,
) -> Result<FlowContinuation, FlowProcessingError> {
    let Some(waiting_for) = ctx.checkpoint.waiting_for.clone() else {
        return Ok(FlowContinuation::Continue);
    };

    match waiting_for {
        WaitingFor::StartFlow => Ok(start_flow(ctx)),
        WaitingFor::Wakeup { .. } => Ok(wakeup(ctx)),
        WaitingFor::SessionConfirmation { kind, session_ids } => {
            Ok(session_confirmation(ctx, kind, &session_ids))
        }
        WaitingFor::SessionData { session_ids } => Ok(session_data(ctx, &session_ids)),
        WaitingFor::SessionInit { session_id } => Ok(session_init(ctx, &session_id)),
    }
}

/// A brand-new flow runs once its StartFlow event arrives.
fn start_flow(ctx: &FlowEventContext) -> FlowContinuation {
    match &ctx.event.payload {
        FlowEventPayload::StartFlow(start) => {
            FlowContinuation::Run(ResumeValue::Start(start.start_args.clone()))
        }
        _ => FlowContinuation::Continue,
    }
}

/// Sleeps and self-wakeups resume on any wakeup event; the external
/// scheduler owns deadline accuracy.
fn wakeup(ctx: &FlowEventContext) -> FlowContinuation {
    match &ctx.event.payload {
        FlowEventPayload::Wakeup => FlowContinuation::Run(ResumeValue::Unit),
        _ => FlowContinuation::Continue,
    }
}

/// Resume once every named session reached the awaited confirmation.
/// An errored session resumes the body with the error instead.
fn session_confirmation(
    ctx: &FlowEventContext,
    kind: ConfirmationKind,
    session_ids: &[SessionId],
) -> FlowContinuation {
    if let Some(errored) = first_errored(ctx, session_ids) {
        return errored;
    }

    let awaited = match kind {
        ConfirmationKind::Initiate => SessionStatus::Confirmed,
        ConfirmationKind::Close => SessionStatus::Closed,
    };

    let all_reached = session_ids.iter().all(|id| {
        ctx.checkpoint
            .session(id)
            .is_some_and(|session| session.status == awaited)
    });

    if all_reached {
        FlowContinuation::Run(ResumeValue::Unit)
    } else {
        FlowContinuation::Continue
    }
}

/// Resume once every named session holds its next in-order payload,
/// consuming one payload per session.
fn session_data(ctx: &mut FlowEventContext, session_ids: &[SessionId]) -> FlowContinuation {
    if let Some(errored) = first_errored(ctx, session_ids) {
        return errored;
    }

    let all_ready = session_ids.iter().all(|id| {
        ctx.checkpoint
            .session(id)
            .is_some_and(|session| !session.pending_payloads.is_empty())
    });
    if !all_ready {
        return FlowContinuation::Continue;
    }

    let mut payloads = BTreeMap::new();
    for id in session_ids {
        // all_ready guarantees presence; remove(0) keeps arrival order.
        if let Some(session) = ctx.checkpoint.session_mut(id) {
            payloads.insert(id.clone(), session.pending_payloads.remove(0));
        }
    }
    FlowContinuation::Run(ResumeValue::Payloads(payloads))
}

/// An initiated flow runs once its opening session exists.
fn session_init(ctx: &FlowEventContext, session_id: &SessionId) -> FlowContinuation {
    if ctx.checkpoint.session(session_id).is_some() {
        FlowContinuation::Run(ResumeValue::Start(ctx.checkpoint.flow_start_args.clone()))
    } else {
        FlowContinuation::Continue
    }
}

/// An errored session while waiting resumes the body with the error, so the
/// flow observes peer failure instead of hanging.
fn first_errored(ctx: &FlowEventContext, session_ids: &[SessionId]) -> Option<FlowContinuation> {
    session_ids
        .iter()
        .find(|id| {
            ctx.checkpoint
                .session(id)
                .is_some_and(|session| session.status == SessionStatus::Error)
        })
        .map(|id| FlowContinuation::Error(format!("session '{id}' errored while awaited")))
}
