//! Request handlers: one per flow I/O request type.
//!
//! Each handler follows the same two-step contract: compute the flow's next
//! `WaitingFor`, then apply checkpoint mutations and append outbound
//! records. Side effects are confined to the context -- no handler performs
//! blocking I/O. Dispatch is a match over the request enum, grouped by
//! concern:
//! - `sessions` -- InitiateFlow, Send, Receive, SendAndReceive,
//!   CloseSessions, WaitForSessionConfirmations, GetFlowInfo
//! - `lifecycle` -- FlowFinished, FlowFailed, SubFlowFinished, SubFlowFailed
//! - `scheduling` -- Sleep, ForceCheckpoint

pub(crate) mod lifecycle;
pub(crate) mod scheduling;
pub(crate) mod sessions;

use ledgerflow_types::request::{FlowIoRequest, WaitingFor};

use crate::session::SessionManager;

use super::context::FlowEventContext;
use super::error::FlowProcessingError;

/// Apply one suspension request: compute the next wait condition, run the
/// handler's post-processing, then install the condition on the checkpoint.
pub(crate) fn handle_request(
    ctx: &mut FlowEventContext,
    request: &FlowIoRequest,
    session_manager: &SessionManager,
) -> Result<(), FlowProcessingError> {
    tracing::debug!(
        flow_id = %ctx.checkpoint.flow_id,
        request = request.kind(),
        "handling flow request"
    );

    let waiting_for = updated_waiting_for(ctx, request);
    post_process(ctx, request, session_manager)?;
    ctx.checkpoint.waiting_for = waiting_for;
    ctx.checkpoint.suspend_count += 1;
    Ok(())
}

fn updated_waiting_for(ctx: &FlowEventContext, request: &FlowIoRequest) -> Option<WaitingFor> {
    match request {
        FlowIoRequest::Send { .. } => sessions::send_waiting_for(),
        FlowIoRequest::Receive { sessions } => sessions::receive_waiting_for(sessions),
        FlowIoRequest::SendAndReceive { payloads } => {
            sessions::send_and_receive_waiting_for(payloads)
        }
        FlowIoRequest::InitiateFlow { session_id, .. } => {
            sessions::initiate_flow_waiting_for(session_id)
        }
        FlowIoRequest::CloseSessions { sessions } => {
            sessions::close_sessions_waiting_for(sessions)
        }
        FlowIoRequest::WaitForSessionConfirmations { kind, sessions } => {
            sessions::wait_for_confirmations_waiting_for(*kind, sessions)
        }
        FlowIoRequest::GetFlowInfo { .. } => sessions::get_flow_info_waiting_for(),
        FlowIoRequest::Sleep { duration_ms } => scheduling::sleep_waiting_for(ctx, *duration_ms),
        FlowIoRequest::ForceCheckpoint => scheduling::force_checkpoint_waiting_for(),
        FlowIoRequest::SubFlowFinished { session_ids } => {
            lifecycle::sub_flow_finished_waiting_for(session_ids)
        }
        FlowIoRequest::SubFlowFailed { .. } => lifecycle::sub_flow_failed_waiting_for(),
        FlowIoRequest::FlowFinished { .. } | FlowIoRequest::FlowFailed { .. } => None,
    }
}

fn post_process(
    ctx: &mut FlowEventContext,
    request: &FlowIoRequest,
    session_manager: &SessionManager,
) -> Result<(), FlowProcessingError> {
    match request {
        FlowIoRequest::Send { payloads } => sessions::send(ctx, payloads, session_manager),
        FlowIoRequest::Receive { sessions } => sessions::receive(ctx, sessions, session_manager),
        FlowIoRequest::SendAndReceive { payloads } => {
            sessions::send_and_receive(ctx, payloads, session_manager)
        }
        FlowIoRequest::InitiateFlow {
            counterparty,
            session_id,
        } => sessions::initiate_flow(ctx, counterparty, session_id, session_manager),
        FlowIoRequest::CloseSessions { sessions } => {
            sessions::close_sessions(ctx, sessions, session_manager)
        }
        FlowIoRequest::WaitForSessionConfirmations { sessions, .. } => {
            sessions::wait_for_confirmations(ctx, sessions, session_manager)
        }
        FlowIoRequest::GetFlowInfo { sessions } => {
            sessions::get_flow_info(ctx, sessions, session_manager)
        }
        FlowIoRequest::Sleep { duration_ms } => scheduling::sleep(ctx, *duration_ms),
        FlowIoRequest::ForceCheckpoint => scheduling::force_checkpoint(ctx),
        FlowIoRequest::SubFlowFinished { session_ids } => {
            lifecycle::sub_flow_finished(ctx, session_ids, session_manager)
        }
        FlowIoRequest::SubFlowFailed { error, session_ids } => {
            lifecycle::sub_flow_failed(ctx, error, session_ids, session_manager)
        }
        FlowIoRequest::FlowFinished { result } => {
            lifecycle::flow_finished(ctx, result.clone())
        }
        FlowIoRequest::FlowFailed { error } => {
            lifecycle::flow_failed(ctx, error, session_manager)
        }
    }
}
