//! Sleep and force-checkpoint request handlers.
//!
//! Neither holds a thread: a sleep stores its deadline in the checkpoint and
//! asks the external scheduler for a wakeup; a force-checkpoint emits an
//! immediate self-addressed wakeup so the flow resumes on the very next
//! event after the checkpoint commits.

use chrono::Duration;
use ledgerflow_types::request::WaitingFor;

use crate::pipeline::context::FlowEventContext;
use crate::pipeline::error::FlowProcessingError;
use crate::pipeline::records;

// ---------------------------------------------------------------------------
// Sleep
// ---------------------------------------------------------------------------

pub(super) fn sleep_waiting_for(ctx: &FlowEventContext, duration_ms: u64) -> Option<WaitingFor> {
    Some(WaitingFor::Wakeup {
        deadline: Some(ctx.now + Duration::milliseconds(duration_ms as i64)),
    })
}

pub(super) fn sleep(
    ctx: &mut FlowEventContext,
    duration_ms: u64,
) -> Result<(), FlowProcessingError> {
    let deadline = ctx.now + Duration::milliseconds(duration_ms as i64);
    let record = records::schedule_wakeup_record(&ctx.checkpoint.flow_id, deadline);
    ctx.push_record(record);
    tracing::debug!(
        flow_id = %ctx.checkpoint.flow_id,
        deadline = %deadline,
        "flow sleeping"
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// ForceCheckpoint
// ---------------------------------------------------------------------------

pub(super) fn force_checkpoint_waiting_for() -> Option<WaitingFor> {
    Some(WaitingFor::Wakeup { deadline: None })
}

pub(super) fn force_checkpoint(ctx: &mut FlowEventContext) -> Result<(), FlowProcessingError> {
    let record = records::self_wakeup_record(&ctx.checkpoint.flow_id);
    ctx.push_record(record);
    Ok(())
}
