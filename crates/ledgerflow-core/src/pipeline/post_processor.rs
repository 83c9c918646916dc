//! Global post-processing: the final pipeline stage, independent of which
//! request (if any) was handled.
//!
//! Walks every live session and applies the housekeeping timers:
//! acknowledgments for received traffic, resends of unacknowledged messages
//! past the resend window, and heartbeat-silence expiry. Runs on every
//! pipeline pass, including run-or-continue passes that never reached the
//! flow body.

use ledgerflow_types::record::OutboundRecord;

use crate::session::SessionManager;

use super::context::FlowEventContext;
use super::records;

pub(crate) fn run(ctx: &mut FlowEventContext, session_manager: &SessionManager) {
    if ctx.checkpoint.marked_for_deletion {
        return;
    }

    let now = ctx.now;
    let config = ctx.config.clone();
    let mut records_out: Vec<OutboundRecord> = Vec::new();
    for session in ctx.checkpoint.sessions.values_mut() {
        for event in session_manager.housekeeping(session, now, &config) {
            records_out.push(records::session_outbound_record(event));
        }
    }
    ctx.extend_records(records_out);

    tracing::debug!(
        flow_id = %ctx.checkpoint.flow_id,
        status = ?ctx.checkpoint.status,
        waiting_for = ctx.checkpoint.waiting_for.as_ref().map(|w| w.kind()),
        suspend_count = ctx.checkpoint.suspend_count,
        records = ctx.output_records.len(),
        "pipeline pass complete"
    );
}
