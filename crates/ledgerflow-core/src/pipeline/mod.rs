//! The flow event pipeline: orchestration of one event for one flow.
//!
//! Stages, strictly ordered:
//! 1. Event handler dispatch -- validate and fold the event into the
//!    checkpoint (`events`)
//! 2. Run-or-continue decision -- stop here with bookkeeping records only
//!    when the flow's wait condition is unmet (`waiting`)
//! 3. Flow runner invocation -- resume the body with the event's payload,
//!    yielding exactly one new `FlowIoRequest` (`runner`)
//! 4. Request handler dispatch -- compute the next wait condition, mutate
//!    session/stack state, append records (`requests`)
//! 5. Global post-processing -- session housekeeping independent of request
//!    type (`post_processor`)
//!
//! Within one event at most one resumption occurs; a flow that suspends
//! again without consuming new input (e.g. force-checkpoint) is driven by
//! the next, typically self-addressed, event.
//!
//! Failure semantics: stage 1-2 errors leave the event unconsumed
//! (transient faults are redelivered against the unmodified checkpoint);
//! any error after the body has run is escalated to fatal, because a retry
//! would re-execute the body's side effects.

pub mod context;
pub mod error;
pub(crate) mod events;
pub(crate) mod post_processor;
pub(crate) mod records;
pub(crate) mod requests;
pub(crate) mod waiting;

use crate::runner::{FlowContinuation, FlowRunner};
use crate::session::SessionManager;

use context::FlowEventContext;
use error::FlowProcessingError;

/// Drives the five stages for one event.
pub struct FlowEventPipeline<R: FlowRunner> {
    runner: R,
    session_manager: SessionManager,
}

impl<R: FlowRunner> FlowEventPipeline<R> {
    pub fn new(runner: R) -> Self {
        Self {
            runner,
            session_manager: SessionManager::new(),
        }
    }

    /// Execute one pipeline pass over the context.
    pub async fn execute(&self, ctx: &mut FlowEventContext) -> Result<(), FlowProcessingError> {
        events::handle_event(ctx, &self.session_manager)?;

        let continuation = waiting::evaluate(ctx)?;
        if continuation == FlowContinuation::Continue {
            tracing::debug!(
                flow_id = %ctx.checkpoint.flow_id,
                event = ctx.event.kind(),
                waiting_for = ctx.checkpoint.waiting_for.as_ref().map(|w| w.kind()),
                "wait condition unmet, flow body not run"
            );
            post_processor::run(ctx, &self.session_manager);
            return Ok(());
        }

        // From here on the body may execute side effects: every failure is
        // fatal for this flow, never retried.
        let request = self
            .runner
            .run_flow(&mut ctx.checkpoint, continuation)
            .await
            .map_err(FlowProcessingError::into_fatal)?;

        requests::handle_request(ctx, &request, &self.session_manager)
            .map_err(FlowProcessingError::into_fatal)?;

        post_processor::run(ctx, &self.session_manager);
        Ok(())
    }

    pub(crate) fn session_manager(&self) -> &SessionManager {
        &self.session_manager
    }
}
