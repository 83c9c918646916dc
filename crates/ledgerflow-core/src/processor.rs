//! The flow event processor: the message-bus-facing entry point.
//!
//! Maps one inbound event plus the prior checkpoint to a new checkpoint plus
//! a batch of outbound records. Pure with respect to external state: the
//! returned checkpoint is the sole persisted artifact, and the caller
//! commits it atomically with event-offset advancement.
//!
//! Recoverable conditions never surface as errors; the only error this
//! module returns is the explicit "do not commit, redeliver" signal for
//! transient fold faults. Fatal faults after the flow body has run are
//! converted into flow-failed handling internally, so side effects are
//! never re-executed by a retry.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use ledgerflow_types::checkpoint::FlowCheckpoint;
use ledgerflow_types::config::FlowEngineConfig;
use ledgerflow_types::event::{FlowEvent, FlowEventPayload, FlowId, SessionMessage};
use ledgerflow_types::record::OutboundRecord;
use thiserror::Error;

use crate::pipeline::context::FlowEventContext;
use crate::pipeline::requests::lifecycle::fail_flow;
use crate::pipeline::FlowEventPipeline;
use crate::runner::FlowRunner;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

/// Result of processing one event.
#[derive(Debug)]
pub struct FlowEventResponse {
    /// The checkpoint to commit; `None` once the flow has fully terminated
    /// and its cleanup window has elapsed.
    pub checkpoint: Option<FlowCheckpoint>,
    /// Records to publish atomically with the checkpoint.
    pub records: Vec<OutboundRecord>,
}

impl FlowEventResponse {
    fn empty() -> Self {
        Self {
            checkpoint: None,
            records: Vec::new(),
        }
    }
}

/// The event was not consumed: commit nothing and redeliver it against the
/// unmodified prior checkpoint.
#[derive(Debug, Clone, Error)]
#[error("flow {flow_id}: event not consumed, redeliver: {reason}")]
pub struct FlowRetryRequest {
    pub flow_id: FlowId,
    pub reason: String,
}

/// Time source for the processor; injectable for deterministic tests.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

// ---------------------------------------------------------------------------
// FlowEventProcessor
// ---------------------------------------------------------------------------

/// Top-level state-and-event processor for the flow event topic.
pub struct FlowEventProcessor<R: FlowRunner> {
    pipeline: FlowEventPipeline<R>,
    config: FlowEngineConfig,
    clock: Clock,
}

impl<R: FlowRunner> FlowEventProcessor<R> {
    pub fn new(runner: R, config: FlowEngineConfig) -> Self {
        Self::with_clock(runner, config, Arc::new(Utc::now))
    }

    /// Construct with an explicit time source.
    pub fn with_clock(runner: R, config: FlowEngineConfig, clock: Clock) -> Self {
        Self {
            pipeline: FlowEventPipeline::new(runner),
            config,
            clock,
        }
    }

    /// Process one event against the prior checkpoint.
    pub async fn process(
        &self,
        state: Option<FlowCheckpoint>,
        event: FlowEvent,
    ) -> Result<FlowEventResponse, FlowRetryRequest> {
        let now = (self.clock)();

        let checkpoint = match self.resolve_checkpoint(state, &event, now)? {
            Resolved::Live(checkpoint) => checkpoint,
            Resolved::Consumed(response) => return Ok(response),
        };

        let prior = checkpoint.clone();
        let mut ctx = FlowEventContext::new(event, checkpoint, self.config.clone(), now);

        match self.pipeline.execute(&mut ctx).await {
            Ok(()) => {}
            Err(e) if e.is_retryable() => {
                tracing::warn!(
                    flow_id = %prior.flow_id,
                    error = %e,
                    "transient fault while folding event, requesting redelivery"
                );
                return Err(FlowRetryRequest {
                    flow_id: prior.flow_id,
                    reason: e.to_string(),
                });
            }
            Err(e) => {
                tracing::error!(
                    flow_id = %prior.flow_id,
                    error = %e,
                    "fatal fault, converting to flow failure"
                );
                // Rebuild from the prior checkpoint: the failed pass may
                // have left the context half-mutated.
                ctx = FlowEventContext::new(ctx.event, prior, self.config.clone(), now);
                fail_flow(&mut ctx, &e.to_string(), self.pipeline.session_manager());
            }
        }

        ctx.checkpoint.last_updated_at = now;
        Ok(FlowEventResponse {
            checkpoint: Some(ctx.checkpoint),
            records: ctx.output_records,
        })
    }

    /// Decide whether the event reaches the pipeline, and against which
    /// checkpoint.
    fn resolve_checkpoint(
        &self,
        state: Option<FlowCheckpoint>,
        event: &FlowEvent,
        now: DateTime<Utc>,
    ) -> Result<Resolved, FlowRetryRequest> {
        match (state, &event.payload) {
            (Some(checkpoint), _) if checkpoint.is_expired(now) => {
                tracing::info!(
                    flow_id = %checkpoint.flow_id,
                    "cleanup window elapsed, purging checkpoint"
                );
                Ok(Resolved::Consumed(FlowEventResponse::empty()))
            }
            (Some(checkpoint), _) if checkpoint.marked_for_deletion => {
                tracing::debug!(
                    flow_id = %checkpoint.flow_id,
                    event = event.kind(),
                    "event for terminated flow consumed"
                );
                Ok(Resolved::Consumed(FlowEventResponse {
                    checkpoint: Some(checkpoint),
                    records: Vec::new(),
                }))
            }
            (Some(checkpoint), _) => Ok(Resolved::Live(checkpoint)),
            (None, FlowEventPayload::StartFlow(start)) => Ok(Resolved::Live(
                FlowCheckpoint::init_flow_state(event.flow_id.clone(), start, now),
            )),
            // A session-init may legitimately beat the StartFlow the mapper
            // derives from it: not consumed, redelivery will find state.
            (None, FlowEventPayload::SessionEvent(session_event))
                if matches!(session_event.message, SessionMessage::Init { .. }) =>
            {
                Err(FlowRetryRequest {
                    flow_id: event.flow_id.clone(),
                    reason: "session init before flow state exists".to_string(),
                })
            }
            // Anything else for an unknown flow is residue of a purged
            // checkpoint: consume it quietly.
            (None, _) => {
                tracing::warn!(
                    flow_id = %event.flow_id,
                    event = event.kind(),
                    "event for unknown flow consumed"
                );
                Ok(Resolved::Consumed(FlowEventResponse::empty()))
            }
        }
    }
}

enum Resolved {
    Live(FlowCheckpoint),
    Consumed(FlowEventResponse),
}
