//! The cooperative suspension boundary between the pipeline and the
//! workflow sandbox.
//!
//! The sandbox executes the flow body synchronously against injected
//! services until it performs a suspending operation, then returns control
//! with a `FlowIoRequest` describing the suspension. Suspension is a data
//! artifact, never a blocked task: between pipeline invocations a flow
//! consumes zero compute.

use std::collections::BTreeMap;
use std::collections::VecDeque;

use dashmap::DashMap;
use ledgerflow_types::checkpoint::{FlowCheckpoint, FlowStackFrame};
use ledgerflow_types::event::FlowId;
use ledgerflow_types::request::FlowIoRequest;
use ledgerflow_types::session::SessionId;

use crate::pipeline::error::FlowProcessingError;

// ---------------------------------------------------------------------------
// Continuation types
// ---------------------------------------------------------------------------

/// The value a resumed flow body receives from its suspension point.
#[derive(Debug, Clone, PartialEq)]
pub enum ResumeValue {
    /// No payload (wakeups, confirmations).
    Unit,
    /// Start arguments for the first run of the body.
    Start(Option<serde_json::Value>),
    /// One in-order payload per session a receive was waiting on.
    Payloads(BTreeMap<SessionId, Vec<u8>>),
}

/// How the pipeline resumes (or declines to resume) the flow body.
#[derive(Debug, Clone, PartialEq)]
pub enum FlowContinuation {
    /// Resume the body with this value.
    Run(ResumeValue),
    /// The wait condition is unmet; do not run the body.
    Continue,
    /// Resume the body by delivering this error into it.
    Error(String),
}

// ---------------------------------------------------------------------------
// FlowRunner
// ---------------------------------------------------------------------------

/// Port to the workflow sandbox.
///
/// Implementations must push the root `FlowStackFrame` on the first run and
/// manage frame pushes for sub-flows; the pipeline pops frames when it
/// handles `SubFlowFinished`/`SubFlowFailed`. Exactly one `FlowIoRequest` is
/// returned per invocation.
///
/// Uses RPITIT (return-position `impl Trait` in traits) for async methods,
/// consistent with the project's Rust 2024 edition approach.
pub trait FlowRunner: Send + Sync {
    /// Resume the flow body with the continuation and return its next
    /// suspension request.
    fn run_flow(
        &self,
        checkpoint: &mut FlowCheckpoint,
        continuation: FlowContinuation,
    ) -> impl std::future::Future<Output = Result<FlowIoRequest, FlowProcessingError>> + Send;
}

impl<R: FlowRunner> FlowRunner for std::sync::Arc<R> {
    fn run_flow(
        &self,
        checkpoint: &mut FlowCheckpoint,
        continuation: FlowContinuation,
    ) -> impl std::future::Future<Output = Result<FlowIoRequest, FlowProcessingError>> + Send {
        R::run_flow(self, checkpoint, continuation)
    }
}

// ---------------------------------------------------------------------------
// ScriptedFlowRunner
// ---------------------------------------------------------------------------

/// Deterministic runner for tests and embedding: each flow id holds a queue
/// of the suspensions its body will produce, in order.
///
/// An `Error` continuation consumes the next scripted suspension if one
/// exists (the body "caught" the error), otherwise the body fails with it.
pub struct ScriptedFlowRunner {
    scripted: DashMap<FlowId, VecDeque<FlowIoRequest>>,
}

impl ScriptedFlowRunner {
    pub fn new() -> Self {
        Self {
            scripted: DashMap::new(),
        }
    }

    /// Queue the next suspension the flow body will produce.
    pub fn set_next_suspension(&self, flow_id: FlowId, request: FlowIoRequest) {
        self.scripted.entry(flow_id).or_default().push_back(request);
    }

    /// Queue several suspensions at once.
    pub fn script(&self, flow_id: FlowId, requests: impl IntoIterator<Item = FlowIoRequest>) {
        let mut queue = self.scripted.entry(flow_id).or_default();
        queue.extend(requests);
    }
}

impl Default for ScriptedFlowRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl FlowRunner for ScriptedFlowRunner {
    async fn run_flow(
        &self,
        checkpoint: &mut FlowCheckpoint,
        continuation: FlowContinuation,
    ) -> Result<FlowIoRequest, FlowProcessingError> {
        if checkpoint.flow_stack.is_empty() {
            checkpoint.push_frame(FlowStackFrame::new(checkpoint.flow_name.clone(), true));
        }

        let next = self
            .scripted
            .get_mut(&checkpoint.flow_id)
            .and_then(|mut queue| queue.pop_front());

        match (next, continuation) {
            (Some(request), _) => Ok(request),
            (None, FlowContinuation::Error(message)) => {
                Ok(FlowIoRequest::FlowFailed { error: message })
            }
            (None, _) => Err(FlowProcessingError::fatal(format!(
                "no scripted suspension for flow {}",
                checkpoint.flow_id
            ))),
        }
    }
}
