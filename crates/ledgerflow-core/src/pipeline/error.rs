//! Error taxonomy for flow event processing.
//!
//! - `Transient` -- the event is not consumed; the bus redelivers it against
//!   the unmodified prior checkpoint.
//! - `Fatal` -- raised after the flow body may have executed side effects;
//!   converted to `FlowFailed` handling, never silently retried.
//! - `SessionState` -- a targeted session is missing or in an unexpected
//!   state; the calling handler decides whether to escalate.
//! - `UserFlowFailed` -- the flow body itself failed; routed to the
//!   flow-failed request handling.

use thiserror::Error;

use crate::session::SessionStateError;

/// Errors raised while processing one flow event.
#[derive(Debug, Clone, Error)]
pub enum FlowProcessingError {
    #[error("transient fault: {message}")]
    Transient { message: String },

    #[error("fatal fault: {message}")]
    Fatal { message: String },

    #[error("session state error: {0}")]
    SessionState(#[from] SessionStateError),

    #[error("flow failed: {message}")]
    UserFlowFailed { message: String },
}

impl FlowProcessingError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal {
            message: message.into(),
        }
    }

    /// Whether the triggering event should be redelivered.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FlowProcessingError::Transient { .. })
    }

    /// Escalate to fatal: used once the flow body has run, after which a
    /// retry would re-execute side effects.
    pub fn into_fatal(self) -> Self {
        match self {
            FlowProcessingError::Transient { message } => FlowProcessingError::Fatal { message },
            FlowProcessingError::SessionState(e) => FlowProcessingError::Fatal {
                message: e.to_string(),
            },
            other => other,
        }
    }
}
