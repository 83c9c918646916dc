use ledgerflow_types::session::{SessionId, SessionStatus};
use thiserror::Error;

/// A targeted session is missing or in an unexpected state.
///
/// Surfaced to the calling request handler, which decides whether to
/// escalate (e.g. failing to notify peers during flow failure is fatal).
#[derive(Debug, Clone, Error)]
pub enum SessionStateError {
    #[error("session '{0}' not found in checkpoint")]
    UnknownSession(SessionId),

    #[error("session '{session_id}' is {actual:?}, expected one of {expected:?}")]
    InvalidStatus {
        session_id: SessionId,
        actual: SessionStatus,
        expected: Vec<SessionStatus>,
    },

    #[error("session '{0}' already exists")]
    AlreadyExists(SessionId),
}
