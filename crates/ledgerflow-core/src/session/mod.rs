//! Peer-session sub-state-machine.
//!
//! - `manager` -- folds inbound session messages, produces outbound ones,
//!   and applies the resend/heartbeat timer configuration
//! - `error` -- the typed session-state error surfaced to request handlers

pub mod error;
pub mod manager;

pub use error::SessionStateError;
pub use manager::{InboundOutcome, SessionManager};
