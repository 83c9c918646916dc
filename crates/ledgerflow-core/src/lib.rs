//! Flow execution pipeline for the ledgerflow platform.
//!
//! This crate is the engine "brain": it maps one inbound flow event plus the
//! prior checkpoint to a new checkpoint plus a batch of outbound records.
//! It defines the ports (checkpoint store, flow runner) that the
//! infrastructure layer implements. It depends only on `ledgerflow-types` --
//! never on `ledgerflow-infra` or any database/IO crate.
//!
//! - `pipeline` -- per-event orchestration: event handlers, waiting-for
//!   handlers, request handlers, global post-processing
//! - `processor` -- the message-bus-facing entry point
//! - `session` -- the peer-session sub-state-machine and its timers
//! - `runner` -- the cooperative suspension boundary to the sandbox
//! - `store` -- checkpoint store port
//! - `lifecycle` -- dependency-health state machine for engine components

pub mod lifecycle;
pub mod pipeline;
pub mod processor;
pub mod runner;
pub mod session;
pub mod store;
