//! Shared domain types for the ledgerflow execution pipeline.
//!
//! This crate contains the serializable state that flows through the engine:
//! checkpoints, sessions, events, suspension requests, and outbound records.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod event;
pub mod identity;
pub mod record;
pub mod request;
pub mod session;
