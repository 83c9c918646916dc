//! Observability bootstrap for ledgerflow workers.

pub mod tracing_setup;
