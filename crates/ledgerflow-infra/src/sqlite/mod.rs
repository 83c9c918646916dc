//! SQLite persistence for flow checkpoints.

pub mod checkpoint;
pub mod pool;

pub use checkpoint::SqliteCheckpointStore;
pub use pool::DatabasePool;
