//! Storage layer
//!
//! Everything below the public [`crate::Store`] surface:
//!
//! - **disk**: one JSON file per key, atomic writes
//! - **queue**: in-memory cache and pending write queue
//! - **stats**: disk I/O counters
//! - **error**: the error taxonomy shared by all store operations

pub(crate) mod disk;
pub mod error;
pub mod queue;
pub mod stats;

pub use error::{StoreError, StoreResult};
pub use queue::{CacheEntry, PendingOp};
pub use stats::StorageStats;
