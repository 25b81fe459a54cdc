//! In-process storage for sampled items.
//!
//! Nothing here survives a restart: the pool is rebuilt by the crawler
//! from scratch on every start.

pub mod pool;

// Re-export for convenience
pub use pool::{InsertOutcome, ItemPool};
