//! Pipeline entry points for background work.
//!
//! - `Scheduler`: round-robin crawl loop over all sources
//! - `spawn_extent_tracker`: follows new-message events to keep extents fresh
//! - `spawn_throttle_sweeper`: drops idle callers from the throttle

pub mod extent;
pub mod schedule;

pub use extent::{spawn_extent_tracker, track_extents};
pub use schedule::{CycleReport, Scheduler, SourceReport, SourceRun, spawn_throttle_sweeper};
