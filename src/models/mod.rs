// src/models/mod.rs

//! Domain models for the sampling cache.
//!
//! This module contains the data structures shared between the crawler,
//! the pool and the query surfaces.

mod config;
mod item;
mod message;

// Re-export all public types
pub use config::{BackendConfig, Config, ExtentMode, HttpBackendConfig};
pub use item::Item;
pub use message::{Message, NewMessageEvent, Position, SourceHandle};

/// Identity of an end user issuing a read request.
pub type CallerId = i64;
