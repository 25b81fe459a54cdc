//! Service layer for the sampling cache.
//!
//! This module contains the business logic for:
//! - Message fetching (`MessageSource` and its backends)
//! - Filtering and sampling sources into the pool (`SourceCrawler`)
//! - Rate limiting callers (`AccessThrottle`)
//! - Serving items to callers (`QueryServer`)
//! - Owning the shared state (`CacheService`)

mod cache;
mod crawler;
mod file_source;
pub mod filter;
mod http_source;
mod query;
pub(crate) mod source;
mod throttle;

pub use cache::{CacheService, connect};
pub use crawler::{CrawlOutcome, SourceCrawler, SourceState, random_positions};
pub use file_source::FileMessageSource;
pub use http_source::HttpMessageSource;
pub use query::{InlineResult, QueryServer, Responder};
pub use source::MessageSource;
pub use throttle::AccessThrottle;
