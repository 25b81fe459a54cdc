// src/error.rs

//! Unified error handling for the sampling cache.

use std::fmt;

use thiserror::Error;

/// Result type alias for cache operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// The source identifier does not resolve to anything
    #[error("Source '{source_id}' could not be resolved")]
    SourceUnresolved { source_id: String },

    /// The source exists but has no position-bound metadata (a group, not a channel)
    #[error("Source '{source_id}' is not a broadcast channel")]
    SourceNotAddressable { source_id: String },

    /// Fetching from a source failed; the next scheduled run retries
    #[error("Fetch error for {context}: {message}")]
    Fetch { context: String, message: String },

    /// The pool holds no items
    #[error("Item pool is empty")]
    EmptyPool,

    /// The caller asked again inside the cooldown window
    #[error("Caller {caller} is throttled")]
    Throttled { caller: i64 },
}

impl AppError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a transient fetch error with context.
    pub fn fetch(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Fetch {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Create an error for a source that failed to resolve.
    pub fn unresolved(source_id: impl Into<String>) -> Self {
        Self::SourceUnresolved {
            source_id: source_id.into(),
        }
    }

    /// Create an error for a source that is not position-addressable.
    pub fn not_addressable(source_id: impl Into<String>) -> Self {
        Self::SourceNotAddressable {
            source_id: source_id.into(),
        }
    }

    /// Whether this error should exclude the source for the rest of the process.
    ///
    /// Everything else raised during a crawl is treated as transient.
    pub fn is_fatal_for_source(&self) -> bool {
        matches!(
            self,
            Self::SourceUnresolved { .. } | Self::SourceNotAddressable { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_errors_are_fatal_for_source() {
        assert!(AppError::unresolved("x").is_fatal_for_source());
        assert!(AppError::not_addressable("x").is_fatal_for_source());
    }

    #[test]
    fn transient_errors_are_not_fatal() {
        assert!(!AppError::fetch("x", "timeout").is_fatal_for_source());
        assert!(!AppError::EmptyPool.is_fatal_for_source());
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "slow");
        assert!(!AppError::from(io).is_fatal_for_source());
    }

    #[test]
    fn messages_name_the_source() {
        let err = AppError::not_addressable("anekdotcollection");
        assert_eq!(
            err.to_string(),
            "Source 'anekdotcollection' is not a broadcast channel"
        );
    }
}
