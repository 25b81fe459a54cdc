//! Application configuration structures.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source identifiers, crawled round-robin in this order
    #[serde(default)]
    pub sources: Vec<String>,

    /// Candidate positions drawn per crawl run
    #[serde(default = "defaults::batch_size")]
    pub batch_size: usize,

    /// Upper bound on pool size
    #[serde(default = "defaults::max_capacity")]
    pub max_capacity: usize,

    /// Pause after each source before the next one
    #[serde(default = "defaults::inter_source_delay")]
    pub crawl_inter_source_delay_ms: u64,

    /// Pause after a full pass over all sources
    #[serde(default = "defaults::inter_cycle_delay")]
    pub crawl_inter_cycle_delay_ms: u64,

    /// Per-caller cooldown window
    #[serde(default = "defaults::throttle_window")]
    pub throttle_window_ms: u64,

    /// Throttle map size that triggers a sweep of stale callers
    #[serde(default = "defaults::throttle_max_entries")]
    pub throttle_max_entries: usize,

    /// Default number of results for list requests
    #[serde(default = "defaults::max_list_results")]
    pub max_list_results: usize,

    /// How source extents are kept fresh
    #[serde(default)]
    pub extent_mode: ExtentMode,

    /// Message source backend
    #[serde(default)]
    pub backend: BackendConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(AppError::validation("batch_size must be > 0"));
        }
        if self.max_capacity == 0 {
            return Err(AppError::validation("max_capacity must be > 0"));
        }
        if self.max_list_results == 0 {
            return Err(AppError::validation("max_list_results must be > 0"));
        }
        if self.throttle_max_entries == 0 {
            return Err(AppError::validation("throttle_max_entries must be > 0"));
        }

        let mut seen = HashSet::new();
        for source in &self.sources {
            if source.trim().is_empty() {
                return Err(AppError::validation("sources contains a blank identifier"));
            }
            if !seen.insert(source.as_str()) {
                return Err(AppError::validation(format!(
                    "source '{source}' is listed more than once"
                )));
            }
        }

        match &self.backend {
            BackendConfig::Http(http) => {
                if http.user_agent.trim().is_empty() {
                    return Err(AppError::validation("backend.user_agent is empty"));
                }
                if http.timeout_secs == 0 {
                    return Err(AppError::validation("backend.timeout_secs must be > 0"));
                }
                url::Url::parse(&http.base_url)?;
            }
            BackendConfig::File { path } => {
                if path.as_os_str().is_empty() {
                    return Err(AppError::validation("backend.path is empty"));
                }
            }
        }
        Ok(())
    }

    pub fn inter_source_delay(&self) -> Duration {
        Duration::from_millis(self.crawl_inter_source_delay_ms)
    }

    pub fn inter_cycle_delay(&self) -> Duration {
        Duration::from_millis(self.crawl_inter_cycle_delay_ms)
    }

    pub fn throttle_window(&self) -> Duration {
        Duration::from_millis(self.throttle_window_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            batch_size: defaults::batch_size(),
            max_capacity: defaults::max_capacity(),
            crawl_inter_source_delay_ms: defaults::inter_source_delay(),
            crawl_inter_cycle_delay_ms: defaults::inter_cycle_delay(),
            throttle_window_ms: defaults::throttle_window(),
            throttle_max_entries: defaults::throttle_max_entries(),
            max_list_results: defaults::max_list_results(),
            extent_mode: ExtentMode::default(),
            backend: BackendConfig::default(),
        }
    }
}

/// Strategy for keeping a source's extent current.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtentMode {
    /// Query the extent once and follow new-message events afterwards
    #[default]
    Tracked,
    /// Query the extent on every crawl run
    Refresh,
}

/// Message source backend selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    /// JSON bridge over HTTP
    Http(HttpBackendConfig),
    /// JSON dump on local disk
    File { path: PathBuf },
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self::Http(HttpBackendConfig::default())
    }
}

/// HTTP bridge settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpBackendConfig {
    /// Bridge root URL
    #[serde(default = "defaults::base_url")]
    pub base_url: String,

    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,
}

impl Default for HttpBackendConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::base_url(),
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
        }
    }
}

mod defaults {
    pub fn batch_size() -> usize {
        100
    }
    pub fn max_capacity() -> usize {
        100_000
    }
    pub fn inter_source_delay() -> u64 {
        30_000
    }
    pub fn inter_cycle_delay() -> u64 {
        1_000
    }
    pub fn throttle_window() -> u64 {
        1_000
    }
    pub fn throttle_max_entries() -> usize {
        10_000
    }
    pub fn max_list_results() -> usize {
        10
    }

    // Backend defaults
    pub fn base_url() -> String {
        "http://127.0.0.1:8080/".into()
    }
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; anekdot/0.1)".into()
    }
    pub fn timeout() -> u64 {
        30
    }
}
