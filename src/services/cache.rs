// src/services/cache.rs

//! The cache service: owns every piece of shared state.
//!
//! One `CacheService` is built at startup and hands out the crawler,
//! scheduler and query server, all sharing the same pool, throttle and
//! per-source states.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::error::Result;
use crate::models::{BackendConfig, Config, ExtentMode};
use crate::pipeline::{Scheduler, spawn_extent_tracker};
use crate::services::{
    AccessThrottle, FileMessageSource, HttpMessageSource, MessageSource, QueryServer,
    SourceCrawler, SourceState,
};
use crate::storage::ItemPool;

pub struct CacheService {
    config: Arc<Config>,
    source: Arc<dyn MessageSource>,
    pool: Arc<ItemPool>,
    throttle: Arc<AccessThrottle>,
    sources: Vec<Arc<SourceState>>,
}

impl CacheService {
    /// Build the service around an existing message source.
    pub fn new(config: Arc<Config>, source: Arc<dyn MessageSource>) -> Self {
        let pool = Arc::new(ItemPool::new(config.max_capacity));
        let throttle = Arc::new(AccessThrottle::new(
            config.throttle_window(),
            config.throttle_max_entries,
        ));
        let sources = config
            .sources
            .iter()
            .map(|id| Arc::new(SourceState::new(id.as_str())))
            .collect();

        Self {
            config,
            source,
            pool,
            throttle,
            sources,
        }
    }

    /// Build the service with the backend named in the configuration.
    pub async fn from_config(config: Arc<Config>) -> Result<Self> {
        let source = connect(&config.backend).await?;
        Ok(Self::new(config, source))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn pool(&self) -> &Arc<ItemPool> {
        &self.pool
    }

    pub fn sources(&self) -> &[Arc<SourceState>] {
        &self.sources
    }

    pub fn crawler(&self) -> SourceCrawler {
        SourceCrawler::new(
            Arc::clone(&self.source),
            Arc::clone(&self.pool),
            self.config.batch_size,
            self.config.extent_mode,
        )
    }

    pub fn scheduler(&self) -> Scheduler {
        Scheduler::new(
            self.crawler(),
            self.sources.clone(),
            self.config.inter_source_delay(),
            self.config.inter_cycle_delay(),
        )
    }

    pub fn query_server(&self) -> QueryServer {
        QueryServer::new(
            Arc::clone(&self.pool),
            Arc::clone(&self.throttle),
            self.config.max_list_results,
        )
    }

    pub fn throttle(&self) -> &Arc<AccessThrottle> {
        &self.throttle
    }

    /// Follow new-message events, if the backend publishes them.
    ///
    /// Without a stream, tracked mode degrades to querying each source's
    /// extent on every run.
    pub fn spawn_extent_tracker(&self) -> Option<JoinHandle<()>> {
        let tracker = spawn_extent_tracker(self.source.as_ref(), self.sources.clone());
        if tracker.is_none() && self.config.extent_mode == ExtentMode::Tracked {
            log::warn!("Backend publishes no new-message events; querying extents on every run");
        }
        tracker
    }
}

/// Construct the configured message source backend.
pub async fn connect(backend: &BackendConfig) -> Result<Arc<dyn MessageSource>> {
    match backend {
        BackendConfig::Http(http) => {
            log::info!("Using HTTP message bridge at {}", http.base_url);
            Ok(Arc::new(HttpMessageSource::new(http)?))
        }
        BackendConfig::File { path } => {
            log::info!("Using message dump {}", path.display());
            Ok(Arc::new(FileMessageSource::load(path).await?))
        }
    }
}
