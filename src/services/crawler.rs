// src/services/crawler.rs

//! Source crawler service.
//!
//! Draws random positions from a source's history, fetches them, filters
//! the results and feeds the survivors into the item pool.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use rand::Rng;

use crate::error::{AppError, Result};
use crate::models::{ExtentMode, Position, SourceHandle};
use crate::services::MessageSource;
use crate::services::filter;
use crate::storage::ItemPool;

/// Per-source cursor data shared between the crawler and the extent tracker.
#[derive(Debug)]
pub struct SourceState {
    identifier: String,
    handle: Mutex<Option<SourceHandle>>,
    extent: AtomicU64,
    extent_known: AtomicBool,
    /// New messages seen while an extent query is in flight
    pending: AtomicU64,
    /// Set while a live event stream keeps `extent` current
    tracked: AtomicBool,
    excluded: AtomicBool,
}

impl SourceState {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            handle: Mutex::new(None),
            extent: AtomicU64::new(0),
            extent_known: AtomicBool::new(false),
            pending: AtomicU64::new(0),
            tracked: AtomicBool::new(false),
            excluded: AtomicBool::new(false),
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Cached extent, if it has been queried at least once.
    pub fn extent(&self) -> Option<Position> {
        self.extent_known
            .load(Ordering::Acquire)
            .then(|| self.extent.load(Ordering::Acquire))
    }

    /// Forget messages buffered before an extent query starts.
    ///
    /// The query result already counts them.
    pub fn begin_extent_query(&self) {
        self.pending.store(0, Ordering::Release);
    }

    /// Store a queried extent plus any messages buffered since the query
    /// began.
    ///
    /// A message posted after `begin_extent_query` but before the backend
    /// computed its answer is counted twice; the extra position reads back
    /// as missing and is filtered out.
    pub fn set_extent(&self, extent: Position) {
        let pending = self.pending.swap(0, Ordering::AcqRel);
        self.extent
            .store(extent.saturating_add(pending), Ordering::Release);
        self.extent_known.store(true, Ordering::Release);
    }

    /// Bump the extent by one for a newly posted message.
    ///
    /// Returns false while the extent is still unknown; the message is then
    /// buffered and folded in by the next `set_extent`.
    pub fn record_new_message(&self) -> bool {
        if !self.extent_known.load(Ordering::Acquire) {
            self.pending.fetch_add(1, Ordering::AcqRel);
            return false;
        }
        self.extent.fetch_add(1, Ordering::AcqRel);
        true
    }

    /// Whether an event stream currently keeps the extent up to date.
    pub fn is_tracked(&self) -> bool {
        self.tracked.load(Ordering::Acquire)
    }

    pub fn set_tracked(&self, tracked: bool) {
        self.tracked.store(tracked, Ordering::Release);
    }

    pub fn handle(&self) -> Option<SourceHandle> {
        self.handle.lock().clone()
    }

    pub fn is_excluded(&self) -> bool {
        self.excluded.load(Ordering::Acquire)
    }

    pub fn exclude(&self) {
        self.excluded.store(true, Ordering::Release);
    }
}

/// Counts from a single crawl run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlOutcome {
    /// Positions requested from the source
    pub requested: usize,
    /// Positions that returned a message
    pub fetched: usize,
    /// Messages that passed the filter
    pub accepted: usize,
    /// New items added to the pool
    pub inserted: usize,
    /// Items evicted by this run's insert
    pub evicted: usize,
}

/// Service running one sampling pass over a source.
pub struct SourceCrawler {
    source: Arc<dyn MessageSource>,
    pool: Arc<ItemPool>,
    batch_size: usize,
    extent_mode: ExtentMode,
}

impl SourceCrawler {
    pub fn new(
        source: Arc<dyn MessageSource>,
        pool: Arc<ItemPool>,
        batch_size: usize,
        extent_mode: ExtentMode,
    ) -> Self {
        Self {
            source,
            pool,
            batch_size: batch_size.max(1),
            extent_mode,
        }
    }

    pub fn pool(&self) -> &Arc<ItemPool> {
        &self.pool
    }

    /// Sample one batch from a source into the pool.
    ///
    /// A configuration error marks the source excluded before returning it;
    /// any other error leaves the state untouched so the next run retries.
    pub async fn crawl(&self, state: &SourceState) -> Result<CrawlOutcome> {
        if state.is_excluded() {
            return Err(AppError::config(format!(
                "source '{}' is excluded",
                state.identifier()
            )));
        }

        match self.crawl_inner(state).await {
            Err(e) if e.is_fatal_for_source() => {
                state.exclude();
                Err(e)
            }
            other => other,
        }
    }

    async fn crawl_inner(&self, state: &SourceState) -> Result<CrawlOutcome> {
        let handle = self.resolve(state).await?;
        let extent = self.current_extent(state, &handle).await?;

        if extent == 0 {
            log::debug!("Source '{}' has no messages yet", state.identifier());
            return Ok(CrawlOutcome::default());
        }

        let positions = random_positions(&mut rand::rng(), extent, self.batch_size);
        let messages = self.source.fetch_messages(&handle, &positions).await?;

        let accepted = filter::filter_batch(&messages);
        let mut outcome = CrawlOutcome {
            requested: positions.len(),
            fetched: messages.iter().filter(|m| m.is_some()).count(),
            accepted: accepted.len(),
            ..CrawlOutcome::default()
        };

        let inserted = self.pool.insert_batch(accepted);
        outcome.inserted = inserted.inserted;
        outcome.evicted = inserted.evicted;

        log::debug!(
            "Source '{}': {} requested, {} fetched, {} accepted, {} new",
            state.identifier(),
            outcome.requested,
            outcome.fetched,
            outcome.accepted,
            outcome.inserted
        );
        Ok(outcome)
    }

    async fn resolve(&self, state: &SourceState) -> Result<SourceHandle> {
        if let Some(handle) = state.handle() {
            return Ok(handle);
        }
        let handle = self.source.resolve_source(state.identifier()).await?;
        *state.handle.lock() = Some(handle.clone());
        Ok(handle)
    }

    /// In tracked mode the cached extent is trusted only while an event
    /// stream follows the source; otherwise every run asks the backend.
    async fn current_extent(&self, state: &SourceState, handle: &SourceHandle) -> Result<Position> {
        if self.extent_mode == ExtentMode::Tracked && state.is_tracked() {
            if let Some(extent) = state.extent() {
                return Ok(extent);
            }
        }
        state.begin_extent_query();
        let extent = self.source.get_source_extent(handle).await?;
        state.set_extent(extent);
        Ok(extent)
    }
}

/// `count` positions drawn uniformly from `[0, extent)`, repeats allowed.
pub fn random_positions<R: Rng>(rng: &mut R, extent: Position, count: usize) -> Vec<Position> {
    if extent == 0 {
        return Vec::new();
    }
    (0..count).map(|_| rng.random_range(0..extent)).collect()
}
