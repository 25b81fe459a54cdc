//! Bounded, deduplicated in-memory item pool.
//!
//! Items are kept in insertion order alongside a membership index, so
//! duplicates collapse and eviction is deterministically oldest-first.
//!
//! ## Invariants
//!
//! - `len() <= capacity()` whenever no `insert_batch` call is in progress.
//! - Every item in the order queue is in the membership index and vice versa.
//! - Every member passes `filter::is_acceptable_text`.

use std::collections::{HashSet, VecDeque};

use parking_lot::Mutex;
use rand::Rng;
use rand::seq::SliceRandom;

use crate::error::{AppError, Result};
use crate::models::Item;
use crate::services::filter;

/// Extra draws allowed per requested item before `sample_distinct` gives up.
const DISTINCT_ATTEMPTS_PER_ITEM: usize = 8;

/// Counts reported by a batch insert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertOutcome {
    /// Items that were not already present
    pub inserted: usize,
    /// Oldest items dropped to get back under capacity
    pub evicted: usize,
    /// Blank or mention-bearing texts that were refused
    pub rejected: usize,
}

#[derive(Debug, Default)]
struct PoolInner {
    order: VecDeque<Item>,
    members: HashSet<Item>,
}

impl PoolInner {
    fn evict_to(&mut self, capacity: usize) -> usize {
        let mut evicted = 0;
        while self.order.len() > capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.members.remove(&oldest);
                evicted += 1;
            }
        }
        evicted
    }
}

/// The shared item pool.
///
/// All operations take a single lock, so a reader never observes a batch
/// that is inserted but not yet evicted.
#[derive(Debug)]
pub struct ItemPool {
    capacity: usize,
    inner: Mutex<PoolInner>,
}

impl ItemPool {
    /// Create an empty pool holding at most `capacity` items.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(PoolInner::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current item count.
    pub fn len(&self) -> usize {
        self.inner.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, text: &str) -> bool {
        self.inner.lock().members.contains(text)
    }

    /// Add a batch of items, then evict the oldest entries over capacity.
    ///
    /// Texts that fail `filter::is_acceptable_text` are counted as rejected
    /// and never stored.
    pub fn insert_batch<I>(&self, items: I) -> InsertOutcome
    where
        I: IntoIterator,
        I::Item: Into<Item>,
    {
        let mut inner = self.inner.lock();
        let mut outcome = InsertOutcome::default();

        for item in items {
            let item = item.into();
            if !filter::is_acceptable_text(&item) {
                outcome.rejected += 1;
                continue;
            }
            if inner.members.insert(item.clone()) {
                inner.order.push_back(item);
                outcome.inserted += 1;
            }
        }

        outcome.evicted = inner.evict_to(self.capacity);
        outcome
    }

    /// One item chosen uniformly at random.
    pub fn sample_one(&self) -> Result<Item> {
        self.sample_one_with(&mut rand::rng())
    }

    pub fn sample_one_with<R: Rng>(&self, rng: &mut R) -> Result<Item> {
        let inner = self.inner.lock();
        if inner.order.is_empty() {
            return Err(AppError::EmptyPool);
        }
        let index = rng.random_range(0..inner.order.len());
        inner.order.get(index).cloned().ok_or(AppError::EmptyPool)
    }

    /// Up to `k` distinct items.
    ///
    /// When the pool holds no more than `k` items all of them are returned in
    /// random order. Otherwise items are drawn uniformly and repeats rejected;
    /// after a bounded number of draws the partial result is returned.
    pub fn sample_distinct(&self, k: usize) -> Vec<Item> {
        self.sample_distinct_with(k, &mut rand::rng())
    }

    pub fn sample_distinct_with<R: Rng>(&self, k: usize, rng: &mut R) -> Vec<Item> {
        let inner = self.inner.lock();
        let len = inner.order.len();
        if k == 0 || len == 0 {
            return Vec::new();
        }

        if len <= k {
            let mut all: Vec<Item> = inner.order.iter().cloned().collect();
            all.shuffle(rng);
            return all;
        }

        let mut picked = Vec::with_capacity(k);
        let mut seen = HashSet::with_capacity(k);
        let max_attempts = k.saturating_mul(DISTINCT_ATTEMPTS_PER_ITEM);

        for _ in 0..max_attempts {
            if picked.len() == k {
                break;
            }
            let index = rng.random_range(0..len);
            if seen.insert(index) {
                if let Some(item) = inner.order.get(index) {
                    picked.push(item.clone());
                }
            }
        }
        picked
    }
}
