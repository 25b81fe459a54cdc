// src/services/query.rs

//! Query server answering "one item" and "a list of items" requests.
//!
//! Both surfaces go through the access throttle first. Throttled callers
//! and an empty pool are both answered with silence.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::models::{CallerId, Item};
use crate::services::AccessThrottle;
use crate::storage::ItemPool;

/// A selectable entry of a list answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineResult {
    /// Identifier unique within one answer
    pub id: String,
    pub text: Item,
}

/// Delivery side of the presentation layer.
#[async_trait]
pub trait Responder: Send + Sync {
    async fn send_text(&self, caller: CallerId, text: &str) -> Result<()>;

    async fn answer_inline(&self, caller: CallerId, results: &[InlineResult]) -> Result<()>;
}

/// Read access to the pool for end users.
pub struct QueryServer {
    pool: Arc<ItemPool>,
    throttle: Arc<AccessThrottle>,
    default_list_size: usize,
    request_seq: AtomicU64,
}

impl QueryServer {
    pub fn new(pool: Arc<ItemPool>, throttle: Arc<AccessThrottle>, default_list_size: usize) -> Self {
        Self {
            pool,
            throttle,
            default_list_size: default_list_size.max(1),
            request_seq: AtomicU64::new(0),
        }
    }

    pub fn default_list_size(&self) -> usize {
        self.default_list_size
    }

    /// One random item, or `None` when there is nothing to send.
    pub fn handle_single_request(&self, caller: CallerId) -> Option<Item> {
        match self.try_single(caller) {
            Ok(item) => Some(item),
            Err(e) => {
                log::debug!("No reply for caller {}: {}", caller, e);
                None
            }
        }
    }

    fn try_single(&self, caller: CallerId) -> Result<Item> {
        if !self.throttle.check(caller) {
            return Err(AppError::Throttled { caller });
        }
        self.pool.sample_one()
    }

    /// Up to `max_results` distinct items tagged with request-scoped ids.
    ///
    /// Empty when the caller is throttled or the pool is empty.
    pub fn handle_list_request(&self, caller: CallerId, max_results: usize) -> Vec<InlineResult> {
        if !self.throttle.check(caller) {
            log::debug!("Dropping list request from throttled caller {}", caller);
            return Vec::new();
        }

        self.list_unthrottled(max_results)
    }

    /// Run a single request and deliver the reply, if any.
    ///
    /// Delivery failures are logged and swallowed.
    pub async fn serve_single(&self, caller: CallerId, responder: &dyn Responder) -> bool {
        let Some(item) = self.handle_single_request(caller) else {
            return false;
        };
        match responder.send_text(caller, &item).await {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Failed to deliver reply to caller {}: {}", caller, e);
                false
            }
        }
    }

    /// Run a list request with the default size and deliver the answer.
    ///
    /// Nothing is delivered for throttled callers; an empty pool still
    /// answers with an empty list so the client stops waiting.
    pub async fn serve_list(&self, caller: CallerId, responder: &dyn Responder) -> usize {
        if !self.throttle.check(caller) {
            log::debug!("Dropping list request from throttled caller {}", caller);
            return 0;
        }
        let results = self.list_unthrottled(self.default_list_size);
        match responder.answer_inline(caller, &results).await {
            Ok(()) => results.len(),
            Err(e) => {
                log::warn!("Failed to answer inline query from {}: {}", caller, e);
                0
            }
        }
    }

    fn list_unthrottled(&self, max_results: usize) -> Vec<InlineResult> {
        let request = self.request_seq.fetch_add(1, Ordering::Relaxed);
        self.pool
            .sample_distinct(max_results)
            .into_iter()
            .enumerate()
            .map(|(index, text)| InlineResult {
                id: format!("{request}-{index}"),
                text,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::time::Duration;

    use parking_lot::Mutex;

    use super::*;

    fn server(items: &[&str], window_ms: u64) -> QueryServer {
        let pool = Arc::new(ItemPool::new(100));
        pool.insert_batch(items.iter().copied());
        let throttle = Arc::new(AccessThrottle::new(Duration::from_millis(window_ms), 100));
        QueryServer::new(pool, throttle, 10)
    }

    #[derive(Default)]
    struct RecordingResponder {
        texts: Mutex<Vec<(CallerId, String)>>,
        answers: Mutex<Vec<(CallerId, Vec<InlineResult>)>>,
        fail: bool,
    }

    #[async_trait]
    impl Responder for RecordingResponder {
        async fn send_text(&self, caller: CallerId, text: &str) -> Result<()> {
            if self.fail {
                return Err(AppError::fetch("send_text", "bot blocked"));
            }
            self.texts.lock().push((caller, text.to_string()));
            Ok(())
        }

        async fn answer_inline(&self, caller: CallerId, results: &[InlineResult]) -> Result<()> {
            if self.fail {
                return Err(AppError::fetch("answer_inline", "query expired"));
            }
            self.answers.lock().push((caller, results.to_vec()));
            Ok(())
        }
    }

    #[test]
    fn single_request_returns_pool_member() {
        let server = server(&["a", "b", "c"], 0);
        for caller in 0..100 {
            let item = server.handle_single_request(caller).unwrap();
            assert!(["a", "b", "c"].contains(&item.as_str()));
        }
    }

    #[test]
    fn single_request_on_empty_pool_is_silent() {
        let server = server(&[], 0);
        assert_eq!(server.handle_single_request(1), None);
    }

    #[test]
    fn throttled_single_request_is_silent() {
        let server = server(&["a"], 60_000);
        assert!(server.handle_single_request(1).is_some());
        assert!(server.handle_single_request(1).is_none());
        assert!(server.handle_single_request(2).is_some());
    }

    #[test]
    fn list_request_ids_are_unique() {
        let server = server(&["a", "b", "c", "d", "e"], 0);
        let results = server.handle_list_request(1, 3);
        assert_eq!(results.len(), 3);

        let ids: HashSet<_> = results.iter().map(|r| r.id.as_str()).collect();
        let texts: HashSet<_> = results.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(ids.len(), 3);
        assert_eq!(texts.len(), 3);
    }

    #[test]
    fn list_request_smaller_pool_returns_all() {
        let server = server(&["a", "b"], 0);
        assert_eq!(server.handle_list_request(1, 10).len(), 2);
    }

    #[test]
    fn throttled_list_request_is_empty() {
        let server = server(&["a", "b"], 60_000);
        assert_eq!(server.handle_list_request(1, 10).len(), 2);
        assert!(server.handle_list_request(1, 10).is_empty());
    }

    #[tokio::test]
    async fn serve_single_delivers_reply() {
        let server = server(&["joke"], 0);
        let responder = RecordingResponder::default();

        assert!(server.serve_single(42, &responder).await);
        assert_eq!(*responder.texts.lock(), vec![(42, "joke".to_string())]);
    }

    #[tokio::test]
    async fn serve_single_sends_nothing_for_empty_pool() {
        let server = server(&[], 0);
        let responder = RecordingResponder::default();

        assert!(!server.serve_single(42, &responder).await);
        assert!(responder.texts.lock().is_empty());
    }

    #[tokio::test]
    async fn delivery_failure_is_swallowed() {
        let server = server(&["joke"], 0);
        let responder = RecordingResponder {
            fail: true,
            ..RecordingResponder::default()
        };

        assert!(!server.serve_single(1, &responder).await);
        assert_eq!(server.serve_list(2, &responder).await, 0);
    }

    #[tokio::test]
    async fn serve_list_uses_default_size() {
        let items: Vec<String> = (0..30).map(|i| format!("joke {i}")).collect();
        let pool = Arc::new(ItemPool::new(100));
        pool.insert_batch(items);
        let throttle = Arc::new(AccessThrottle::new(Duration::ZERO, 100));
        let server = QueryServer::new(pool, throttle, 10);
        let responder = RecordingResponder::default();

        assert_eq!(server.serve_list(5, &responder).await, 10);
        let answers = responder.answers.lock();
        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0].1.len(), 10);
    }
}
