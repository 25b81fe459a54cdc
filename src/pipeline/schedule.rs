// src/pipeline/schedule.rs

//! Round-robin crawl scheduler.
//!
//! Runs one crawl pass per source in configured order, pausing between
//! sources and between cycles, until shut down. Crawling is strictly
//! sequential so at most one fetch is in flight against the backend.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::services::{AccessThrottle, CrawlOutcome, SourceCrawler, SourceState};

/// What happened to one source during a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRun {
    Crawled(CrawlOutcome),
    /// Already excluded by an earlier configuration error
    Skipped,
    /// Excluded during this run
    Excluded(String),
    /// Transient failure; retried next cycle
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct SourceReport {
    pub source: String,
    pub run: SourceRun,
}

/// Summary of a full pass over all sources.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub sources: Vec<SourceReport>,
    pub pool_size: usize,
    /// Set when shutdown cut the cycle short
    pub interrupted: bool,
}

impl CycleReport {
    /// New items added across all sources.
    pub fn inserted(&self) -> usize {
        self.sources
            .iter()
            .map(|r| match &r.run {
                SourceRun::Crawled(outcome) => outcome.inserted,
                _ => 0,
            })
            .sum()
    }

    pub fn failures(&self) -> usize {
        self.sources
            .iter()
            .filter(|r| matches!(r.run, SourceRun::Failed(_) | SourceRun::Excluded(_)))
            .count()
    }
}

pub struct Scheduler {
    crawler: SourceCrawler,
    sources: Vec<Arc<SourceState>>,
    inter_source_delay: Duration,
    inter_cycle_delay: Duration,
}

impl Scheduler {
    pub fn new(
        crawler: SourceCrawler,
        sources: Vec<Arc<SourceState>>,
        inter_source_delay: Duration,
        inter_cycle_delay: Duration,
    ) -> Self {
        Self {
            crawler,
            sources,
            inter_source_delay,
            inter_cycle_delay,
        }
    }

    /// Loop over cycles until `shutdown` turns true or its sender is dropped.
    ///
    /// Returns the number of completed cycles.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> u64 {
        log::info!(
            "Crawl loop starting over {} sources",
            self.sources.len()
        );

        let mut cycles = 0;
        loop {
            if *shutdown.borrow() {
                break;
            }

            let report = self.run_cycle(&mut shutdown).await;
            if report.interrupted {
                break;
            }
            cycles += 1;
            log::info!(
                "Cycle {} done: {} new items, {} failures, pool size {}",
                cycles,
                report.inserted(),
                report.failures(),
                report.pool_size
            );

            if pause(self.inter_cycle_delay, &mut shutdown).await {
                break;
            }
        }

        log::info!("Crawl loop stopped after {} cycles", cycles);
        cycles
    }

    /// Run a single cycle with no external shutdown signal.
    pub async fn run_once(&self) -> CycleReport {
        let (_tx, mut rx) = watch::channel(false);
        self.run_cycle(&mut rx).await
    }

    /// One pass over every source, pausing between crawled sources.
    pub async fn run_cycle(&self, shutdown: &mut watch::Receiver<bool>) -> CycleReport {
        let started_at = Utc::now();
        let mut reports = Vec::with_capacity(self.sources.len());
        let mut interrupted = false;
        let mut pending_pause = false;

        for state in &self.sources {
            if state.is_excluded() {
                reports.push(SourceReport {
                    source: state.identifier().to_string(),
                    run: SourceRun::Skipped,
                });
                continue;
            }

            if pending_pause && pause(self.inter_source_delay, shutdown).await {
                interrupted = true;
                break;
            }

            let run = self.crawl_source(state).await;
            reports.push(SourceReport {
                source: state.identifier().to_string(),
                run,
            });
            pending_pause = true;
        }

        CycleReport {
            started_at,
            finished_at: Utc::now(),
            sources: reports,
            pool_size: self.crawler.pool().len(),
            interrupted,
        }
    }

    async fn crawl_source(&self, state: &SourceState) -> SourceRun {
        match self.crawler.crawl(state).await {
            Ok(outcome) => {
                log::info!(
                    "Crawled '{}': {} accepted, {} new, {} evicted",
                    state.identifier(),
                    outcome.accepted,
                    outcome.inserted,
                    outcome.evicted
                );
                SourceRun::Crawled(outcome)
            }
            Err(e) if state.is_excluded() => {
                log::error!(
                    "Excluding source '{}' for the rest of the run: {}",
                    state.identifier(),
                    e
                );
                SourceRun::Excluded(e.to_string())
            }
            Err(e) => {
                log::warn!(
                    "Crawl of '{}' failed, retrying next cycle: {}",
                    state.identifier(),
                    e
                );
                SourceRun::Failed(e.to_string())
            }
        }
    }
}

/// Sleep for `delay` unless shutdown arrives first. Returns true on shutdown.
async fn pause(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return true;
    }
    if delay.is_zero() {
        tokio::task::yield_now().await;
        return *shutdown.borrow();
    }
    tokio::select! {
        _ = tokio::time::sleep(delay) => *shutdown.borrow(),
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
    }
}

/// Periodically drop expired throttle entries until shutdown.
pub fn spawn_throttle_sweeper(
    throttle: Arc<AccessThrottle>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let period = period.max(Duration::from_millis(1));
    tokio::spawn(async move {
        while !pause(period, &mut shutdown).await {
            let removed = throttle.sweep(Instant::now());
            if removed > 0 {
                log::debug!("Swept {} idle callers from the throttle", removed);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::models::{ExtentMode, Message};
    use crate::services::source::testing::{MockChannel, MockSource};
    use crate::storage::ItemPool;

    fn scheduler(source: Arc<MockSource>, ids: &[&str], batch: usize, delays_ms: u64) -> Scheduler {
        let pool = Arc::new(ItemPool::new(1000));
        let crawler = SourceCrawler::new(source, pool, batch, ExtentMode::Tracked);
        let states = ids.iter().map(|id| Arc::new(SourceState::new(*id))).collect();
        Scheduler::new(
            crawler,
            states,
            Duration::from_millis(delays_ms),
            Duration::from_millis(delays_ms),
        )
    }

    #[tokio::test]
    async fn one_cycle_adds_filtered_items() {
        let mut channel = MockChannel::broadcast(50);
        channel.scripted = Some(vec![
            Some(Message::text("one")),
            Some(Message::text("two")),
            None,
            Some(Message::text("@three")),
            Some(Message::text("four")),
            None,
            Some(Message::text("five")),
            None,
            Some(Message::text("six @mention")),
            None,
        ]);
        let source = Arc::new(MockSource::new().with_channel("jokes", channel));
        let scheduler = scheduler(Arc::clone(&source), &["jokes"], 10, 0);

        let before = scheduler.crawler.pool().len();
        let report = scheduler.run_once().await;

        assert_eq!(scheduler.crawler.pool().len() - before, 4);
        assert_eq!(report.inserted(), 4);
        assert_eq!(report.pool_size, 4);
        assert!(!report.interrupted);

        let requested = source.requested.lock();
        assert_eq!(requested[0].len(), 10);
        assert!(requested[0].iter().all(|p| *p < 50));
    }

    #[tokio::test]
    async fn fatal_source_does_not_stop_others() {
        let source = Arc::new(
            MockSource::new()
                .with_channel("chat", MockChannel::group())
                .with_channel("jokes", MockChannel::filled_with(30, "joke")),
        );
        let scheduler = scheduler(Arc::clone(&source), &["chat", "missing", "jokes"], 5, 0);

        let report = scheduler.run_once().await;
        assert!(matches!(report.sources[0].run, SourceRun::Excluded(_)));
        assert!(matches!(report.sources[1].run, SourceRun::Excluded(_)));
        assert!(matches!(report.sources[2].run, SourceRun::Crawled(_)));
        assert!(report.pool_size > 0);

        let report = scheduler.run_once().await;
        assert_eq!(report.sources[0].run, SourceRun::Skipped);
        assert_eq!(report.sources[1].run, SourceRun::Skipped);
        assert!(matches!(report.sources[2].run, SourceRun::Crawled(_)));
    }

    #[tokio::test]
    async fn transient_failure_is_reported_and_retried() {
        let source = Arc::new(
            MockSource::new().with_channel("jokes", MockChannel::filled_with(30, "joke")),
        );
        source.fail_next_fetches("jokes", 1);
        let scheduler = scheduler(Arc::clone(&source), &["jokes"], 5, 0);

        let report = scheduler.run_once().await;
        assert!(matches!(report.sources[0].run, SourceRun::Failed(_)));
        assert_eq!(report.failures(), 1);

        let report = scheduler.run_once().await;
        assert!(matches!(report.sources[0].run, SourceRun::Crawled(_)));
    }

    #[tokio::test]
    async fn run_stops_immediately_when_already_shut_down() {
        let source = Arc::new(MockSource::new());
        let scheduler = scheduler(source, &[], 5, 0);
        let (_tx, rx) = watch::channel(true);
        assert_eq!(scheduler.run(rx).await, 0);
    }

    #[tokio::test]
    async fn run_loops_until_shutdown() {
        let source = Arc::new(
            MockSource::new()
                .with_channel("a", MockChannel::filled_with(20, "a"))
                .with_channel("b", MockChannel::filled_with(20, "b")),
        );
        let scheduler = Arc::new(scheduler(Arc::clone(&source), &["a", "b"], 3, 5));
        let (tx, rx) = watch::channel(false);

        let runner = Arc::clone(&scheduler);
        let handle = tokio::spawn(async move { runner.run(rx).await });

        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(true).unwrap();
        let cycles = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();

        assert!(cycles >= 1);
        assert!(source.fetch_calls.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn long_delay_is_cut_short_by_shutdown() {
        let source = Arc::new(
            MockSource::new()
                .with_channel("a", MockChannel::filled_with(20, "a"))
                .with_channel("b", MockChannel::filled_with(20, "b")),
        );
        let scheduler = Arc::new(scheduler(Arc::clone(&source), &["a", "b"], 3, 60_000));
        let (tx, rx) = watch::channel(false);

        let runner = Arc::clone(&scheduler);
        let handle = tokio::spawn(async move { runner.run(rx).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();
        let cycles = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();

        // Stopped while waiting between "a" and "b".
        assert_eq!(cycles, 0);
        assert_eq!(source.fetch_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn sweeper_stops_on_shutdown() {
        let throttle = Arc::new(AccessThrottle::new(Duration::from_millis(1), 100));
        throttle.check(1);
        let (tx, rx) = watch::channel(false);
        let handle = spawn_throttle_sweeper(Arc::clone(&throttle), Duration::from_millis(5), rx);

        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(throttle.tracked(), 0);
    }
}
