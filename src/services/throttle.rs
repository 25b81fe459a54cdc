// src/services/throttle.rs

//! Per-caller cooldown limiter guarding read access.
//!
//! Admits at most one request per caller per window, with no burst
//! allowance. Callers whose last access is older than the window are
//! indistinguishable from callers never seen, so they are swept once the
//! map grows past its soft limit. A sweep that leaves the map large raises
//! the limit to twice the surviving size, so a crowd of active callers does
//! not cost a full scan per request.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::models::CallerId;

#[derive(Debug)]
struct Entries {
    last_access: HashMap<CallerId, Instant>,
    /// Size above which an accepted check sweeps stale callers
    sweep_above: usize,
}

impl Entries {
    fn sweep(&mut self, now: Instant, window: Duration, max_entries: usize) -> usize {
        let before = self.last_access.len();
        self.last_access
            .retain(|_, last| now.saturating_duration_since(*last) < window);
        self.sweep_above = max_entries.max(self.last_access.len().saturating_mul(2));
        before - self.last_access.len()
    }
}

/// Sliding-cooldown limiter keyed by caller.
#[derive(Debug)]
pub struct AccessThrottle {
    window: Duration,
    max_entries: usize,
    entries: Mutex<Entries>,
}

impl AccessThrottle {
    pub fn new(window: Duration, max_entries: usize) -> Self {
        let max_entries = max_entries.max(1);
        Self {
            window,
            max_entries,
            entries: Mutex::new(Entries {
                last_access: HashMap::new(),
                sweep_above: max_entries,
            }),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Accept or reject a request arriving now.
    pub fn check(&self, caller: CallerId) -> bool {
        self.check_at(caller, Instant::now())
    }

    /// Accept or reject a request arriving at `now`.
    ///
    /// On accept the caller's last access becomes `now`; on reject nothing
    /// changes.
    pub fn check_at(&self, caller: CallerId, now: Instant) -> bool {
        let mut entries = self.entries.lock();

        if let Some(last) = entries.last_access.get(&caller) {
            if now.saturating_duration_since(*last) < self.window {
                return false;
            }
        }

        entries.last_access.insert(caller, now);

        if entries.last_access.len() > entries.sweep_above {
            let swept = entries.sweep(now, self.window, self.max_entries);
            log::debug!(
                "Throttle swept {} callers, {} remain",
                swept,
                entries.last_access.len()
            );
        }
        true
    }

    /// Drop callers whose cooldown expired before `now`.
    pub fn sweep(&self, now: Instant) -> usize {
        self.entries
            .lock()
            .sweep(now, self.window, self.max_entries)
    }

    /// Number of tracked callers.
    pub fn tracked(&self) -> usize {
        self.entries.lock().last_access.len()
    }
}
