//! Pending-transaction queue with linear backoff
//!
//! Entry lifecycle: queued, selected on a tick (attempts incremented and
//! marked fetching), then either removed or released back for retry. An
//! entry is dropped once attempts reach the maximum or it outlives the
//! maximum age, whichever comes first.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::metrics::metrics;
use crate::rpc_manager::Commitment;

#[derive(Debug, Clone)]
pub struct RetrievalSettings {
    pub tick_interval: Duration,
    pub max_batch_per_tick: usize,
    /// Entry becomes due again `attempts * backoff_unit` after first seen
    pub backoff_unit: Duration,
    pub max_attempts: u32,
    pub max_age: Duration,
    pub capacity: usize,
    pub commitment: Commitment,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(500),
            max_batch_per_tick: 5,
            backoff_unit: Duration::from_millis(1000),
            max_attempts: 6,
            max_age: Duration::from_secs(60),
            capacity: 2000,
            commitment: Commitment::Confirmed,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PendingTransaction {
    pub signature: String,
    pub log_lines: Vec<String>,
    pub attempts: u32,
    pub first_seen_at: Instant,
    fetching: bool,
}

impl PendingTransaction {
    pub fn new(signature: String, log_lines: Vec<String>) -> Self {
        Self {
            signature,
            log_lines,
            attempts: 0,
            first_seen_at: Instant::now(),
            fetching: false,
        }
    }

    pub fn is_fetching(&self) -> bool {
        self.fetching
    }
}

/// Work item handed to the fetcher
#[derive(Debug, Clone)]
pub struct FetchJob {
    pub signature: String,
    pub log_lines: Vec<String>,
    /// 1-based attempt number
    pub attempt: u32,
}

pub struct RetrievalQueue {
    settings: RetrievalSettings,
    entries: Mutex<HashMap<String, PendingTransaction>>,
}

impl RetrievalQueue {
    pub fn new(settings: RetrievalSettings) -> Self {
        Self {
            settings,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &RetrievalSettings {
        &self.settings
    }

    /// Queue a transaction; evicts the oldest entry when full
    ///
    /// Returns false if the signature is already queued.
    pub fn push(&self, pending: PendingTransaction) -> bool {
        let mut entries = self.entries.lock();
        if entries.contains_key(&pending.signature) {
            return false;
        }

        if entries.len() >= self.settings.capacity {
            let oldest = entries
                .values()
                .min_by_key(|p| p.first_seen_at)
                .map(|p| p.signature.clone());
            if let Some(oldest) = oldest {
                entries.remove(&oldest);
                metrics().queue_evictions.inc();
            }
        }

        entries.insert(pending.signature.clone(), pending);
        metrics().queue_depth.set(entries.len() as i64);
        true
    }

    /// Expire stale entries and select the due batch, oldest first
    pub fn select_due(&self, now: Instant) -> Vec<FetchJob> {
        let max_age = self.settings.max_age;
        let max_attempts = self.settings.max_attempts;
        let mut entries = self.entries.lock();

        let before = entries.len();
        entries.retain(|_, p| {
            p.fetching || (now.saturating_duration_since(p.first_seen_at) < max_age && p.attempts < max_attempts)
        });
        let expired = before - entries.len();
        if expired > 0 {
            debug!(expired, "Dropped pending transactions past max age or attempts");
        }

        let mut due: Vec<&mut PendingTransaction> = entries
            .values_mut()
            .filter(|p| {
                !p.fetching
                    && now.saturating_duration_since(p.first_seen_at) >= self.settings.backoff_unit * p.attempts
            })
            .collect();
        due.sort_by_key(|p| p.first_seen_at);

        let jobs: Vec<FetchJob> = due
            .into_iter()
            .take(self.settings.max_batch_per_tick)
            .map(|p| {
                p.attempts += 1;
                p.fetching = true;
                FetchJob {
                    signature: p.signature.clone(),
                    log_lines: p.log_lines.clone(),
                    attempt: p.attempts,
                }
            })
            .collect();

        metrics().queue_depth.set(entries.len() as i64);
        jobs
    }

    /// The fetch resolved for good (decoded, rejected or fatal)
    pub fn finish(&self, signature: &str) {
        let mut entries = self.entries.lock();
        entries.remove(signature);
        metrics().queue_depth.set(entries.len() as i64);
    }

    /// The fetch should be retried; drops the entry if it is out of budget
    ///
    /// Returns true if the entry stays queued.
    pub fn release_for_retry(&self, signature: &str, now: Instant) -> bool {
        let mut entries = self.entries.lock();
        let keep = match entries.get_mut(signature) {
            Some(p) => {
                p.fetching = false;
                p.attempts < self.settings.max_attempts
                    && now.saturating_duration_since(p.first_seen_at) < self.settings.max_age
            }
            None => return false,
        };
        if !keep {
            entries.remove(signature);
            debug!(signature, "Pending transaction exhausted its retry budget");
        }
        metrics().queue_depth.set(entries.len() as i64);
        keep
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn contains(&self, signature: &str) -> bool {
        self.entries.lock().contains_key(signature)
    }

    pub fn attempts(&self, signature: &str) -> Option<u32> {
        self.entries.lock().get(signature).map(|p| p.attempts)
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
        metrics().queue_depth.set(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> RetrievalSettings {
        RetrievalSettings {
            max_batch_per_tick: 2,
            backoff_unit: Duration::from_millis(1000),
            max_attempts: 3,
            max_age: Duration::from_secs(60),
            capacity: 3,
            ..RetrievalSettings::default()
        }
    }

    fn pending(sig: &str) -> PendingTransaction {
        PendingTransaction::new(sig.to_string(), vec![])
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_cap_and_oldest_first() {
        let queue = RetrievalQueue::new(settings());
        for sig in ["a", "b", "c"] {
            queue.push(pending(sig));
            tokio::time::advance(Duration::from_millis(1)).await;
        }

        let jobs = queue.select_due(Instant::now());
        let sigs: Vec<_> = jobs.iter().map(|j| j.signature.as_str()).collect();
        assert_eq!(sigs, vec!["a", "b"]);
        assert!(jobs.iter().all(|j| j.attempt == 1));

        // In-flight entries are not selected again
        let jobs = queue.select_due(Instant::now());
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].signature, "c");
        assert!(queue.select_due(Instant::now()).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_between_attempts() {
        let queue = RetrievalQueue::new(settings());
        queue.push(pending("a"));

        assert_eq!(queue.select_due(Instant::now()).len(), 1);
        assert!(queue.release_for_retry("a", Instant::now()));

        // attempts = 1, due 1s after first seen
        tokio::time::advance(Duration::from_millis(999)).await;
        assert!(queue.select_due(Instant::now()).is_empty());
        tokio::time::advance(Duration::from_millis(1)).await;
        let jobs = queue.select_due(Instant::now());
        assert_eq!(jobs[0].attempt, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_removed_after_max_attempts() {
        let queue = RetrievalQueue::new(settings());
        queue.push(pending("a"));

        for attempt in 1..=3 {
            tokio::time::advance(Duration::from_secs(5)).await;
            let jobs = queue.select_due(Instant::now());
            assert_eq!(jobs.len(), 1);
            assert_eq!(jobs[0].attempt, attempt);
            let kept = queue.release_for_retry("a", Instant::now());
            assert_eq!(kept, attempt < 3);
        }
        assert!(!queue.contains("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_removed_after_max_age() {
        let queue = RetrievalQueue::new(settings());
        queue.push(pending("a"));
        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(queue.select_due(Instant::now()).is_empty());
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_evicts_oldest() {
        let queue = RetrievalQueue::new(settings());
        for sig in ["a", "b", "c", "d"] {
            assert!(queue.push(pending(sig)));
            tokio::time::advance(Duration::from_millis(1)).await;
        }
        assert_eq!(queue.len(), 3);
        assert!(!queue.contains("a"));
        assert!(queue.contains("d"));
        assert!(!queue.push(pending("d")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_finish_removes() {
        let queue = RetrievalQueue::new(settings());
        queue.push(pending("a"));
        queue.select_due(Instant::now());
        queue.finish("a");
        assert!(queue.is_empty());
        assert!(!queue.release_for_retry("a", Instant::now()));
    }
}
