//! Dwell-time holding area between detection and emission
//!
//! Metadata and bonding-curve accounts often land in follow-up transactions,
//! so candidates wait here before a final enrichment pass.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::future::join_all;
use solana_sdk::pubkey::Pubkey;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::fetcher::Fetcher;
use crate::metrics::metrics;
use crate::types::{Candidate, EnrichedCandidate};

#[derive(Debug, Clone)]
pub struct QuarantineSettings {
    pub dwell: Duration,
    pub tick_interval: Duration,
    pub capacity: usize,
    /// Age past which entries are dropped when over capacity
    pub gc_max_age: Duration,
}

impl Default for QuarantineSettings {
    fn default() -> Self {
        Self {
            dwell: Duration::from_secs(10),
            tick_interval: Duration::from_secs(1),
            capacity: 5000,
            gc_max_age: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone)]
pub struct QuarantineEntry {
    pub candidate: Candidate,
    pub enqueued_at: Instant,
}

pub struct QuarantineScheduler {
    settings: QuarantineSettings,
    entries: DashMap<Pubkey, QuarantineEntry>,
}

impl QuarantineScheduler {
    pub fn new(settings: QuarantineSettings) -> Self {
        Self {
            settings,
            entries: DashMap::new(),
        }
    }

    pub fn settings(&self) -> &QuarantineSettings {
        &self.settings
    }

    /// Store keyed by mint; re-admission replaces the entry and its timestamp
    pub fn admit(&self, candidate: Candidate) {
        let mint = candidate.mint;
        let replaced = self
            .entries
            .insert(
                mint,
                QuarantineEntry {
                    candidate,
                    enqueued_at: Instant::now(),
                },
            )
            .is_some();
        metrics().quarantine_admitted.inc();
        debug!(%mint, replaced, "Candidate quarantined");

        if self.entries.len() > self.settings.capacity {
            self.collect_garbage(Instant::now());
        }
        metrics().quarantine_depth.set(self.entries.len() as i64);
    }

    /// Drop entries older than the GC age, then the oldest until under capacity
    pub fn collect_garbage(&self, now: Instant) -> usize {
        let before = self.entries.len();
        let max_age = self.settings.gc_max_age;
        self.entries
            .retain(|_, entry| now.saturating_duration_since(entry.enqueued_at) < max_age);

        let overflow = self.entries.len().saturating_sub(self.settings.capacity);
        if overflow > 0 {
            let mut by_age: Vec<(Pubkey, Instant)> = self
                .entries
                .iter()
                .map(|e| (*e.key(), e.value().enqueued_at))
                .collect();
            by_age.sort_by_key(|(_, at)| *at);
            for (mint, _) in by_age.into_iter().take(overflow) {
                self.entries.remove(&mint);
            }
        }

        let evicted = before.saturating_sub(self.entries.len());
        if evicted > 0 {
            metrics().quarantine_evictions.inc_by(evicted as u64);
            warn!(evicted, remaining = self.entries.len(), "Quarantine over capacity, evicted candidates");
        }
        evicted
    }

    /// Remove and return every candidate whose dwell time has elapsed
    ///
    /// Removal goes through `remove_if`, so a candidate re-admitted between
    /// the scan and the removal keeps its fresh timestamp and stays.
    pub fn take_due(&self, now: Instant) -> Vec<Candidate> {
        let dwell = self.settings.dwell;
        let is_due = |entry: &QuarantineEntry| now.saturating_duration_since(entry.enqueued_at) >= dwell;

        let due_keys: Vec<Pubkey> = self
            .entries
            .iter()
            .filter(|e| is_due(e.value()))
            .map(|e| *e.key())
            .collect();

        let due: Vec<Candidate> = due_keys
            .into_iter()
            .filter_map(|mint| self.entries.remove_if(&mint, |_, entry| is_due(entry)))
            .map(|(_, entry)| entry.candidate)
            .collect();

        metrics().quarantine_depth.set(self.entries.len() as i64);
        due
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, mint: &Pubkey) -> bool {
        self.entries.contains_key(mint)
    }

    pub fn clear(&self) {
        self.entries.clear();
        metrics().quarantine_depth.set(0);
    }

    /// Tick loop: re-enrich due candidates and emit them
    ///
    /// Returns when shutdown is signalled or the receiver is gone.
    pub async fn run(
        self: Arc<Self>,
        fetcher: Arc<Fetcher>,
        output: mpsc::Sender<EnrichedCandidate>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = interval(self.settings.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(dwell_ms = self.settings.dwell.as_millis() as u64, "Quarantine scheduler started");

        loop {
            tokio::select! {
                _ = shutdown.wait_for(|stop| *stop) => break,
                _ = ticker.tick() => {}
            }

            let due = self.take_due(Instant::now());
            if due.is_empty() {
                continue;
            }

            let enriched = join_all(due.into_iter().map(|c| fetcher.re_enrich(c))).await;
            for candidate in enriched.into_iter().flatten() {
                let record = EnrichedCandidate::from_candidate(candidate);
                info!(
                    mint = %record.mint,
                    name = record.name.as_deref().unwrap_or_default(),
                    symbol = record.symbol.as_deref().unwrap_or_default(),
                    "Emitting candidate"
                );
                if output.send(record).await.is_err() {
                    warn!("Candidate receiver dropped, stopping quarantine scheduler");
                    return;
                }
                metrics().candidates_emitted.inc();
            }
        }
        debug!("Quarantine scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(capacity: usize) -> QuarantineSettings {
        QuarantineSettings {
            dwell: Duration::from_secs(10),
            tick_interval: Duration::from_secs(1),
            capacity,
            gc_max_age: Duration::from_secs(30),
        }
    }

    fn candidate(mint: Pubkey) -> Candidate {
        Candidate::new(mint, format!("sig-{}", mint), vec![])
    }

    #[tokio::test(start_paused = true)]
    async fn test_dwell_time() {
        let q = QuarantineScheduler::new(settings(10));
        let mint = Pubkey::new_unique();
        q.admit(candidate(mint));

        tokio::time::advance(Duration::from_millis(9_999)).await;
        assert!(q.take_due(Instant::now()).is_empty());

        tokio::time::advance(Duration::from_millis(1)).await;
        let due = q.take_due(Instant::now());
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].mint, mint);

        // Exactly once
        assert!(q.take_due(Instant::now()).is_empty());
        assert!(q.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_readmission_resets_timestamp() {
        let q = QuarantineScheduler::new(settings(10));
        let mint = Pubkey::new_unique();
        q.admit(candidate(mint));
        tokio::time::advance(Duration::from_secs(6)).await;

        let mut updated = candidate(mint);
        updated.signature = "second".to_string();
        q.admit(updated);
        assert_eq!(q.len(), 1);

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(q.take_due(Instant::now()).is_empty());
        tokio::time::advance(Duration::from_secs(4)).await;
        let due = q.take_due(Instant::now());
        assert_eq!(due[0].signature, "second");
    }

    #[tokio::test(start_paused = true)]
    async fn test_gc_drops_old_then_oldest() {
        let q = QuarantineScheduler::new(settings(3));
        let old = Pubkey::new_unique();
        q.admit(candidate(old));
        tokio::time::advance(Duration::from_secs(31)).await;

        let mints: Vec<Pubkey> = (0..3).map(|_| Pubkey::new_unique()).collect();
        for mint in &mints {
            q.admit(candidate(*mint));
            tokio::time::advance(Duration::from_millis(10)).await;
        }
        // Fourth admission triggered GC by age
        assert_eq!(q.len(), 3);
        assert!(!q.contains(&old));

        let newest = Pubkey::new_unique();
        q.admit(candidate(newest));
        // Nothing old enough, so the oldest is force-evicted
        assert_eq!(q.len(), 3);
        assert!(!q.contains(&mints[0]));
        assert!(q.contains(&newest));
    }
}
