//! Log subscription front end
//!
//! Consumes merged `logsNotification` pushes, drops duplicates and failed
//! transactions, and queues creation events for retrieval.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use parking_lot::Mutex;
use solana_sdk::pubkey::Pubkey;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::classifier::CreationClassifier;
use super::dedupe::SignatureSet;
use crate::metrics::metrics;
use crate::pipeline::retrieval::{PendingTransaction, RetrievalQueue};
use crate::streaming::{LogNotification, LogStreamProvider};

/// What happened to one notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationOutcome {
    Duplicate,
    FailedTx,
    /// Not a creation event
    Ignored,
    Enqueued,
}

pub struct LogSubscriber {
    programs: Vec<Pubkey>,
    provider: Arc<dyn LogStreamProvider>,
    seen: Mutex<SignatureSet>,
    classifier: CreationClassifier,
    queue: Arc<RetrievalQueue>,
    reconnect_delay: Duration,
}

impl LogSubscriber {
    pub fn new(
        programs: Vec<Pubkey>,
        provider: Arc<dyn LogStreamProvider>,
        seen: SignatureSet,
        classifier: CreationClassifier,
        queue: Arc<RetrievalQueue>,
        reconnect_delay: Duration,
    ) -> Self {
        Self {
            programs,
            provider,
            seen: Mutex::new(seen),
            classifier,
            queue,
            reconnect_delay,
        }
    }

    /// Dedupe, skip failures, classify and enqueue
    ///
    /// The signature is recorded before the failure check so a failed
    /// transaction seen through a second program subscription is a duplicate.
    pub fn handle_notification(&self, notification: LogNotification) -> NotificationOutcome {
        metrics().notifications_total.inc();

        if !self.seen.lock().insert(&notification.signature) {
            metrics().duplicate_signatures.inc();
            return NotificationOutcome::Duplicate;
        }

        if notification.failed {
            metrics().failed_tx_skipped.inc();
            return NotificationOutcome::FailedTx;
        }

        if !self.classifier.is_creation(&notification.logs) {
            return NotificationOutcome::Ignored;
        }

        metrics().creation_matches.inc();
        debug!(signature = %notification.signature, slot = notification.slot, "Creation event queued");
        self.queue
            .push(PendingTransaction::new(notification.signature, notification.logs));
        NotificationOutcome::Enqueued
    }

    /// Subscribe and consume until shutdown, reconnecting after drops
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(programs = self.programs.len(), "Log subscriber started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let subscribed = tokio::select! {
                _ = shutdown.wait_for(|stop| *stop) => break,
                result = self.provider.subscribe(&self.programs) => result,
            };

            match subscribed {
                Ok(mut stream) => {
                    info!("Log subscription established");
                    loop {
                        tokio::select! {
                            _ = shutdown.wait_for(|stop| *stop) => {
                                debug!("Log subscriber stopped");
                                return;
                            }
                            next = stream.next() => match next {
                                Some(notification) => {
                                    self.handle_notification(notification);
                                }
                                None => {
                                    warn!("Log stream ended");
                                    break;
                                }
                            },
                        }
                    }
                }
                Err(e) => warn!(error = %e, "Log subscription failed"),
            }

            metrics().stream_reconnects.inc();
            tokio::select! {
                _ = shutdown.wait_for(|stop| *stop) => break,
                _ = tokio::time::sleep(self.reconnect_delay) => {}
            }
            info!(delay_ms = self.reconnect_delay.as_millis() as u64, "Reconnecting log subscription");
        }
        debug!("Log subscriber stopped");
    }

    pub fn seen_count(&self) -> usize {
        self.seen.lock().len()
    }

    pub fn clear_seen(&self) {
        self.seen.lock().clear();
    }
}
