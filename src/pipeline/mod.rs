//! Detection-and-enrichment pipeline
//!
//! ```text
//! log stream -> LogSubscriber -> RetrievalQueue -> Fetcher -> QuarantineScheduler -> mpsc
//!                 (dedupe)          (backoff)     (decoders)      (dwell)
//! ```
//!
//! Every RPC call made by a running pipeline goes through one shared
//! [`RateLimiter`]. The limiter is rebuilt on each `start()` so a stopped
//! pipeline can be started again.

pub mod fetcher;
pub mod quarantine;
pub mod retrieval;
pub mod supervisor;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::config::PipelineConfig;
use crate::decoder::MetadataDecoder;
use crate::rpc_manager::{RateLimitedRpc, RateLimiter, RpcError, SolanaRpc};
use crate::sniffer::dedupe::SignatureSet;
use crate::sniffer::subscriber::LogSubscriber;
use crate::streaming::LogStreamProvider;
use crate::types::EnrichedCandidate;

use fetcher::{FetchOutcome, Fetcher};
use quarantine::QuarantineScheduler;
use retrieval::RetrievalQueue;
pub use supervisor::PipelineState;
use supervisor::{Supervisor, WorkerHandle};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("pipeline cannot start from state {0:?}")]
    AlreadyRunning(PipelineState),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Rpc(#[from] RpcError),
}

/// Point-in-time view for the periodic stats line
#[derive(Debug, Clone)]
pub struct PipelineStats {
    pub state: PipelineState,
    pub pending_transactions: usize,
    pub quarantined: usize,
    pub seen_signatures: usize,
    pub rpc_in_flight: usize,
}

pub struct Pipeline {
    config: PipelineConfig,
    rpc: Arc<dyn SolanaRpc>,
    decoder: Arc<MetadataDecoder>,
    queue: Arc<RetrievalQueue>,
    quarantine: Arc<QuarantineScheduler>,
    subscriber: Arc<LogSubscriber>,
    supervisor: Supervisor,
    limiter: Mutex<Option<Arc<RateLimiter>>>,
}

impl Pipeline {
    /// Wire the pipeline over a raw RPC client and a log stream provider
    ///
    /// `rpc` must not be rate limited; the pipeline wraps it itself.
    pub fn new(
        config: PipelineConfig,
        rpc: Arc<dyn SolanaRpc>,
        stream: Arc<dyn LogStreamProvider>,
    ) -> Result<Self, PipelineError> {
        let config_err = |e: anyhow::Error| PipelineError::Config(format!("{:#}", e));
        config.validate().map_err(config_err)?;

        let programs = config.program_ids().map_err(config_err)?;
        let classifier = config.classifier().map_err(config_err)?;
        let decoder = Arc::new(MetadataDecoder::new(
            config.decoder_settings().map_err(config_err)?,
        ));
        let queue = Arc::new(RetrievalQueue::new(config.retrieval_settings()));
        let quarantine = Arc::new(QuarantineScheduler::new(config.quarantine_settings()));
        let subscriber = Arc::new(LogSubscriber::new(
            programs,
            stream,
            SignatureSet::new(config.stream.dedupe_mode, config.stream.dedupe_capacity),
            classifier,
            queue.clone(),
            config.reconnect_delay(),
        ));

        Ok(Self {
            config,
            rpc,
            decoder,
            queue,
            quarantine,
            subscriber,
            supervisor: Supervisor::new(),
            limiter: Mutex::new(None),
        })
    }

    /// HTTP JSON-RPC client plus the WebSocket log stream from `config`
    #[cfg(feature = "ws-stream")]
    pub fn from_config(config: PipelineConfig) -> Result<Self, PipelineError> {
        let rpc = crate::rpc_manager::HttpRpcClient::new(
            config.rpc.http_url.clone(),
            config.rpc.api_key.clone(),
            config.request_timeout(),
        )?;
        let stream = crate::streaming::WebSocketLogStream::new(config.stream.ws_url.clone());
        Self::new(config, Arc::new(rpc), Arc::new(stream))
    }

    /// Spawn the workers and return the receiver of emitted candidates
    pub fn start(&self) -> Result<mpsc::Receiver<EnrichedCandidate>, PipelineError> {
        let shutdown = self
            .supervisor
            .begin_start()
            .ok_or_else(|| PipelineError::AlreadyRunning(self.supervisor.state()))?;

        let limiter = Arc::new(RateLimiter::new(self.config.limiter_config()));
        *self.limiter.lock() = Some(limiter.clone());

        let rpc: Arc<dyn SolanaRpc> = Arc::new(RateLimitedRpc::new(
            self.rpc.clone(),
            limiter,
            self.config.request_timeout(),
        ));
        let fetcher = Arc::new(Fetcher::new(
            rpc,
            self.decoder.clone(),
            self.queue.settings().commitment,
        ));
        let (tx, rx) = mpsc::channel(self.config.quarantine.output_channel_capacity);

        self.supervisor.register(WorkerHandle::new(
            "log-subscriber",
            tokio::spawn(self.subscriber.clone().run(shutdown.clone())),
        ));
        self.supervisor.register(WorkerHandle::new(
            "retrieval",
            tokio::spawn(run_retrieval(
                self.queue.clone(),
                fetcher.clone(),
                self.quarantine.clone(),
                shutdown.clone(),
            )),
        ));
        self.supervisor.register(WorkerHandle::new(
            "quarantine",
            tokio::spawn(self.quarantine.clone().run(fetcher, tx, shutdown)),
        ));

        self.supervisor.mark_running();
        info!(
            programs = self.config.stream.programs.len(),
            rps = self.config.limiter.requests_per_second,
            max_in_flight = self.config.limiter.max_in_flight,
            dwell_ms = self.config.quarantine.dwell_ms,
            "Pipeline started"
        );
        Ok(rx)
    }

    /// Stop all workers, fail pending RPC waits and drop queued state
    pub async fn stop(&self) {
        if let Some(limiter) = self.limiter.lock().take() {
            limiter.close();
        }
        let timeout = Duration::from_millis(self.config.monitoring.shutdown_timeout_ms);
        self.supervisor.stop(timeout).await;

        self.queue.clear();
        self.quarantine.clear();
        self.subscriber.clear_seen();
    }

    pub fn state(&self) -> PipelineState {
        self.supervisor.state()
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            state: self.state(),
            pending_transactions: self.queue.len(),
            quarantined: self.quarantine.len(),
            seen_signatures: self.subscriber.seen_count(),
            rpc_in_flight: self
                .limiter
                .lock()
                .as_ref()
                .map_or(0, |limiter| limiter.in_flight()),
        }
    }

    pub fn queue(&self) -> &Arc<RetrievalQueue> {
        &self.queue
    }

    pub fn quarantine(&self) -> &Arc<QuarantineScheduler> {
        &self.quarantine
    }

    pub fn subscriber(&self) -> &Arc<LogSubscriber> {
        &self.subscriber
    }
}

/// Tick loop selecting due transactions and resolving their fetches
async fn run_retrieval(
    queue: Arc<RetrievalQueue>,
    fetcher: Arc<Fetcher>,
    quarantine: Arc<QuarantineScheduler>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(queue.settings().tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut fetches: JoinSet<(String, FetchOutcome)> = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown.wait_for(|stop| *stop) => break,
            _ = ticker.tick() => {
                for job in queue.select_due(Instant::now()) {
                    let fetcher = fetcher.clone();
                    fetches.spawn(async move {
                        let outcome = AssertUnwindSafe(fetcher.fetch(&job))
                            .catch_unwind()
                            .await
                            .unwrap_or_else(|_| {
                                error!(signature = %job.signature, "Fetch task panicked");
                                FetchOutcome::Fatal
                            });
                        (job.signature, outcome)
                    });
                }
            }
            Some(joined) = fetches.join_next() => match joined {
                Ok((signature, outcome)) => resolve_fetch(&queue, &quarantine, &signature, outcome),
                Err(e) => debug!(error = %e, "Fetch task cancelled"),
            },
        }
    }

    fetches.abort_all();
    debug!("Retrieval loop stopped");
}

fn resolve_fetch(
    queue: &RetrievalQueue,
    quarantine: &QuarantineScheduler,
    signature: &str,
    outcome: FetchOutcome,
) {
    match outcome {
        FetchOutcome::Decoded(candidate) => {
            queue.finish(signature);
            quarantine.admit(candidate);
        }
        FetchOutcome::Retry => {
            queue.release_for_retry(signature, Instant::now());
        }
        FetchOutcome::Fatal | FetchOutcome::Rejected => queue.finish(signature),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::retrieval::PendingTransaction;
    use crate::rpc_manager::{AccountData, Commitment};
    use crate::streaming::{LogStream, StreamError};
    use crate::types::Candidate;
    use async_trait::async_trait;
    use serde_json::Value;
    use solana_sdk::pubkey::Pubkey;

    struct NoRpc;

    #[async_trait]
    impl SolanaRpc for NoRpc {
        async fn get_transaction(&self, _: &str, _: Commitment) -> Result<Option<Value>, RpcError> {
            Ok(None)
        }

        async fn get_account_info(&self, _: &Pubkey, _: Commitment) -> Result<Option<AccountData>, RpcError> {
            Ok(None)
        }
    }

    struct IdleStream;

    #[async_trait]
    impl LogStreamProvider for IdleStream {
        async fn subscribe(&self, _: &[Pubkey]) -> Result<LogStream, StreamError> {
            Ok(Box::pin(futures::stream::pending()))
        }
    }

    fn pipeline() -> Pipeline {
        Pipeline::new(PipelineConfig::default(), Arc::new(NoRpc), Arc::new(IdleStream)).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_lifecycle_is_restartable() {
        let pipeline = pipeline();
        assert_eq!(pipeline.state(), PipelineState::Stopped);

        let _rx = pipeline.start().unwrap();
        assert_eq!(pipeline.state(), PipelineState::Running);
        assert!(matches!(pipeline.start(), Err(PipelineError::AlreadyRunning(PipelineState::Running))));

        pipeline.queue().push(PendingTransaction::new("sig".to_string(), vec![]));
        pipeline.stop().await;
        assert_eq!(pipeline.state(), PipelineState::Stopped);
        assert_eq!(pipeline.stats().pending_transactions, 0);

        let _rx = pipeline.start().unwrap();
        assert_eq!(pipeline.state(), PipelineState::Running);
        pipeline.stop().await;
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = PipelineConfig::default();
        config.stream.programs = vec!["not-a-key".to_string()];
        let result = Pipeline::new(config, Arc::new(NoRpc), Arc::new(IdleStream));
        assert!(matches!(result, Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_zero_intervals_rejected() {
        let mut config = PipelineConfig::default();
        config.retrieval.tick_interval_ms = 0;
        let result = Pipeline::new(config, Arc::new(NoRpc), Arc::new(IdleStream));
        assert!(matches!(result, Err(PipelineError::Config(msg)) if msg.contains("tick_interval_ms")));

        let mut config = PipelineConfig::default();
        config.limiter.bucket_capacity = 0;
        let result = Pipeline::new(config, Arc::new(NoRpc), Arc::new(IdleStream));
        assert!(matches!(result, Err(PipelineError::Config(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_fetch_routes_outcomes() {
        let queue = RetrievalQueue::new(Default::default());
        let quarantine = QuarantineScheduler::new(Default::default());
        for sig in ["decoded", "retry", "fatal"] {
            queue.push(PendingTransaction::new(sig.to_string(), vec![]));
        }
        queue.select_due(Instant::now());

        let mint = Pubkey::new_unique();
        let candidate = Candidate::new(mint, "decoded".to_string(), vec![]);
        resolve_fetch(&queue, &quarantine, "decoded", FetchOutcome::Decoded(candidate));
        resolve_fetch(&queue, &quarantine, "retry", FetchOutcome::Retry);
        resolve_fetch(&queue, &quarantine, "fatal", FetchOutcome::Fatal);

        assert!(quarantine.contains(&mint));
        assert!(!queue.contains("decoded"));
        assert!(queue.contains("retry"));
        assert!(!queue.contains("fatal"));
    }
}
