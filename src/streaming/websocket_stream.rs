//! WebSocket log streaming through the Solana pubsub client
//!
//! Works against the native Solana WebSocket API or enhanced RPC providers
//! (Helius, QuickNode, Alchemy).

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::Stream;
use futures_util::StreamExt;
use solana_client::nonblocking::pubsub_client::PubsubClient;
use solana_client::rpc_config::{RpcTransactionLogsConfig, RpcTransactionLogsFilter};
use solana_client::rpc_response::{Response, RpcLogsResponse};
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{LogNotification, LogStream, LogStreamProvider, StreamError};

/// WebSocket streaming client for monitoring launcher program logs
pub struct WebSocketLogStream {
    ws_url: String,
    commitment: CommitmentConfig,
}

impl WebSocketLogStream {
    pub fn new(ws_url: String) -> Self {
        Self {
            ws_url,
            commitment: CommitmentConfig::confirmed(),
        }
    }

    /// Connect to WebSocket endpoint and return client
    async fn connect(&self) -> Result<Arc<PubsubClient>, StreamError> {
        info!(url = %self.ws_url, "Connecting to WebSocket");

        let client = PubsubClient::new(&self.ws_url)
            .await
            .map_err(|e| StreamError::Connect {
                url: self.ws_url.clone(),
                message: e.to_string(),
            })?;

        info!("WebSocket connected successfully");
        Ok(Arc::new(client))
    }

    /// Spawn the task that owns one `logsSubscribe` and forwards into `tx`
    fn spawn_subscription(
        &self,
        client: Arc<PubsubClient>,
        program_id: Pubkey,
        tx: mpsc::UnboundedSender<StreamEvent>,
    ) -> JoinHandle<()> {
        let commitment = self.commitment;

        tokio::spawn(async move {
            let (mut notifications, unsubscribe) = match client
                .logs_subscribe(
                    RpcTransactionLogsFilter::Mentions(vec![program_id.to_string()]),
                    RpcTransactionLogsConfig {
                        commitment: Some(commitment),
                    },
                )
                .await
            {
                Ok(result) => result,
                Err(e) => {
                    warn!(program = %program_id, error = %e, "Failed to subscribe to logs");
                    let _ = tx.send(StreamEvent::Closed);
                    return;
                }
            };
            debug!(program = %program_id, "Log subscription active");

            // client is kept alive by being in the task scope
            while let Some(response) = notifications.next().await {
                if tx.send(StreamEvent::Notification(from_response(response))).is_err() {
                    break;
                }
            }
            unsubscribe().await;
            let _ = tx.send(StreamEvent::Closed);
        })
    }
}

#[async_trait]
impl LogStreamProvider for WebSocketLogStream {
    async fn subscribe(&self, programs: &[Pubkey]) -> Result<LogStream, StreamError> {
        if programs.is_empty() {
            return Err(StreamError::NoPrograms);
        }
        let client = self.connect().await?;
        let (tx, rx) = mpsc::unbounded_channel();

        let tasks = programs
            .iter()
            .map(|program| {
                info!(program = %program, "Subscribing to program logs");
                self.spawn_subscription(client.clone(), *program, tx.clone())
            })
            .collect();

        Ok(Box::pin(MergedLogStream {
            rx,
            tasks,
            finished: false,
        }))
    }
}

enum StreamEvent {
    Notification(LogNotification),
    Closed,
}

/// Ends on the first closed subscription; aborts the rest when dropped
struct MergedLogStream {
    rx: mpsc::UnboundedReceiver<StreamEvent>,
    tasks: Vec<JoinHandle<()>>,
    finished: bool,
}

impl Stream for MergedLogStream {
    type Item = LogNotification;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }
        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(StreamEvent::Notification(notification))) => Poll::Ready(Some(notification)),
            Poll::Ready(Some(StreamEvent::Closed)) | Poll::Ready(None) => {
                self.finished = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for MergedLogStream {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

fn from_response(response: Response<RpcLogsResponse>) -> LogNotification {
    LogNotification {
        signature: response.value.signature,
        failed: response.value.err.is_some(),
        logs: response.value.logs,
        slot: response.context.slot,
    }
}
