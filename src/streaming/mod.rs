//! Streaming log sources for real-time launch detection
//!
//! The pipeline only depends on [`LogStreamProvider`]; the WebSocket
//! implementation sits behind the `ws-stream` feature.

#[cfg(feature = "ws-stream")]
pub mod websocket_stream;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

#[cfg(feature = "ws-stream")]
pub use websocket_stream::WebSocketLogStream;

/// One `logsNotification` push
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogNotification {
    pub signature: String,
    pub logs: Vec<String>,
    /// Transaction failed on-chain
    pub failed: bool,
    pub slot: u64,
}

/// Merged notifications for every subscribed program
///
/// The stream ends when any underlying subscription ends or the connection
/// drops; the caller reconnects.
pub type LogStream = Pin<Box<dyn Stream<Item = LogNotification> + Send>>;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("failed to connect to {url}: {message}")]
    Connect { url: String, message: String },

    #[error("no programs to subscribe to")]
    NoPrograms,
}

/// Unified streaming interface
#[async_trait]
pub trait LogStreamProvider: Send + Sync {
    /// Open one subscription per program mentioning it and merge them
    async fn subscribe(&self, programs: &[Pubkey]) -> Result<LogStream, StreamError>;
}
