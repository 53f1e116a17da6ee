//! RPC Manager Module
//!
//! HTTP JSON-RPC client, the shared rate limiter every call goes through,
//! and the retry helper used for account reads.

// Submodules
pub mod rpc_client;
pub mod rpc_errors;
pub mod rpc_limiter;
pub mod rpc_retry;

// Re-exports for convenience
pub use rpc_client::{AccountData, Commitment, HttpRpcClient, RateLimitedRpc, SolanaRpc};
pub use rpc_errors::RpcError;
pub use rpc_limiter::{RateLimiter, RateLimiterConfig, RatePermit};
pub use rpc_retry::{retry_linear, RetryPolicy};
