//! Mint Sniffer - bonding-curve launch detection for Solana
//!
//! Subscribes to launcher program logs, retrieves creating transactions
//! through a shared rate limiter, decodes token metadata and bonding-curve
//! reserves, and emits enriched candidates after a dwell period.

pub mod config;
pub mod decoder;
pub mod endpoints;
pub mod metrics;
pub mod pipeline;
pub mod sniffer;
pub mod streaming;
pub mod types;

// Component modules with non-standard paths (directories with spaces)
#[path = "rpc manager/mod.rs"]
pub mod rpc_manager;

// Re-export commonly used types
pub use config::PipelineConfig;
pub use pipeline::{Pipeline, PipelineError, PipelineState, PipelineStats};
pub use solana_sdk::pubkey::Pubkey;
pub use types::{Candidate, DecodedMint, EnrichedCandidate, Reserves};
