//! Configuration module for the mint sniffer
//!
//! Loaded from TOML, then overridden by `MINT_SNIFFER_*` environment
//! variables (a `.env` file is honoured). Every field has a default so an
//! empty file is a valid configuration.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

use crate::decoder::{filter::DEFAULT_DENYLIST, DecoderSettings};
use crate::pipeline::quarantine::QuarantineSettings;
use crate::pipeline::retrieval::RetrievalSettings;
use crate::rpc_manager::{Commitment, RateLimiterConfig, RetryPolicy};
use crate::sniffer::classifier::{CreationClassifier, DEFAULT_CREATION_PATTERNS};
use crate::sniffer::dedupe::DedupeMode;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub rpc: RpcConfig,

    #[serde(default)]
    pub stream: StreamConfig,

    #[serde(default)]
    pub limiter: LimiterConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub quarantine: QuarantineConfig,

    #[serde(default)]
    pub decoder: DecoderConfig,

    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// HTTPS JSON-RPC endpoint
    #[serde(default = "default_http_url")]
    pub http_url: String,

    /// Sent as a bearer token when set
    #[serde(default)]
    pub api_key: Option<String>,

    /// Per-call timeout in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Commitment for getTransaction
    #[serde(default = "default_commitment")]
    pub commitment: Commitment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    #[serde(default = "default_ws_url")]
    pub ws_url: String,

    /// Launcher program ids to subscribe to; the first owns the bonding curves
    #[serde(default = "default_programs")]
    pub programs: Vec<String>,

    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Case-insensitive regexes marking a creation transaction
    #[serde(default = "default_creation_patterns")]
    pub creation_patterns: Vec<String>,

    #[serde(default)]
    pub dedupe_mode: DedupeMode,

    #[serde(default = "default_dedupe_capacity")]
    pub dedupe_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: f64,

    #[serde(default = "default_bucket_capacity")]
    pub bucket_capacity: u32,

    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,

    #[serde(default = "default_throttle_backoff_ms")]
    pub throttle_backoff_ms: u64,

    #[serde(default = "default_throttle_jitter_ms")]
    pub throttle_jitter_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_retrieval_tick_ms")]
    pub tick_interval_ms: u64,

    #[serde(default = "default_max_batch_per_tick")]
    pub max_batch_per_tick: usize,

    #[serde(default = "default_backoff_unit_ms")]
    pub backoff_unit_ms: u64,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,

    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuarantineConfig {
    #[serde(default = "default_dwell_ms")]
    pub dwell_ms: u64,

    #[serde(default = "default_quarantine_tick_ms")]
    pub tick_interval_ms: u64,

    #[serde(default = "default_quarantine_capacity")]
    pub capacity: usize,

    /// Entries older than this are dropped when over capacity
    #[serde(default = "default_gc_max_age_secs")]
    pub gc_max_age_secs: u64,

    /// Buffer of the outbound candidate channel
    #[serde(default = "default_output_channel_capacity")]
    pub output_channel_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecoderConfig {
    #[serde(default = "default_token_2022_program")]
    pub token_2022_program: String,

    #[serde(default = "default_metadata_program")]
    pub metadata_program: String,

    /// Case-insensitive substrings rejected in name or symbol
    #[serde(default = "default_denylist")]
    pub denylist: Vec<String>,

    #[serde(default = "default_metadata_attempts")]
    pub metadata_attempts: u32,

    #[serde(default = "default_metadata_retry_delay_ms")]
    pub metadata_retry_delay_ms: u64,

    #[serde(default = "default_reserves_attempts")]
    pub reserves_attempts: u32,

    #[serde(default = "default_reserves_retry_delay_ms")]
    pub reserves_retry_delay_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    #[serde(default)]
    pub log_format: LogFormat,

    /// Periodic stats log line; 0 disables it
    #[serde(default = "default_stats_interval_secs")]
    pub stats_interval_secs: u64,

    /// Serve Prometheus metrics on this port when set
    #[serde(default)]
    pub metrics_port: Option<u16>,

    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

// Default value functions
fn default_http_url() -> String { "https://api.mainnet-beta.solana.com".to_string() }
fn default_ws_url() -> String { "wss://api.mainnet-beta.solana.com".to_string() }
fn default_request_timeout_ms() -> u64 { 5000 }
fn default_commitment() -> Commitment { Commitment::Confirmed }
fn default_programs() -> Vec<String> {
    vec![crate::decoder::reserves::DEFAULT_LAUNCHER_PROGRAM_ID.to_string()]
}
fn default_reconnect_delay_ms() -> u64 { 5000 }
fn default_creation_patterns() -> Vec<String> {
    DEFAULT_CREATION_PATTERNS.iter().map(|s| s.to_string()).collect()
}
fn default_dedupe_capacity() -> usize { crate::sniffer::dedupe::DEFAULT_CAPACITY }
fn default_requests_per_second() -> f64 { 10.0 }
fn default_bucket_capacity() -> u32 { 10 }
fn default_max_in_flight() -> usize { 5 }
fn default_throttle_backoff_ms() -> u64 { 2000 }
fn default_throttle_jitter_ms() -> u64 { 1000 }
fn default_retrieval_tick_ms() -> u64 { 500 }
fn default_max_batch_per_tick() -> usize { 5 }
fn default_backoff_unit_ms() -> u64 { 1000 }
fn default_max_attempts() -> u32 { 6 }
fn default_max_age_secs() -> u64 { 60 }
fn default_queue_capacity() -> usize { 2000 }
fn default_dwell_ms() -> u64 { 10_000 }
fn default_quarantine_tick_ms() -> u64 { 1000 }
fn default_quarantine_capacity() -> usize { 5000 }
fn default_gc_max_age_secs() -> u64 { 120 }
fn default_output_channel_capacity() -> usize { 1024 }
fn default_token_2022_program() -> String { crate::decoder::extension::TOKEN_2022_PROGRAM_ID.to_string() }
fn default_metadata_program() -> String { crate::decoder::legacy::METADATA_PROGRAM_ID.to_string() }
fn default_denylist() -> Vec<String> { DEFAULT_DENYLIST.iter().map(|s| s.to_string()).collect() }
fn default_metadata_attempts() -> u32 { 2 }
fn default_metadata_retry_delay_ms() -> u64 { 250 }
fn default_reserves_attempts() -> u32 { 3 }
fn default_reserves_retry_delay_ms() -> u64 { 200 }
fn default_stats_interval_secs() -> u64 { 60 }
fn default_shutdown_timeout_ms() -> u64 { 5000 }

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            http_url: default_http_url(),
            api_key: None,
            request_timeout_ms: default_request_timeout_ms(),
            commitment: default_commitment(),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            ws_url: default_ws_url(),
            programs: default_programs(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            creation_patterns: default_creation_patterns(),
            dedupe_mode: DedupeMode::default(),
            dedupe_capacity: default_dedupe_capacity(),
        }
    }
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_requests_per_second(),
            bucket_capacity: default_bucket_capacity(),
            max_in_flight: default_max_in_flight(),
            throttle_backoff_ms: default_throttle_backoff_ms(),
            throttle_jitter_ms: default_throttle_jitter_ms(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_retrieval_tick_ms(),
            max_batch_per_tick: default_max_batch_per_tick(),
            backoff_unit_ms: default_backoff_unit_ms(),
            max_attempts: default_max_attempts(),
            max_age_secs: default_max_age_secs(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl Default for QuarantineConfig {
    fn default() -> Self {
        Self {
            dwell_ms: default_dwell_ms(),
            tick_interval_ms: default_quarantine_tick_ms(),
            capacity: default_quarantine_capacity(),
            gc_max_age_secs: default_gc_max_age_secs(),
            output_channel_capacity: default_output_channel_capacity(),
        }
    }
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            token_2022_program: default_token_2022_program(),
            metadata_program: default_metadata_program(),
            denylist: default_denylist(),
            metadata_attempts: default_metadata_attempts(),
            metadata_retry_delay_ms: default_metadata_retry_delay_ms(),
            reserves_attempts: default_reserves_attempts(),
            reserves_retry_delay_ms: default_reserves_retry_delay_ms(),
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::default(),
            stats_interval_secs: default_stats_interval_secs(),
            metrics_port: None,
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file {}", path.as_ref().display()))?;

        let config: PipelineConfig =
            toml::from_str(&contents).map_err(|e| anyhow!("Failed to parse TOML config: {}", e))?;
        Ok(config)
    }

    /// File (or defaults) + `.env` + environment overrides, validated
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `MINT_SNIFFER_*` overrides read through `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("MINT_SNIFFER_RPC_URL") {
            self.rpc.http_url = url;
        }

        if let Some(url) = lookup("MINT_SNIFFER_WS_URL") {
            self.stream.ws_url = url;
        }

        if let Some(key) = lookup("MINT_SNIFFER_API_KEY") {
            self.rpc.api_key = (!key.is_empty()).then_some(key);
        }

        if let Some(programs) = lookup("MINT_SNIFFER_PROGRAMS") {
            self.stream.programs = programs
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Some(rps) = lookup("MINT_SNIFFER_RPS") {
            self.limiter.requests_per_second = rps
                .parse()
                .map_err(|e| anyhow!("Invalid MINT_SNIFFER_RPS: {}", e))?;
        }

        if let Some(max) = lookup("MINT_SNIFFER_MAX_IN_FLIGHT") {
            self.limiter.max_in_flight = max
                .parse()
                .map_err(|e| anyhow!("Invalid MINT_SNIFFER_MAX_IN_FLIGHT: {}", e))?;
        }

        if let Some(dwell) = lookup("MINT_SNIFFER_DWELL_MS") {
            self.quarantine.dwell_ms = dwell
                .parse()
                .map_err(|e| anyhow!("Invalid MINT_SNIFFER_DWELL_MS: {}", e))?;
        }

        if let Some(port) = lookup("MINT_SNIFFER_METRICS_PORT") {
            self.monitoring.metrics_port = Some(
                port.parse()
                    .map_err(|e| anyhow!("Invalid MINT_SNIFFER_METRICS_PORT: {}", e))?,
            );
        }

        Ok(())
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.rpc.http_url.is_empty() {
            return Err(anyhow!("rpc.http_url must be set"));
        }
        if self.rpc.request_timeout_ms == 0 {
            return Err(anyhow!("rpc.request_timeout_ms must be > 0"));
        }
        if self.stream.programs.is_empty() {
            return Err(anyhow!("stream.programs must not be empty"));
        }
        self.program_ids()?;
        if self.stream.creation_patterns.is_empty() {
            return Err(anyhow!("stream.creation_patterns must not be empty"));
        }
        self.classifier()?;
        if self.stream.dedupe_capacity == 0 {
            return Err(anyhow!("stream.dedupe_capacity must be > 0"));
        }
        if !(self.limiter.requests_per_second > 0.0) {
            return Err(anyhow!("limiter.requests_per_second must be > 0"));
        }
        if self.limiter.bucket_capacity == 0 {
            return Err(anyhow!("limiter.bucket_capacity must be > 0"));
        }
        if self.limiter.max_in_flight == 0 {
            return Err(anyhow!("limiter.max_in_flight must be > 0"));
        }
        if self.retrieval.tick_interval_ms == 0 {
            return Err(anyhow!("retrieval.tick_interval_ms must be > 0"));
        }
        if self.retrieval.max_batch_per_tick == 0 {
            return Err(anyhow!("retrieval.max_batch_per_tick must be > 0"));
        }
        if self.retrieval.max_attempts == 0 {
            return Err(anyhow!("retrieval.max_attempts must be > 0"));
        }
        if self.retrieval.queue_capacity == 0 {
            return Err(anyhow!("retrieval.queue_capacity must be > 0"));
        }
        if self.quarantine.tick_interval_ms == 0 {
            return Err(anyhow!("quarantine.tick_interval_ms must be > 0"));
        }
        if self.quarantine.capacity == 0 {
            return Err(anyhow!("quarantine.capacity must be > 0"));
        }
        if self.quarantine.output_channel_capacity == 0 {
            return Err(anyhow!("quarantine.output_channel_capacity must be > 0"));
        }
        if self.decoder.metadata_attempts == 0 || self.decoder.reserves_attempts == 0 {
            return Err(anyhow!("decoder attempts must be > 0"));
        }
        self.decoder_settings()?;
        Ok(())
    }

    pub fn program_ids(&self) -> Result<Vec<Pubkey>> {
        self.stream
            .programs
            .iter()
            .map(|p| parse_pubkey("stream.programs", p))
            .collect()
    }

    pub fn classifier(&self) -> Result<CreationClassifier> {
        CreationClassifier::new(&self.stream.creation_patterns)
            .map_err(|e| anyhow!("Invalid stream.creation_patterns: {}", e))
    }

    pub fn limiter_config(&self) -> RateLimiterConfig {
        RateLimiterConfig {
            capacity: self.limiter.bucket_capacity,
            refill_per_second: self.limiter.requests_per_second,
            max_in_flight: self.limiter.max_in_flight,
            throttle_backoff: Duration::from_millis(self.limiter.throttle_backoff_ms),
            throttle_jitter_max: Duration::from_millis(self.limiter.throttle_jitter_ms),
        }
    }

    pub fn retrieval_settings(&self) -> RetrievalSettings {
        RetrievalSettings {
            tick_interval: Duration::from_millis(self.retrieval.tick_interval_ms),
            max_batch_per_tick: self.retrieval.max_batch_per_tick,
            backoff_unit: Duration::from_millis(self.retrieval.backoff_unit_ms),
            max_attempts: self.retrieval.max_attempts,
            max_age: Duration::from_secs(self.retrieval.max_age_secs),
            capacity: self.retrieval.queue_capacity,
            commitment: self.rpc.commitment,
        }
    }

    pub fn quarantine_settings(&self) -> QuarantineSettings {
        QuarantineSettings {
            dwell: Duration::from_millis(self.quarantine.dwell_ms),
            tick_interval: Duration::from_millis(self.quarantine.tick_interval_ms),
            capacity: self.quarantine.capacity,
            gc_max_age: Duration::from_secs(self.quarantine.gc_max_age_secs),
        }
    }

    pub fn decoder_settings(&self) -> Result<DecoderSettings> {
        Ok(DecoderSettings {
            token_2022_program: parse_pubkey("decoder.token_2022_program", &self.decoder.token_2022_program)?,
            metadata_program: parse_pubkey("decoder.metadata_program", &self.decoder.metadata_program)?,
            launcher_programs: self.program_ids()?,
            denylist: self.decoder.denylist.clone(),
            metadata_retry: RetryPolicy::fixed(
                self.decoder.metadata_attempts,
                Duration::from_millis(self.decoder.metadata_retry_delay_ms),
            ),
            reserves_retry: RetryPolicy::fixed(
                self.decoder.reserves_attempts,
                Duration::from_millis(self.decoder.reserves_retry_delay_ms),
            ),
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc.request_timeout_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.stream.reconnect_delay_ms)
    }
}

fn parse_pubkey(field: &str, value: &str) -> Result<Pubkey> {
    Pubkey::from_str(value.trim()).map_err(|e| anyhow!("Invalid {} '{}': {}", field, value, e))
}
