//! Common types passed between pipeline stages

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use tokio::time::Instant;

/// Which decoder produced a metadata record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecoderKind {
    /// Token-extension TLV metadata on the mint account
    Extension,
    /// Legacy metadata program account
    Legacy,
    /// Recovered from raw transaction log lines
    LogText,
}

impl DecoderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecoderKind::Extension => "extension",
            DecoderKind::Legacy => "legacy",
            DecoderKind::LogText => "log_text",
        }
    }
}

/// Token metadata recovered by one of the decoders
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedMint {
    /// Token mint address
    pub mint: Pubkey,
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub uri: Option<String>,
    /// Decoder that produced this record
    pub source: DecoderKind,
}

impl DecodedMint {
    /// True when name or symbol is still missing
    pub fn is_thin(&self) -> bool {
        self.name.is_none() || self.symbol.is_none()
    }
}

/// Virtual reserves read from a bonding-curve account
///
/// Absent reserves are represented by `Option::None`, never by zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reserves {
    /// Virtual token reserves in whole tokens (6 decimals)
    pub virtual_token_reserves: f64,
    /// Virtual SOL reserves in SOL (9 decimals)
    pub virtual_sol_reserves: f64,
}

/// A detected launch travelling from the fetcher through quarantine
#[derive(Debug, Clone)]
pub struct Candidate {
    pub mint: Pubkey,
    /// Signature of the creating transaction
    pub signature: String,
    pub metadata: Option<DecodedMint>,
    pub reserves: Option<Reserves>,
    /// Log lines kept for log-text re-decoding at quarantine exit
    pub log_lines: Vec<String>,
    pub detected_at: Instant,
}

impl Candidate {
    pub fn new(mint: Pubkey, signature: String, log_lines: Vec<String>) -> Self {
        Self {
            mint,
            signature,
            metadata: None,
            reserves: None,
            log_lines,
            detected_at: Instant::now(),
        }
    }

    /// Candidate whose name or symbol has not been decoded yet
    pub fn is_thin(&self) -> bool {
        self.metadata.as_ref().map_or(true, DecodedMint::is_thin)
    }
}

/// Record emitted to the scoring collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedCandidate {
    #[serde(rename = "mintAddress", with = "pubkey_string")]
    pub mint: Pubkey,
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub uri: Option<String>,
    pub reserves: Option<Reserves>,
    pub signature: String,
    pub decoder: Option<DecoderKind>,
    /// Wall-clock emission time
    pub emitted_at: chrono::DateTime<chrono::Utc>,
}

impl EnrichedCandidate {
    pub fn from_candidate(candidate: Candidate) -> Self {
        let (name, symbol, uri, decoder) = match candidate.metadata {
            Some(m) => (m.name, m.symbol, m.uri, Some(m.source)),
            None => (None, None, None, None),
        };
        Self {
            mint: candidate.mint,
            name,
            symbol,
            uri,
            reserves: candidate.reserves,
            signature: candidate.signature,
            decoder,
            emitted_at: chrono::Utc::now(),
        }
    }
}

mod pubkey_string {
    use serde::{Deserialize, Deserializer, Serializer};
    use solana_sdk::pubkey::Pubkey;
    use std::str::FromStr;

    pub fn serialize<S: Serializer>(key: &Pubkey, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&key.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Pubkey, D::Error> {
        let s = String::deserialize(d)?;
        Pubkey::from_str(&s).map_err(serde::de::Error::custom)
    }
}
