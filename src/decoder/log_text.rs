//! Metadata recovery from raw transaction log lines
//!
//! No RPC is involved. Three independent sources are tried:
//! 1. base64 `Program data:` event payloads in the extension string layout
//! 2. `name:` / `symbol:` / `uri:` text emitted by the launcher
//! 3. a bare base58 address that is not a well-known program, as the mint

use std::collections::HashSet;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use once_cell::sync::Lazy;
use regex::Regex;
use solana_sdk::pubkey::Pubkey;

use super::extension::TOKEN_2022_PROGRAM_ID;
use super::layout::{ByteReader, FieldLimits, MetadataStrings};
use super::legacy::METADATA_PROGRAM_ID;
use crate::types::{DecodedMint, DecoderKind};

const PROGRAM_DATA_PREFIX: &str = "Program data: ";

/// Anchor event discriminator in front of the payload
pub const EVENT_DISCRIMINATOR_LEN: usize = 8;

/// Value ends at a separator, a closing brace, end of line or the next key
const FIELD_END: &str = r#"\s*"?\s*(?:[,}]|$|\b(?:name|symbol|uri|mint)"?\s*:)"#;

static NAME_RE: Lazy<Regex> = Lazy::new(|| field_regex("name"));
static SYMBOL_RE: Lazy<Regex> = Lazy::new(|| field_regex("symbol"));
static URI_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)\buri"?\s*:\s*"?([^\s",}]+)"#).expect("valid uri regex"));
static BASE58_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[1-9A-HJ-NP-Za-km-z]{32,44}\b").expect("valid base58 regex"));

/// `key: value`, `key:"value"` and JSON `"key":"value"` shapes
fn field_regex(key: &str) -> Regex {
    Regex::new(&format!(r#"(?i)\b{}"?\s*:\s*"?(.+?){}"#, key, FIELD_END)).expect("valid field regex")
}

/// Programs and sysvars that show up in every launch and are never the mint
const WELL_KNOWN_ADDRESSES: &[Pubkey] = &[
    solana_sdk::pubkey!("11111111111111111111111111111111"),
    solana_sdk::pubkey!("TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA"),
    TOKEN_2022_PROGRAM_ID,
    solana_sdk::pubkey!("ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL"),
    METADATA_PROGRAM_ID,
    solana_sdk::pubkey!("ComputeBudget111111111111111111111111111111"),
    solana_sdk::pubkey!("So11111111111111111111111111111111111111112"),
    solana_sdk::pubkey!("SysvarRent111111111111111111111111111111111"),
];

/// Payload recovered from one `Program data:` line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramDataEvent {
    pub strings: MetadataStrings,
    /// Trailing mint written after the strings, when present
    pub mint: Option<Pubkey>,
}

pub struct LogTextDecoder {
    denylist: HashSet<Pubkey>,
}

impl LogTextDecoder {
    /// `launcher_programs` join the built-in denylist of non-mint addresses
    pub fn new(launcher_programs: &[Pubkey]) -> Self {
        let denylist = WELL_KNOWN_ADDRESSES
            .iter()
            .chain(launcher_programs.iter())
            .copied()
            .collect();
        Self { denylist }
    }

    /// Decode metadata from log lines
    ///
    /// `known_mint` is used when the logs carry strings but no mint of their
    /// own. A record with name and symbol unset means only a mint address
    /// could be recovered.
    pub fn decode(&self, logs: &[String], known_mint: Option<Pubkey>) -> Option<DecodedMint> {
        if let Some(event) = logs.iter().find_map(|line| decode_program_data(line)) {
            if let Some(mint) = event.mint.or(known_mint).or_else(|| self.scan_mint_candidate(logs)) {
                return Some(DecodedMint {
                    mint,
                    name: Some(event.strings.name),
                    symbol: Some(event.strings.symbol),
                    uri: event.strings.uri,
                    source: DecoderKind::LogText,
                });
            }
        }

        let mint = known_mint.or_else(|| self.scan_mint_candidate(logs))?;
        let (name, symbol, uri) = scan_text_fields(logs);
        Some(DecodedMint {
            mint,
            name,
            symbol,
            uri,
            source: DecoderKind::LogText,
        })
    }

    /// First base58 token of a plausible address length that parses as a
    /// public key and is not a well-known program
    pub fn scan_mint_candidate(&self, logs: &[String]) -> Option<Pubkey> {
        logs.iter()
            .flat_map(|line| BASE58_RE.find_iter(line))
            .map(|m| m.as_str())
            .filter(|s| matches!(s.len(), 32 | 43 | 44))
            .filter_map(|s| Pubkey::from_str(s).ok())
            .find(|key| !self.denylist.contains(key))
    }
}

/// Decode a base64 `Program data:` line
///
/// The payload is read after the 8-byte discriminator first, then from the
/// start of the buffer.
pub fn decode_program_data(line: &str) -> Option<ProgramDataEvent> {
    let encoded = line.trim().strip_prefix(PROGRAM_DATA_PREFIX)?;
    let bytes = BASE64.decode(encoded.trim()).ok()?;
    decode_event_at(&bytes, EVENT_DISCRIMINATOR_LEN).or_else(|| decode_event_at(&bytes, 0))
}

fn decode_event_at(bytes: &[u8], offset: usize) -> Option<ProgramDataEvent> {
    let mut reader = ByteReader::at(bytes, offset)?;
    let strings = reader.read_metadata_strings(FieldLimits::UNBOUNDED)?;
    let mint = reader.read_pubkey();
    Some(ProgramDataEvent { strings, mint })
}

fn scan_text_fields(logs: &[String]) -> (Option<String>, Option<String>, Option<String>) {
    let capture = |re: &Regex| {
        logs.iter().find_map(|line| {
            re.captures(line)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().trim().to_string())
                .filter(|s| !s.is_empty())
        })
    };
    (capture(&NAME_RE), capture(&SYMBOL_RE), capture(&URI_RE))
}
