//! Retrieval of creating transactions and candidate enrichment

use std::str::FromStr;
use std::sync::Arc;

use serde_json::Value;
use solana_sdk::pubkey::Pubkey;
use tracing::{debug, info};

use super::retrieval::FetchJob;
use crate::decoder::{DecodeOutcome, MetadataDecoder};
use crate::metrics::metrics;
use crate::rpc_manager::{Commitment, SolanaRpc};
use crate::types::Candidate;

const NATIVE_MINT: &str = "So11111111111111111111111111111111111111112";

/// Result of one fetch attempt
#[derive(Debug)]
pub enum FetchOutcome {
    /// Mint resolved; ready for quarantine (possibly thin)
    Decoded(Candidate),
    /// Not indexed yet, timed out or throttled
    Retry,
    /// Transaction failed on-chain or the request can never succeed
    Fatal,
    /// No usable mint, or metadata rejected by the post-filter
    Rejected,
}

impl FetchOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            FetchOutcome::Decoded(_) => "decoded",
            FetchOutcome::Retry => "retry",
            FetchOutcome::Fatal => "fatal",
            FetchOutcome::Rejected => "rejected",
        }
    }
}

pub struct Fetcher {
    rpc: Arc<dyn SolanaRpc>,
    decoder: Arc<MetadataDecoder>,
    commitment: Commitment,
}

impl Fetcher {
    /// `rpc` is expected to be rate limited already
    pub fn new(rpc: Arc<dyn SolanaRpc>, decoder: Arc<MetadataDecoder>, commitment: Commitment) -> Self {
        Self {
            rpc,
            decoder,
            commitment,
        }
    }

    pub fn decoder(&self) -> &MetadataDecoder {
        &self.decoder
    }

    /// Fetch the transaction, resolve its mint and decode metadata and reserves
    pub async fn fetch(&self, job: &FetchJob) -> FetchOutcome {
        metrics().fetch_attempts.inc();
        let outcome = self.fetch_inner(job).await;
        metrics()
            .fetch_outcomes
            .with_label_values(&[outcome.label()])
            .inc();
        outcome
    }

    async fn fetch_inner(&self, job: &FetchJob) -> FetchOutcome {
        let tx = match self.rpc.get_transaction(&job.signature, self.commitment).await {
            Ok(Some(tx)) => tx,
            Ok(None) => {
                debug!(signature = %job.signature, attempt = job.attempt, "Transaction not indexed yet");
                return FetchOutcome::Retry;
            }
            Err(e) if e.is_retryable() => {
                debug!(signature = %job.signature, attempt = job.attempt, error = %e, "Transient fetch error");
                return FetchOutcome::Retry;
            }
            Err(e) => {
                debug!(signature = %job.signature, error = %e, "Permanent fetch error");
                return FetchOutcome::Fatal;
            }
        };

        let meta = tx.get("meta");
        if meta.and_then(|m| m.get("err")).map_or(false, |err| !err.is_null()) {
            debug!(signature = %job.signature, "Transaction failed on-chain");
            return FetchOutcome::Fatal;
        }

        let logs = meta
            .and_then(|m| m.get("logMessages"))
            .and_then(Value::as_array)
            .map(|lines| {
                lines
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .filter(|lines| !lines.is_empty())
            .unwrap_or_else(|| job.log_lines.clone());

        let mint = extract_mint(&tx, &self.decoder.settings().launcher_programs);
        let rpc = self.rpc.as_ref();

        let mut candidate = match self.decoder.decode(rpc, mint, &logs).await {
            DecodeOutcome::Decoded(record) => {
                let mut candidate = Candidate::new(record.mint, job.signature.clone(), logs);
                candidate.metadata = Some(record);
                candidate
            }
            DecodeOutcome::Unresolved { mint: Some(mint) } => {
                debug!(signature = %job.signature, %mint, "Metadata not readable yet, admitting thin candidate");
                Candidate::new(mint, job.signature.clone(), logs)
            }
            DecodeOutcome::Unresolved { mint: None } => {
                debug!(signature = %job.signature, "No mint found in transaction");
                return FetchOutcome::Rejected;
            }
            DecodeOutcome::Rejected { .. } => return FetchOutcome::Rejected,
        };

        candidate.reserves = self.decoder.fetch_reserves(rpc, &candidate.mint).await;
        info!(
            signature = %job.signature,
            mint = %candidate.mint,
            name = candidate.metadata.as_ref().and_then(|m| m.name.as_deref()).unwrap_or("?"),
            thin = candidate.is_thin(),
            "Launch detected"
        );
        FetchOutcome::Decoded(candidate)
    }

    /// Refresh reserves, and metadata when thin, at quarantine exit
    ///
    /// Returns `None` when the candidate should not be emitted: metadata was
    /// rejected or name and symbol are still unknown. A failed reserve read
    /// keeps the previous value.
    pub async fn re_enrich(&self, mut candidate: Candidate) -> Option<Candidate> {
        let rpc = self.rpc.as_ref();

        if let Some(reserves) = self.decoder.fetch_reserves(rpc, &candidate.mint).await {
            candidate.reserves = Some(reserves);
        }

        if candidate.is_thin() {
            match self
                .decoder
                .decode(rpc, Some(candidate.mint), &candidate.log_lines)
                .await
            {
                DecodeOutcome::Decoded(record) => candidate.metadata = Some(record),
                DecodeOutcome::Rejected { .. } => return None,
                DecodeOutcome::Unresolved { .. } => {}
            }
        }

        if candidate.is_thin() {
            metrics().candidates_dropped_thin.inc();
            debug!(mint = %candidate.mint, "Dropping candidate without name or symbol");
            return None;
        }
        Some(candidate)
    }
}

/// Resolve the mint from a `jsonParsed` transaction
///
/// First account of the first top-level launcher instruction, else the first
/// non-native mint in `meta.postTokenBalances`.
pub fn extract_mint(tx: &Value, launcher_programs: &[Pubkey]) -> Option<Pubkey> {
    let launchers: Vec<String> = launcher_programs.iter().map(|p| p.to_string()).collect();

    let from_instruction = tx
        .pointer("/transaction/message/instructions")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter(|ix| {
            ix.get("programId")
                .and_then(Value::as_str)
                .map_or(false, |id| launchers.iter().any(|l| l == id))
        })
        .find_map(|ix| {
            ix.get("accounts")
                .and_then(Value::as_array)
                .and_then(|accounts| accounts.first())
                .and_then(Value::as_str)
                .and_then(|s| Pubkey::from_str(s).ok())
        });
    if from_instruction.is_some() {
        return from_instruction;
    }

    tx.pointer("/meta/postTokenBalances")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|balance| balance.get("mint").and_then(Value::as_str))
        .filter(|mint| *mint != NATIVE_MINT)
        .find_map(|mint| Pubkey::from_str(mint).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_mint_from_launcher_instruction() {
        let launcher = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let tx = json!({
            "transaction": { "message": { "instructions": [
                { "programId": "ComputeBudget111111111111111111111111111111", "accounts": [], "data": "" },
                { "programId": launcher.to_string(), "accounts": [mint.to_string(), Pubkey::new_unique().to_string()], "data": "" }
            ]}},
            "meta": { "err": null, "postTokenBalances": [] }
        });
        assert_eq!(extract_mint(&tx, &[launcher]), Some(mint));
    }

    #[test]
    fn test_mint_from_token_balances() {
        let mint = Pubkey::new_unique();
        let tx = json!({
            "transaction": { "message": { "instructions": [] }},
            "meta": { "postTokenBalances": [
                { "mint": NATIVE_MINT, "accountIndex": 1 },
                { "mint": mint.to_string(), "accountIndex": 2 }
            ]}
        });
        assert_eq!(extract_mint(&tx, &[Pubkey::new_unique()]), Some(mint));
    }

    #[test]
    fn test_no_mint() {
        let tx = json!({ "transaction": { "message": { "instructions": [] }}, "meta": {} });
        assert_eq!(extract_mint(&tx, &[Pubkey::new_unique()]), None);
    }
}
