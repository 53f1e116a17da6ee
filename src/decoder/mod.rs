//! Token metadata and bonding-curve decoders
//!
//! Metadata is tried in a fixed order, first success wins:
//! 1. token-extension TLV on the mint account
//! 2. legacy metadata program account
//! 3. raw transaction log lines
//!
//! A structural failure in one decoder falls through to the next. A record
//! that decodes but fails the post-filter is final.

pub mod extension;
pub mod filter;
pub mod layout;
pub mod legacy;
pub mod log_text;
pub mod reserves;

use solana_sdk::pubkey::Pubkey;
use tracing::debug;

use crate::metrics::metrics;
use crate::rpc_manager::{retry_linear, AccountData, Commitment, RetryPolicy, RpcError, SolanaRpc};
use crate::types::{DecodedMint, Reserves};

pub use filter::{MetadataFilter, RejectReason};
pub use log_text::LogTextDecoder;

/// Program ids and retry policies used by [`MetadataDecoder`]
#[derive(Debug, Clone)]
pub struct DecoderSettings {
    pub token_2022_program: Pubkey,
    pub metadata_program: Pubkey,
    /// Launcher programs; the first one owns the bonding curves
    pub launcher_programs: Vec<Pubkey>,
    pub denylist: Vec<String>,
    pub metadata_retry: RetryPolicy,
    pub reserves_retry: RetryPolicy,
}

impl Default for DecoderSettings {
    fn default() -> Self {
        Self {
            token_2022_program: extension::TOKEN_2022_PROGRAM_ID,
            metadata_program: legacy::METADATA_PROGRAM_ID,
            launcher_programs: vec![reserves::DEFAULT_LAUNCHER_PROGRAM_ID],
            denylist: filter::DEFAULT_DENYLIST.iter().map(|s| s.to_string()).collect(),
            metadata_retry: RetryPolicy::fixed(2, std::time::Duration::from_millis(250)),
            reserves_retry: RetryPolicy::fixed(3, std::time::Duration::from_millis(200)),
        }
    }
}

/// Result of running the decoder chain for one transaction
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeOutcome {
    /// Passed the post-filter
    Decoded(DecodedMint),
    /// Decoded but rejected by the post-filter
    Rejected { mint: Pubkey, reason: RejectReason },
    /// No decoder produced name and symbol; the mint may still be known
    Unresolved { mint: Option<Pubkey> },
}

pub struct MetadataDecoder {
    settings: DecoderSettings,
    log_text: LogTextDecoder,
    filter: MetadataFilter,
}

impl MetadataDecoder {
    pub fn new(settings: DecoderSettings) -> Self {
        Self {
            log_text: LogTextDecoder::new(&settings.launcher_programs),
            filter: MetadataFilter::new(&settings.denylist),
            settings,
        }
    }

    pub fn settings(&self) -> &DecoderSettings {
        &self.settings
    }

    pub fn log_text(&self) -> &LogTextDecoder {
        &self.log_text
    }

    /// Run the decoder chain
    ///
    /// The account decoders need a mint; without one only the log lines are
    /// consulted.
    pub async fn decode(
        &self,
        rpc: &dyn SolanaRpc,
        mint: Option<Pubkey>,
        logs: &[String],
    ) -> DecodeOutcome {
        if let Some(mint) = mint {
            if let Some(record) = self.decode_extension(rpc, &mint).await {
                return self.post_filter(record);
            }
            if let Some(record) = self.decode_legacy(rpc, &mint).await {
                return self.post_filter(record);
            }
        }

        match self.log_text.decode(logs, mint) {
            Some(record) if !record.is_thin() => self.post_filter(record),
            Some(record) => DecodeOutcome::Unresolved {
                mint: Some(record.mint),
            },
            None => DecodeOutcome::Unresolved { mint },
        }
    }

    pub async fn decode_extension(&self, rpc: &dyn SolanaRpc, mint: &Pubkey) -> Option<DecodedMint> {
        let account = self.fetch_account(rpc, mint, "mint_account").await?;
        extension::decode_mint_account(mint, &account.owner, &account.data, &self.settings.token_2022_program)
    }

    pub async fn decode_legacy(&self, rpc: &dyn SolanaRpc, mint: &Pubkey) -> Option<DecodedMint> {
        let address = legacy::metadata_address(mint, &self.settings.metadata_program);
        let account = self.fetch_account(rpc, &address, "metadata_account").await?;
        legacy::decode_metadata_account(mint, &account.data)
    }

    async fn fetch_account(
        &self,
        rpc: &dyn SolanaRpc,
        address: &Pubkey,
        operation: &str,
    ) -> Option<AccountData> {
        let result = retry_linear(operation, &self.settings.metadata_retry, |_| {
            rpc.get_account_info(address, Commitment::Confirmed)
        })
        .await;
        match result {
            Ok(account) => account,
            Err(e) => {
                debug!(%address, operation, error = %e, "Account read failed");
                None
            }
        }
    }

    fn post_filter(&self, record: DecodedMint) -> DecodeOutcome {
        match self.filter.accept(&record) {
            Ok(()) => {
                metrics()
                    .decodes
                    .with_label_values(&[record.source.as_str()])
                    .inc();
                DecodeOutcome::Decoded(record)
            }
            Err(reason) => {
                metrics()
                    .decode_rejects
                    .with_label_values(&[reason.as_label()])
                    .inc();
                debug!(mint = %record.mint, decoder = record.source.as_str(), %reason, "Metadata rejected");
                DecodeOutcome::Rejected {
                    mint: record.mint,
                    reason,
                }
            }
        }
    }

    /// Read bonding-curve reserves, alternating commitment from the weakest
    ///
    /// `None` means unavailable after all attempts, never zero reserves.
    pub async fn fetch_reserves(&self, rpc: &dyn SolanaRpc, mint: &Pubkey) -> Option<Reserves> {
        let launcher = self.settings.launcher_programs.first()?;
        let address = reserves::bonding_curve_address(mint, launcher);

        let result = retry_linear("bonding_curve", &self.settings.reserves_retry, |attempt| {
            let commitment = if attempt % 2 == 0 {
                Commitment::Processed
            } else {
                Commitment::Confirmed
            };
            let address = &address;
            async move {
                let account = rpc.get_account_info(address, commitment).await?;
                Ok::<_, RpcError>(account.and_then(|a| reserves::decode_reserves(&a.data)))
            }
        })
        .await;

        match result {
            Ok(Some(reserves)) => Some(reserves),
            Ok(None) => {
                metrics().reserves_unavailable.inc();
                None
            }
            Err(e) => {
                metrics().reserves_unavailable.inc();
                debug!(%mint, error = %e, "Bonding curve read failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DecoderKind;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::Value;
    use std::collections::HashMap;
    use std::time::Duration;

    #[derive(Default)]
    struct AccountsRpc {
        accounts: HashMap<Pubkey, AccountData>,
        commitments: Mutex<Vec<Commitment>>,
    }

    #[async_trait]
    impl SolanaRpc for AccountsRpc {
        async fn get_transaction(&self, _: &str, _: Commitment) -> Result<Option<Value>, RpcError> {
            Ok(None)
        }

        async fn get_account_info(
            &self,
            address: &Pubkey,
            commitment: Commitment,
        ) -> Result<Option<AccountData>, RpcError> {
            self.commitments.lock().push(commitment);
            Ok(self.accounts.get(address).cloned())
        }
    }

    fn quick_settings() -> DecoderSettings {
        DecoderSettings {
            metadata_retry: RetryPolicy::fixed(1, Duration::ZERO),
            reserves_retry: RetryPolicy::fixed(3, Duration::from_millis(10)),
            ..DecoderSettings::default()
        }
    }

    #[tokio::test]
    async fn test_extension_wins_over_legacy() {
        let mint = Pubkey::new_unique();
        let mut rpc = AccountsRpc::default();
        rpc.accounts.insert(
            mint,
            AccountData {
                owner: extension::TOKEN_2022_PROGRAM_ID,
                lamports: 1,
                data: extension::tests::mint_account_with_metadata(None, &mint, "Ext", "EXT", ""),
            },
        );
        rpc.accounts.insert(
            legacy::metadata_address(&mint, &legacy::METADATA_PROGRAM_ID),
            AccountData {
                owner: legacy::METADATA_PROGRAM_ID,
                lamports: 1,
                data: legacy::tests::metadata_account(&mint, "Leg", "LEG", ""),
            },
        );

        let decoder = MetadataDecoder::new(quick_settings());
        match decoder.decode(&rpc, Some(mint), &[]).await {
            DecodeOutcome::Decoded(record) => {
                assert_eq!(record.source, DecoderKind::Extension);
                assert_eq!(record.name.as_deref(), Some("Ext"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_falls_through_to_legacy() {
        let mint = Pubkey::new_unique();
        let mut rpc = AccountsRpc::default();
        rpc.accounts.insert(
            mint,
            AccountData {
                owner: solana_sdk::pubkey!("TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA"),
                lamports: 1,
                data: vec![0u8; 82],
            },
        );
        rpc.accounts.insert(
            legacy::metadata_address(&mint, &legacy::METADATA_PROGRAM_ID),
            AccountData {
                owner: legacy::METADATA_PROGRAM_ID,
                lamports: 1,
                data: legacy::tests::metadata_account(&mint, "Leg", "LEG", "https://x"),
            },
        );

        let decoder = MetadataDecoder::new(quick_settings());
        match decoder.decode(&rpc, Some(mint), &[]).await {
            DecodeOutcome::Decoded(record) => assert_eq!(record.source, DecoderKind::Legacy),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_post_filter_rejection_is_final() {
        let mint = Pubkey::new_unique();
        let mut rpc = AccountsRpc::default();
        rpc.accounts.insert(
            legacy::metadata_address(&mint, &legacy::METADATA_PROGRAM_ID),
            AccountData {
                owner: legacy::METADATA_PROGRAM_ID,
                lamports: 1,
                data: legacy::tests::metadata_account(&mint, "Rug Pull", "RUG", ""),
            },
        );
        let logs = vec!["Program log: name: Fine, symbol: FINE".to_string()];

        let decoder = MetadataDecoder::new(quick_settings());
        assert!(matches!(
            decoder.decode(&rpc, Some(mint), &logs).await,
            DecodeOutcome::Rejected { reason: RejectReason::Denylisted(_), .. }
        ));
    }

    #[tokio::test]
    async fn test_log_text_fallback_and_unresolved() {
        let mint = Pubkey::new_unique();
        let rpc = AccountsRpc::default();
        let decoder = MetadataDecoder::new(quick_settings());

        let logs = vec!["Program log: name: Fine, symbol: FINE".to_string()];
        match decoder.decode(&rpc, Some(mint), &logs).await {
            DecodeOutcome::Decoded(record) => {
                assert_eq!(record.source, DecoderKind::LogText);
                assert_eq!(record.mint, mint);
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        assert_eq!(
            decoder.decode(&rpc, Some(mint), &[]).await,
            DecodeOutcome::Unresolved { mint: Some(mint) }
        );
        assert_eq!(
            decoder.decode(&rpc, None, &[]).await,
            DecodeOutcome::Unresolved { mint: None }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_reserves_alternate_commitment_and_return_none() {
        let mint = Pubkey::new_unique();
        let rpc = AccountsRpc::default();
        let decoder = MetadataDecoder::new(quick_settings());

        assert_eq!(decoder.fetch_reserves(&rpc, &mint).await, None);
        assert_eq!(
            *rpc.commitments.lock(),
            vec![Commitment::Processed, Commitment::Confirmed, Commitment::Processed]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_reserves_decoded() {
        let mint = Pubkey::new_unique();
        let mut data = vec![0u8; 8];
        data.extend_from_slice(&500_000_000_000u64.to_le_bytes());
        data.extend_from_slice(&30_000_000_000u64.to_le_bytes());

        let mut rpc = AccountsRpc::default();
        rpc.accounts.insert(
            reserves::bonding_curve_address(&mint, &reserves::DEFAULT_LAUNCHER_PROGRAM_ID),
            AccountData {
                owner: reserves::DEFAULT_LAUNCHER_PROGRAM_ID,
                lamports: 1,
                data,
            },
        );

        let decoder = MetadataDecoder::new(quick_settings());
        let reserves = decoder.fetch_reserves(&rpc, &mint).await.unwrap();
        assert_eq!(reserves.virtual_token_reserves, 500_000.0);
        assert_eq!(reserves.virtual_sol_reserves, 30.0);
    }
}
