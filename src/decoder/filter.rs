//! Post-filter shared by all metadata decoders

use thiserror::Error;

use crate::types::DecodedMint;

/// Substrings that mark a launch as not worth scoring
pub const DEFAULT_DENYLIST: &[&str] = &["test", "scam", "rug", "honeypot", "airdrop"];

/// Why a decoded record was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectReason {
    #[error("empty name")]
    EmptyName,

    #[error("empty symbol")]
    EmptySymbol,

    #[error("denylisted substring '{0}'")]
    Denylisted(String),

    #[error("name or symbol is entirely CJK ideographs")]
    NonLatinScript,
}

impl RejectReason {
    /// Short label for metrics
    pub fn as_label(&self) -> &'static str {
        match self {
            RejectReason::EmptyName => "empty_name",
            RejectReason::EmptySymbol => "empty_symbol",
            RejectReason::Denylisted(_) => "denylisted",
            RejectReason::NonLatinScript => "non_latin",
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetadataFilter {
    /// Lowercased
    denylist: Vec<String>,
}

impl Default for MetadataFilter {
    fn default() -> Self {
        Self::new(DEFAULT_DENYLIST.iter().map(|s| s.to_string()))
    }
}

impl MetadataFilter {
    pub fn new<I, S>(denylist: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            denylist: denylist
                .into_iter()
                .map(|s| s.as_ref().trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    /// Accept or reject a decoded record; name and symbol are checked trimmed
    pub fn accept(&self, record: &DecodedMint) -> Result<(), RejectReason> {
        let name = record.name.as_deref().map(str::trim).unwrap_or_default();
        let symbol = record.symbol.as_deref().map(str::trim).unwrap_or_default();

        if name.is_empty() {
            return Err(RejectReason::EmptyName);
        }
        if symbol.is_empty() {
            return Err(RejectReason::EmptySymbol);
        }

        let lowered_name = name.to_lowercase();
        let lowered_symbol = symbol.to_lowercase();
        if let Some(hit) = self
            .denylist
            .iter()
            .find(|bad| lowered_name.contains(bad.as_str()) || lowered_symbol.contains(bad.as_str()))
        {
            return Err(RejectReason::Denylisted(hit.clone()));
        }

        if is_all_cjk(name) || is_all_cjk(symbol) {
            return Err(RejectReason::NonLatinScript);
        }
        Ok(())
    }
}

/// True when every non-whitespace char is a CJK Unified Ideograph
fn is_all_cjk(value: &str) -> bool {
    let mut chars = value.chars().filter(|c| !c.is_whitespace()).peekable();
    chars.peek().is_some() && chars.all(|c| ('\u{4E00}'..='\u{9FFF}').contains(&c))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DecoderKind;
    use solana_sdk::pubkey::Pubkey;

    fn record(name: &str, symbol: &str) -> DecodedMint {
        DecodedMint {
            mint: Pubkey::new_unique(),
            name: Some(name.to_string()),
            symbol: Some(symbol.to_string()),
            uri: None,
            source: DecoderKind::Extension,
        }
    }

    #[test]
    fn test_accepts_ordinary_names() {
        let filter = MetadataFilter::default();
        assert!(filter.accept(&record("Moon Cat", "MCAT")).is_ok());
        // Mixed script is fine
        assert!(filter.accept(&record("Moon 猫", "MCAT")).is_ok());
    }

    #[test]
    fn test_rejects_empty_fields() {
        let filter = MetadataFilter::default();
        assert_eq!(filter.accept(&record("  ", "X")), Err(RejectReason::EmptyName));
        assert_eq!(filter.accept(&record("X", "")), Err(RejectReason::EmptySymbol));

        let mut missing = record("X", "X");
        missing.symbol = None;
        assert_eq!(filter.accept(&missing), Err(RejectReason::EmptySymbol));
    }

    #[test]
    fn test_denylist_case_insensitive() {
        let filter = MetadataFilter::default();
        assert_eq!(
            filter.accept(&record("Definitely Not A RUG", "SAFE")),
            Err(RejectReason::Denylisted("rug".to_string()))
        );
        let custom = MetadataFilter::new(["Pepe"]);
        assert!(custom.accept(&record("pepe2", "P2")).is_err());
        assert!(custom.accept(&record("Test", "T")).is_ok());
    }

    #[test]
    fn test_rejects_all_cjk() {
        let filter = MetadataFilter::default();
        assert_eq!(
            filter.accept(&record("中文 代币", "ABC")),
            Err(RejectReason::NonLatinScript)
        );
        assert_eq!(
            filter.accept(&record("Token", "代币")),
            Err(RejectReason::NonLatinScript)
        );
    }
}
