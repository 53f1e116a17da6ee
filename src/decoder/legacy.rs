//! Legacy metadata program account decoder

use solana_sdk::pubkey::Pubkey;

use super::layout::{ByteReader, FieldLimits};
use crate::types::{DecodedMint, DecoderKind};

pub const METADATA_PROGRAM_ID: Pubkey =
    solana_sdk::pubkey!("metaqbxxUerdq28cj1RbAWkYQm3ybzjb6a8bt518x1s");

/// key (1) + update authority (32) + mint (32)
pub const HEADER_LEN: usize = 1 + 32 + 32;

/// Program-derived address of the metadata account for `mint`
pub fn metadata_address(mint: &Pubkey, metadata_program: &Pubkey) -> Pubkey {
    let (address, _bump) = Pubkey::find_program_address(
        &[b"metadata", metadata_program.as_ref(), mint.as_ref()],
        metadata_program,
    );
    address
}

/// Decode name, symbol and uri from a metadata account
///
/// Fields are stored in fixed-size padded buffers, so trailing NUL padding and
/// whitespace are dropped. Leading whitespace is kept. Bytes after the uri are not read.
pub fn decode_metadata_account(mint: &Pubkey, data: &[u8]) -> Option<DecodedMint> {
    let mut reader = ByteReader::at(data, HEADER_LEN)?;
    let name = trim_padding(reader.read_prefixed_str(FieldLimits::LEGACY.name)?);
    let symbol = trim_padding(reader.read_prefixed_str(FieldLimits::LEGACY.symbol)?);
    let uri = trim_padding(reader.read_prefixed_str(FieldLimits::LEGACY.uri)?);

    if name.is_empty() || symbol.is_empty() {
        return None;
    }

    Some(DecodedMint {
        mint: *mint,
        name: Some(name.to_string()),
        symbol: Some(symbol.to_string()),
        uri: (!uri.is_empty()).then(|| uri.to_string()),
        source: DecoderKind::Legacy,
    })
}

fn trim_padding(value: &str) -> &str {
    value.trim_end_matches('\0').trim_end()
}
