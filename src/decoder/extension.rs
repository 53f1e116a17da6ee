//! Token-extension mint metadata (TLV walk over the mint account)

use solana_sdk::pubkey::Pubkey;

use super::layout::{ByteReader, FieldLimits, MetadataStrings};
use crate::types::{DecodedMint, DecoderKind};

/// Token-extension program that owns extended mints
pub const TOKEN_2022_PROGRAM_ID: Pubkey =
    solana_sdk::pubkey!("TokenzQdBNbLqP5VEhdkAbS8bqo2Y3yUVVwmLh7Ap5d");

/// Base region padded to token-account size, shared by mints and accounts
pub const BASE_ACCOUNT_LEN: usize = 165;

/// TLV entries start after the base region and the account-type byte
pub const TLV_START: usize = BASE_ACCOUNT_LEN + 1;

/// Extension type tag for the embedded token metadata
pub const TOKEN_METADATA_EXTENSION: u16 = 19;

/// Parsed metadata extension value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataExtension {
    pub update_authority: Option<Pubkey>,
    pub mint: Pubkey,
    pub strings: MetadataStrings,
}

/// Locate the value of extension `ext_type` in a mint account
///
/// A zero type tag marks uninitialized space and ends the walk.
pub fn find_extension(data: &[u8], ext_type: u16) -> Option<&[u8]> {
    let mut reader = ByteReader::at(data, TLV_START)?;
    while reader.remaining() >= 4 {
        let entry_type = reader.read_u16_le()?;
        let len = reader.read_u16_le()? as usize;
        if entry_type == 0 {
            return None;
        }
        let value = reader.read_bytes(len)?;
        if entry_type == ext_type {
            return Some(value);
        }
    }
    None
}

/// Decode a metadata extension value
///
/// The flagged layout (1-byte presence flag before the authority) is tried
/// first; the fixed 32-byte authority layout, where all-zero means none, is
/// the fallback.
pub fn decode_metadata_value(value: &[u8]) -> Option<MetadataExtension> {
    decode_flagged(value).or_else(|| decode_fixed(value))
}

fn decode_flagged(value: &[u8]) -> Option<MetadataExtension> {
    let mut reader = ByteReader::new(value);
    let update_authority = match reader.read_u8()? {
        0 => None,
        1 => Some(reader.read_pubkey()?),
        _ => return None,
    };
    read_body(&mut reader, update_authority)
}

fn decode_fixed(value: &[u8]) -> Option<MetadataExtension> {
    let mut reader = ByteReader::new(value);
    let authority = reader.read_pubkey()?;
    let update_authority = (authority != Pubkey::default()).then_some(authority);
    read_body(&mut reader, update_authority)
}

fn read_body(reader: &mut ByteReader<'_>, update_authority: Option<Pubkey>) -> Option<MetadataExtension> {
    let mint = reader.read_pubkey()?;
    let strings = reader.read_metadata_strings(FieldLimits::UNBOUNDED)?;
    Some(MetadataExtension {
        update_authority,
        mint,
        strings,
    })
}

/// Decode metadata from a mint account owned by the token-extension program
///
/// Returns `None` for any other owner or any malformed layout so the caller
/// falls through to the next decoder.
pub fn decode_mint_account(
    mint: &Pubkey,
    owner: &Pubkey,
    data: &[u8],
    token_2022_program: &Pubkey,
) -> Option<DecodedMint> {
    if owner != token_2022_program {
        return None;
    }
    let value = find_extension(data, TOKEN_METADATA_EXTENSION)?;
    let ext = decode_metadata_value(value)?;
    Some(DecodedMint {
        mint: *mint,
        name: Some(ext.strings.name),
        symbol: Some(ext.strings.symbol),
        uri: ext.strings.uri,
        source: DecoderKind::Extension,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::decoder::layout::encode_metadata_strings;

    /// Build a mint account carrying a flagged metadata extension
    pub(crate) fn mint_account_with_metadata(
        authority: Option<Pubkey>,
        mint: &Pubkey,
        name: &str,
        symbol: &str,
        uri: &str,
    ) -> Vec<u8> {
        let mut value = Vec::new();
        match authority {
            Some(key) => {
                value.push(1);
                value.extend_from_slice(key.as_ref());
            }
            None => value.push(0),
        }
        value.extend_from_slice(mint.as_ref());
        value.extend_from_slice(&encode_metadata_strings(name, symbol, uri));

        let mut data = vec![0u8; BASE_ACCOUNT_LEN];
        data.push(1); // account type: mint
        // An unrelated extension first, to exercise the walk
        data.extend_from_slice(&18u16.to_le_bytes());
        data.extend_from_slice(&64u16.to_le_bytes());
        data.extend_from_slice(&[7u8; 64]);
        data.extend_from_slice(&TOKEN_METADATA_EXTENSION.to_le_bytes());
        data.extend_from_slice(&(value.len() as u16).to_le_bytes());
        data.extend_from_slice(&value);
        data
    }

    #[test]
    fn test_decode_flagged_metadata() {
        let mint = Pubkey::new_unique();
        let authority = Pubkey::new_unique();
        let data = mint_account_with_metadata(Some(authority), &mint, "Foo", "FOO", "https://x/foo.json");

        let decoded = decode_mint_account(&mint, &TOKEN_2022_PROGRAM_ID, &data, &TOKEN_2022_PROGRAM_ID).unwrap();
        assert_eq!(decoded.name.as_deref(), Some("Foo"));
        assert_eq!(decoded.symbol.as_deref(), Some("FOO"));
        assert_eq!(decoded.uri.as_deref(), Some("https://x/foo.json"));
        assert_eq!(decoded.source, DecoderKind::Extension);

        let value = find_extension(&data, TOKEN_METADATA_EXTENSION).unwrap();
        let ext = decode_metadata_value(value).unwrap();
        assert_eq!(ext.update_authority, Some(authority));
        assert_eq!(ext.mint, mint);
    }

    #[test]
    fn test_decode_fixed_authority_layout() {
        let mint = Pubkey::new_unique();
        let authority = Pubkey::new_unique();
        let mut value = authority.to_bytes().to_vec();
        value.extend_from_slice(mint.as_ref());
        value.extend_from_slice(&encode_metadata_strings("Bar", "BAR", ""));

        let ext = decode_metadata_value(&value).unwrap();
        assert_eq!(ext.update_authority, Some(authority));
        assert_eq!(ext.strings.name, "Bar");
        assert_eq!(ext.strings.uri, None);
    }

    #[test]
    fn test_wrong_owner_falls_through() {
        let mint = Pubkey::new_unique();
        let data = mint_account_with_metadata(None, &mint, "Foo", "FOO", "");
        let legacy_token = solana_sdk::pubkey!("TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA");
        assert!(decode_mint_account(&mint, &legacy_token, &data, &TOKEN_2022_PROGRAM_ID).is_none());
    }

    #[test]
    fn test_short_buffers_return_none() {
        let mint = Pubkey::new_unique();
        let data = mint_account_with_metadata(None, &mint, "Foo", "FOO", "uri");
        for len in 0..data.len() {
            assert!(
                decode_mint_account(&mint, &TOKEN_2022_PROGRAM_ID, &data[..len], &TOKEN_2022_PROGRAM_ID).is_none(),
                "truncated at {} should not decode",
                len
            );
        }
    }

    #[test]
    fn test_tlv_length_past_buffer_aborts() {
        let mut data = vec![0u8; TLV_START];
        data.extend_from_slice(&TOKEN_METADATA_EXTENSION.to_le_bytes());
        data.extend_from_slice(&u16::MAX.to_le_bytes());
        data.extend_from_slice(&[1u8; 16]);
        assert!(find_extension(&data, TOKEN_METADATA_EXTENSION).is_none());
    }

    #[test]
    fn test_long_fields_round_trip() {
        let mint = Pubkey::new_unique();
        let name = "N".repeat(300);
        let uri = format!("https://example.com/{}", "u".repeat(1090));
        let data = mint_account_with_metadata(None, &mint, &name, "SYM", &uri);

        let decoded = decode_mint_account(&mint, &TOKEN_2022_PROGRAM_ID, &data, &TOKEN_2022_PROGRAM_ID).unwrap();
        assert_eq!(decoded.name.as_deref(), Some(name.as_str()));
        assert_eq!(decoded.symbol.as_deref(), Some("SYM"));
        assert_eq!(decoded.uri.as_deref(), Some(uri.as_str()));
    }
}
