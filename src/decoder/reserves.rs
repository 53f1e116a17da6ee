//! Bonding-curve virtual reserves

use solana_sdk::pubkey::Pubkey;

use super::layout::ByteReader;
use crate::types::Reserves;

/// Default launcher program owning the bonding-curve accounts
pub const DEFAULT_LAUNCHER_PROGRAM_ID: Pubkey =
    solana_sdk::pubkey!("6EF8rrecthR5Dkzon8Nwu78hRvfCKubJ14M5uBEwF6P");

/// discriminator (8) + two u64 reserve fields
pub const MIN_ACCOUNT_LEN: usize = 24;

const TOKEN_DECIMALS: f64 = 1e6;
const LAMPORTS_PER_SOL: f64 = 1e9;

pub fn bonding_curve_address(mint: &Pubkey, launcher_program: &Pubkey) -> Pubkey {
    let (address, _bump) =
        Pubkey::find_program_address(&[b"bonding-curve", mint.as_ref()], launcher_program);
    address
}

/// Decode the two virtual reserve fields at offsets 8 and 16
pub fn decode_reserves(data: &[u8]) -> Option<Reserves> {
    if data.len() < MIN_ACCOUNT_LEN {
        return None;
    }
    let mut reader = ByteReader::at(data, 8)?;
    let token_raw = reader.read_u64_le()?;
    let sol_raw = reader.read_u64_le()?;
    Some(Reserves {
        virtual_token_reserves: token_raw as f64 / TOKEN_DECIMALS,
        virtual_sol_reserves: sol_raw as f64 / LAMPORTS_PER_SOL,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn curve_account(token_raw: u64, sol_raw: u64) -> Vec<u8> {
        let mut data = vec![0u8; 8];
        data.extend_from_slice(&token_raw.to_le_bytes());
        data.extend_from_slice(&sol_raw.to_le_bytes());
        data
    }

    #[test]
    fn test_decode_reference_bytes() {
        let data = curve_account(500_000_000_000, 30_000_000_000);
        let reserves = decode_reserves(&data).unwrap();
        assert_eq!(reserves.virtual_token_reserves, 500_000.0);
        assert_eq!(reserves.virtual_sol_reserves, 30.0);
    }

    #[test]
    fn test_zero_reserves_are_not_none() {
        let reserves = decode_reserves(&curve_account(0, 0)).unwrap();
        assert_eq!(reserves.virtual_token_reserves, 0.0);
    }

    #[test]
    fn test_short_account() {
        for len in 0..MIN_ACCOUNT_LEN {
            assert!(decode_reserves(&vec![0xff; len]).is_none());
        }
    }

    #[test]
    fn test_trailing_fields_ignored() {
        let mut data = curve_account(1_000_000, 1_000_000_000);
        data.extend_from_slice(&[9u8; 25]);
        let reserves = decode_reserves(&data).unwrap();
        assert_eq!(reserves.virtual_token_reserves, 1.0);
        assert_eq!(reserves.virtual_sol_reserves, 1.0);
    }
}
