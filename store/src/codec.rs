//! Conversions between in-memory domain types and the persisted layout named
//! in spec §6: lowercase 42-char hex addresses, decimal(78,0) amount strings,
//! UTC timestamps.

use droplets_common::error::StoreError;
use droplets_common::{Amount, AssetSymbol, ChainId, SignedAmount};
use ethers::types::{Address, H256, U256};
use std::str::FromStr;

pub fn addr_to_db(address: &Address) -> String {
    format!("{:#x}", address)
}

pub fn addr_from_db(s: &str) -> Result<Address, StoreError> {
    Address::from_str(s).map_err(|_| StoreError::Invariant(format!("bad address in db: {s}")))
}

pub fn h256_to_db(h: &H256) -> String {
    format!("{:#x}", h)
}

pub fn h256_from_db(s: &str) -> Result<H256, StoreError> {
    H256::from_str(s).map_err(|_| StoreError::Invariant(format!("bad hash in db: {s}")))
}

pub fn amount_to_db(amount: &Amount) -> String {
    amount.0.to_string()
}

pub fn amount_from_db(s: &str) -> Result<Amount, StoreError> {
    U256::from_dec_str(s)
        .map(Amount)
        .map_err(|_| StoreError::Invariant(format!("bad amount in db: {s}")))
}

pub fn signed_amount_to_db(amount: &SignedAmount) -> String {
    amount.0.to_string()
}

pub fn signed_amount_from_db(s: &str) -> Result<SignedAmount, StoreError> {
    use ethers::types::I256;
    I256::from_str(s)
        .map(SignedAmount)
        .map_err(|_| StoreError::Invariant(format!("bad signed amount in db: {s}")))
}

pub fn chain_id_to_db(chain_id: ChainId) -> i64 {
    chain_id.0 as i64
}

pub fn chain_id_from_db(v: i64) -> ChainId {
    ChainId(v as u64)
}

pub fn asset_to_db(asset: AssetSymbol) -> &'static str {
    asset.as_str()
}

pub fn asset_from_db(s: &str) -> Result<AssetSymbol, StoreError> {
    match s {
        "A_ETH" => Ok(AssetSymbol::AEth),
        "A_BTC" => Ok(AssetSymbol::ABtc),
        "A_USD" => Ok(AssetSymbol::AUsd),
        "A_EUR" => Ok(AssetSymbol::AEur),
        other => Err(StoreError::Invariant(format!("unknown asset in db: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_roundtrips_lowercase() {
        let addr = Address::from_low_u64_be(0xabc);
        let s = addr_to_db(&addr);
        assert_eq!(s, s.to_lowercase());
        assert_eq!(addr_from_db(&s).unwrap(), addr);
    }

    #[test]
    fn asset_roundtrips() {
        for asset in AssetSymbol::ALL {
            assert_eq!(asset_from_db(asset_to_db(asset)).unwrap(), asset);
        }
    }

    #[test]
    fn amount_roundtrips_large_values() {
        let amount = Amount(U256::MAX);
        let s = amount_to_db(&amount);
        assert_eq!(amount_from_db(&s).unwrap(), amount);
    }
}
