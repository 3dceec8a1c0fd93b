//! Static topology: Chain-E plus its five satellites (§1, §2). The spec
//! deliberately keeps "arbitrary user-defined... chains without config
//! changes" a non-goal, so this table — not an env var — is the single
//! place that names which chains exist; everything else about a chain
//! (confirmations, batch size, RPC base URL, per-asset contract addresses)
//! still comes from the environment per §6.

use droplets_common::{AssetSymbol, ChainId};

/// One entry per chain this engine tracks. `env_name` is the token used in
/// `ALCHEMY_{CHAIN}_BASE_URL`, `{ASSET}_OFT_{CHAIN}` and `{CHAIN}_CONFIRMATIONS`.
pub struct ChainDef {
    pub env_name: &'static str,
    pub chain_id: u64,
    pub is_canonical: bool,
}

/// Chain-E (canonical) is the mainnet deployment; the five satellites are
/// the OFT destinations named in §1.
pub const CHAINS: &[ChainDef] = &[
    ChainDef { env_name: "ETH", chain_id: 1, is_canonical: true },
    ChainDef { env_name: "ARBITRUM", chain_id: 42161, is_canonical: false },
    ChainDef { env_name: "OPTIMISM", chain_id: 10, is_canonical: false },
    ChainDef { env_name: "BASE", chain_id: 8453, is_canonical: false },
    ChainDef { env_name: "BNB", chain_id: 56, is_canonical: false },
    ChainDef { env_name: "AVALANCHE", chain_id: 43114, is_canonical: false },
];

pub fn canonical() -> &'static ChainDef {
    CHAINS.iter().find(|c| c.is_canonical).expect("exactly one canonical chain is defined")
}

pub fn chain_id_of(env_name: &str) -> ChainId {
    CHAINS
        .iter()
        .find(|c| c.env_name == env_name)
        .map(|c| ChainId(c.chain_id))
        .unwrap_or_else(|| panic!("unknown chain env_name {env_name}"))
}

/// On-chain decimals for each asset's own token/share representation.
/// A_BTC mirrors WBTC's 8; the others are the usual 18/6/6 split between an
/// ETH-denominated vault and the two stable-pegged ones.
pub fn decimals_for(asset: AssetSymbol) -> u8 {
    match asset {
        AssetSymbol::AEth => 18,
        AssetSymbol::ABtc => 8,
        AssetSymbol::AUsd => 6,
        AssetSymbol::AEur => 6,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exactly_one_canonical_chain() {
        assert_eq!(CHAINS.iter().filter(|c| c.is_canonical).count(), 1);
        assert_eq!(canonical().env_name, "ETH");
    }

    #[test]
    fn six_chains_total() {
        assert_eq!(CHAINS.len(), 6);
    }
}
