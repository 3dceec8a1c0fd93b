//! C2: per-chain metadata — id, confirmations, batch size, vault/OFT
//! addresses, deployment blocks, oracle feeds.

use droplets_common::{is_statically_excluded, AssetConfig, AssetSymbol, Chain, ChainId};
use ethers::types::Address;
use std::collections::{HashMap, HashSet};

pub struct ChainRegistry {
    chains: HashMap<ChainId, Chain>,
    canonical: ChainId,
    assets: Vec<AssetConfig>,
    excluded: HashSet<Address>,
}

impl ChainRegistry {
    pub fn new(chains: Vec<Chain>, assets: Vec<AssetConfig>) -> Self {
        let canonical = chains
            .iter()
            .find(|c| c.is_canonical)
            .map(|c| c.chain_id)
            .expect("chain registry must designate exactly one canonical chain");

        let mut excluded: HashSet<Address> = assets.iter().map(|a| a.contract_address).collect();
        // Vault contracts and OFT contracts never earn droplets themselves.
        excluded.insert(Address::zero());

        ChainRegistry {
            chains: chains.into_iter().map(|c| (c.chain_id, c)).collect(),
            canonical,
            assets,
            excluded,
        }
    }

    pub fn canonical_chain_id(&self) -> ChainId {
        self.canonical
    }

    pub fn is_canonical(&self, chain_id: ChainId) -> bool {
        chain_id == self.canonical
    }

    pub fn chain(&self, chain_id: ChainId) -> Option<&Chain> {
        self.chains.get(&chain_id)
    }

    pub fn chains(&self) -> impl Iterator<Item = &Chain> {
        self.chains.values()
    }

    pub fn asset_config(&self, asset: AssetSymbol, chain_id: ChainId) -> Option<&AssetConfig> {
        self.assets.iter().find(|a| a.asset == asset && a.chain_id == chain_id)
    }

    pub fn assets_for_chain(&self, chain_id: ChainId) -> impl Iterator<Item = &AssetConfig> {
        self.assets.iter().filter(move |a| a.chain_id == chain_id)
    }

    pub fn contracts_to_track(&self) -> impl Iterator<Item = &AssetConfig> {
        self.assets.iter()
    }

    /// §3 `ExcludedAddress`: vault/OFT contracts, zero address, and (once
    /// integration adapters register themselves) integration contracts.
    pub fn is_excluded(&self, address: Address) -> bool {
        is_statically_excluded(address) || self.excluded.contains(&address)
    }

    pub fn register_excluded(&mut self, address: Address) {
        self.excluded.insert(address);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(id: u64, canonical: bool) -> Chain {
        Chain {
            chain_id: ChainId(id),
            name: format!("chain-{id}"),
            is_canonical: canonical,
            confirmations: 12,
            batch_size: 500,
            poll_interval_secs: 10,
        }
    }

    fn asset(chain_id: u64, addr: u64) -> AssetConfig {
        AssetConfig {
            asset: AssetSymbol::AEth,
            chain_id: ChainId(chain_id),
            decimals: 18,
            oracle_feed: Address::zero(),
            contract_address: Address::from_low_u64_be(addr),
            deploy_block: 0,
            is_oft: chain_id != 1,
        }
    }

    #[test]
    fn vault_and_oft_contracts_are_excluded() {
        let registry = ChainRegistry::new(
            vec![chain(1, true), chain(2, false)],
            vec![asset(1, 100), asset(2, 200)],
        );
        assert!(registry.is_excluded(Address::from_low_u64_be(100)));
        assert!(registry.is_excluded(Address::from_low_u64_be(200)));
        assert!(!registry.is_excluded(Address::from_low_u64_be(999)));
    }

    #[test]
    fn canonical_chain_is_discoverable() {
        let registry = ChainRegistry::new(vec![chain(1, true), chain(2, false)], vec![]);
        assert_eq!(registry.canonical_chain_id(), ChainId(1));
        assert!(registry.is_canonical(ChainId(1)));
        assert!(!registry.is_canonical(ChainId(2)));
    }

    #[test]
    #[should_panic(expected = "canonical")]
    fn requires_exactly_one_canonical_chain() {
        ChainRegistry::new(vec![chain(1, false), chain(2, false)], vec![]);
    }
}
