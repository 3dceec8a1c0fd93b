//! Holder discovery for C9: every protocol's LP/vault/market token emits a
//! plain ERC-20 `Transfer` when a user's position changes, same as the vault
//! share token itself (§4.7: "User LP holders are tracked via Transfer
//! events on the pair token"). Rather than pull in `droplets-ingest`
//! (which already owns that signature for the vault's own Transfer stream
//! and would create a dependency cycle back through `droplets-balances`),
//! this module decodes just the one event it needs directly.

use droplets_chain::transport::RawLog;
use droplets_common::error::StoreError;
use droplets_common::model::ProtocolId;
use droplets_store::Db;
use ethers::types::{Address, H256};
use ethers::utils::keccak256;

fn transfer_topic0() -> H256 {
    H256::from(keccak256("Transfer(address,address,uint256)".as_bytes()))
}

fn address_from_topic(topic: &H256) -> Address {
    Address::from_slice(&topic.as_bytes()[12..])
}

/// Records both sides of a `Transfer` log on a protocol's token as known
/// holders, so a later `positionsAt(block)` sweep finds them even once
/// their balance has dropped to zero (the zero-balance case is simply
/// skipped at sweep time by each adapter's `position_for_holder`).
pub async fn record_transfer(db: &Db, protocol_id: &ProtocolId, log: &RawLog) -> Result<(), StoreError> {
    if log.topics.first() != Some(&transfer_topic0()) || log.topics.len() < 3 {
        return Ok(());
    }
    let from = address_from_topic(&log.topics[1]);
    let to = address_from_topic(&log.topics[2]);

    if from != Address::zero() {
        droplets_store::integrations::record_holder(db, protocol_id, from, log.block_number).await?;
    }
    if to != Address::zero() {
        droplets_store::integrations::record_holder(db, protocol_id, to, log.block_number).await?;
    }
    Ok(())
}

/// Decodes nothing beyond topics; present for symmetry with the vault-side
/// decoder and to document that this module never needs the `value` field
/// (holder discovery only cares who touched the token, not by how much).
pub fn is_transfer_log(log: &RawLog) -> bool {
    log.topics.first() == Some(&transfer_topic0())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::Bytes;

    fn topic_addr(n: u64) -> H256 {
        let addr = Address::from_low_u64_be(n);
        let mut bytes = [0u8; 32];
        bytes[12..].copy_from_slice(addr.as_bytes());
        H256(bytes)
    }

    fn transfer_log(from: u64, to: u64) -> RawLog {
        RawLog {
            address: Address::zero(),
            topics: vec![transfer_topic0(), topic_addr(from), topic_addr(to)],
            data: Bytes::default(),
            block_number: 10,
            transaction_hash: H256::zero(),
            transaction_index: 0,
            log_index: 0,
        }
    }

    #[test]
    fn recognizes_transfer_topic() {
        assert!(is_transfer_log(&transfer_log(1, 2)));
        let mut other = transfer_log(1, 2);
        other.topics[0] = H256::random();
        assert!(!is_transfer_log(&other));
    }
}
