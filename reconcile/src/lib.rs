//! C12: transfer <-> integration-event reconciliation. Cross-checks every
//! canonical `integration_in`/`integration_out` leg the ingester (C5) wrote
//! against the integration-protocol's own event for the same contract and
//! block range, using the per-kind matching rules in [`matching`].
//!
//! The validator never mutates canonical tables (§4.10) — it is a read-only
//! cross-check, callable ad hoc from the `validate` CLI subcommand or on a
//! schedule, and its output is a report, not a write.

pub mod decode;
pub mod matching;
pub mod signatures;

pub use decode::{decode_integration_log, DecodeError, IntegrationEvent, IntegrationEventKind};
pub use matching::{reconcile, MatchOutcome, MatchStrategy, MatchedPair};

use droplets_chain::transport::{ChainTransport, LogFilter};
use droplets_common::model::IntegrationContractConfig;
use droplets_common::RpcError;
use droplets_store::Db;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error(transparent)]
    Store(#[from] droplets_common::StoreError),

    #[error("malformed integration log: {0}")]
    Decode(#[from] DecodeError),
}

/// Topic0 set a contract of `kind` can emit that C12 cares about. Passed to
/// `eth_getLogs` as an OR filter (ethers encodes a single-position list as an
/// "any of" match) rather than fetching every log the contract ever emits.
fn topics_for(kind: droplets_common::model::IntegrationKind) -> Vec<ethers::types::H256> {
    use droplets_common::model::IntegrationKind::*;
    match kind {
        Erc4626 => vec![signatures::ERC4626_DEPOSIT, signatures::ERC4626_WITHDRAW],
        LendingCToken => vec![signatures::CTOKEN_MINT, signatures::CTOKEN_REDEEM],
        LendingAToken => vec![signatures::ATOKEN_SUPPLY, signatures::ATOKEN_WITHDRAW],
        AmmLp => vec![signatures::LP_MINT, signatures::LP_BURN],
    }
}

/// Runs one reconciliation pass for one integration contract over
/// `[from_block, to_block]`: pulls its canonical vault-side legs from the
/// store, fetches and decodes its own events over the transport, and
/// delegates to [`matching::reconcile`].
pub async fn reconcile_contract(
    db: &Db,
    transport: Arc<dyn ChainTransport>,
    contract: &IntegrationContractConfig,
    from_block: u64,
    to_block: u64,
) -> Result<MatchOutcome, ReconcileError> {
    let legs = droplets_store::events::integration_legs_in_range(
        db,
        contract.chain_id,
        from_block,
        to_block,
    )
    .await?;

    let raw_logs = transport
        .get_logs(LogFilter {
            address: contract.contract_address,
            from_block,
            to_block,
            topics: topics_for(contract.kind),
        })
        .await?;

    let mut events = Vec::with_capacity(raw_logs.len());
    for log in &raw_logs {
        if let Some(event) = decode_integration_log(log, contract.kind)? {
            events.push(event);
        }
    }

    Ok(reconcile(contract.kind, legs, events))
}

#[cfg(test)]
mod tests {
    use super::*;
    use droplets_common::model::IntegrationKind;

    #[test]
    fn topics_for_each_kind_are_non_empty_and_distinct_by_pair() {
        for kind in [
            IntegrationKind::Erc4626,
            IntegrationKind::LendingCToken,
            IntegrationKind::LendingAToken,
            IntegrationKind::AmmLp,
        ] {
            assert_eq!(topics_for(kind).len(), 2);
        }
    }
}
