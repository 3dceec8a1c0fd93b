//! Bridges a decoded [`RawEvent`] (plus the classifier, for `Transfer`) into
//! the zero-or-more canonical [`ShareEvent`] rows it produces, each tagged
//! with whether the Balance Folder (C6) should fold it into `CurrentBalance`.
//!
//! Stake and InstantUnstake are recorded for history but never folded: a
//! `Stake` only queues a pending deposit (no shares exist yet to hold), and
//! `InstantUnstake` cancels that same pending deposit before it was ever
//! credited. Only `Redeem` (the share mint) and `Unstake` (a real debit)
//! change `CurrentBalance`, matching §4.3's "Redeem emits share mint; Unstake
//! emits negative shares; InstantUnstake cancels a pending stake" — nothing
//! in that sentence says InstantUnstake undoes a balance, only a queue entry.

use crate::classify::{classify_transfer, ClassifyContext};
use crate::decode::RawEvent;
use chrono::{DateTime, Utc};
use droplets_common::model::{Classification, EventType, ShareEvent};
use droplets_common::{AssetSymbol, ChainId, SignedAmount};
use ethers::types::{H256, U256};

pub struct TranslatedEvent {
    pub share_event: ShareEvent,
    pub apply_to_balance: bool,
}

#[allow(clippy::too_many_arguments)]
pub fn translate(
    raw: &RawEvent,
    ctx: &ClassifyContext,
    chain_id: ChainId,
    asset: AssetSymbol,
    tx_hash: H256,
    log_index: u64,
    block: u64,
    timestamp: DateTime<Utc>,
    round_id: Option<u64>,
) -> Vec<TranslatedEvent> {
    let mk = |address, event_type, delta: U256, negative: bool, classification, apply: bool| TranslatedEvent {
        share_event: ShareEvent {
            chain_id,
            tx_hash,
            log_index,
            address,
            asset,
            event_type,
            shares_delta: if negative {
                SignedAmount::negative(droplets_common::Amount(delta))
            } else {
                SignedAmount::positive(droplets_common::Amount(delta))
            },
            block,
            timestamp,
            round_id,
            classification,
        },
        apply_to_balance: apply,
    };

    match raw {
        RawEvent::Transfer(t) => classify_transfer(t.from, t.to, ctx)
            .into_iter()
            .map(|leg| {
                let event_type = match leg.classification {
                    Classification::BridgeBurn => EventType::BridgeOut,
                    Classification::BridgeMint => EventType::BridgeIn,
                    _ => EventType::Transfer,
                };
                mk(leg.address, event_type, t.value, !leg.credits, leg.classification, true)
            })
            .collect(),

        RawEvent::Stake(s) => vec![mk(s.user, EventType::Stake, s.amount, false, Classification::Mint, false)],

        RawEvent::Redeem(s) => vec![mk(s.user, EventType::Redeem, s.amount, false, Classification::Mint, true)],

        RawEvent::Unstake(s) => {
            vec![mk(s.user, EventType::Unstake, s.amount, true, Classification::BurnUnstake, true)]
        }

        RawEvent::InstantUnstake(s) => {
            vec![mk(s.user, EventType::InstantUnstake, s.amount, true, Classification::BurnUnstake, false)]
        }

        // RoundRolled and the OFT marker events carry no per-address share
        // delta of their own; RoundRolled is handled separately by the round
        // store, and OFT events only matter here as the same-tx signal the
        // classifier already consumed via `ctx.oft_event_in_same_tx`.
        RawEvent::RoundRolled(_) | RawEvent::OftSent(_) | RawEvent::OftReceived(_) => vec![],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::StakeLikeLog;
    use ethers::types::Address;

    fn ctx() -> ClassifyContext<'static> {
        ClassifyContext {
            contract_address: Address::zero(),
            is_canonical_chain: true,
            oft_event_in_same_tx: false,
            integration_addresses: &[],
        }
    }

    #[test]
    fn redeem_folds_as_mint() {
        let raw = RawEvent::Redeem(StakeLikeLog { user: Address::from_low_u64_be(1), amount: U256::from(5), round_id: 2 });
        let events = translate(&raw, &ctx(), ChainId(1), AssetSymbol::AEth, H256::zero(), 0, 10, Utc::now(), Some(2));
        assert_eq!(events.len(), 1);
        assert!(events[0].apply_to_balance);
        assert_eq!(events[0].share_event.classification, Classification::Mint);
        assert!(!events[0].share_event.shares_delta.is_negative());
    }

    #[test]
    fn stake_is_recorded_but_not_folded() {
        let raw = RawEvent::Stake(StakeLikeLog { user: Address::from_low_u64_be(1), amount: U256::from(5), round_id: 2 });
        let events = translate(&raw, &ctx(), ChainId(1), AssetSymbol::AEth, H256::zero(), 0, 10, Utc::now(), Some(2));
        assert_eq!(events.len(), 1);
        assert!(!events[0].apply_to_balance);
    }

    #[test]
    fn instant_unstake_is_recorded_but_not_folded() {
        let raw = RawEvent::InstantUnstake(StakeLikeLog { user: Address::from_low_u64_be(1), amount: U256::from(5), round_id: 2 });
        let events = translate(&raw, &ctx(), ChainId(1), AssetSymbol::AEth, H256::zero(), 0, 10, Utc::now(), Some(2));
        assert_eq!(events.len(), 1);
        assert!(!events[0].apply_to_balance);
    }

    #[test]
    fn unstake_folds_as_negative_burn() {
        let raw = RawEvent::Unstake(StakeLikeLog { user: Address::from_low_u64_be(1), amount: U256::from(5), round_id: 2 });
        let events = translate(&raw, &ctx(), ChainId(1), AssetSymbol::AEth, H256::zero(), 0, 10, Utc::now(), Some(2));
        assert!(events[0].apply_to_balance);
        assert!(events[0].share_event.shares_delta.is_negative());
        assert_eq!(events[0].share_event.classification, Classification::BurnUnstake);
    }

    #[test]
    fn round_rolled_produces_no_share_events() {
        let raw = RawEvent::RoundRolled(crate::decode::RoundRolledLog {
            round_id: 1,
            pps: U256::from(1),
            shares_minted: U256::zero(),
            wrapped_minted: U256::zero(),
            wrapped_burned: U256::zero(),
            yield_amount: ethers::types::I256::zero(),
            is_yield_positive: true,
        });
        let events = translate(&raw, &ctx(), ChainId(1), AssetSymbol::AEth, H256::zero(), 0, 10, Utc::now(), None);
        assert!(events.is_empty());
    }
}
