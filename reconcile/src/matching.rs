//! §4.10 matching rules: pairs each canonical `integration_in`/`integration_out`
//! leg against a decoded integration-protocol event for the same contract.
//!
//! Every protocol's events carry slightly different guarantees about what can
//! be trusted to line up with the vault-side leg, so each [`IntegrationKind`]
//! picks its own [`MatchStrategy`] rather than one rule serving all four.

use crate::decode::{IntegrationEvent, IntegrationEventKind};
use droplets_common::model::{Classification, IntegrationKind, ShareEvent};
use ethers::types::{H256, U256};
use std::collections::HashMap;

/// How a vault-side leg is paired against a decoded integration event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStrategy {
    /// Pair on (address, asset, amount) within the contract's event set for
    /// the range — the default. Holds whenever the protocol's own event
    /// reliably names the end account and the vault-asset amount.
    AddressAssetAmount,
    /// Pair on (tx_hash, amount) only — used when the protocol's address
    /// field can be a router/zap proxy rather than the account this engine
    /// tracks (Aave-v3-style `Supply`/`Withdraw`, §4.10).
    TxHashAmount,
    /// Pair on tx_hash only, ignoring amount — used when the event carries
    /// pool-side amounts with no single vault-asset delta to compare against
    /// (Uniswap-v2-style LP `Mint`/`Burn`, §4.10).
    TxHashOnly,
}

pub fn default_strategy(kind: IntegrationKind) -> MatchStrategy {
    match kind {
        IntegrationKind::Erc4626 => MatchStrategy::AddressAssetAmount,
        IntegrationKind::LendingCToken => MatchStrategy::AddressAssetAmount,
        IntegrationKind::LendingAToken => MatchStrategy::TxHashAmount,
        IntegrationKind::AmmLp => MatchStrategy::TxHashOnly,
    }
}

/// One canonical leg paired against the integration event that explains it.
#[derive(Debug, Clone)]
pub struct MatchedPair {
    pub leg: ShareEvent,
    pub integration_event: IntegrationEvent,
}

/// Output of one reconciliation pass over one contract's block range.
#[derive(Debug, Clone, Default)]
pub struct MatchOutcome {
    pub matched: Vec<MatchedPair>,
    pub unmatched_legs: Vec<ShareEvent>,
    pub unmatched_events: Vec<IntegrationEvent>,
}

fn leg_kind(leg: &ShareEvent) -> IntegrationEventKind {
    match leg.classification {
        Classification::IntegrationIn => IntegrationEventKind::In,
        Classification::IntegrationOut => IntegrationEventKind::Out,
        other => unreachable!("integration_legs_in_range only yields integration legs, got {other:?}"),
    }
}

fn leg_amount(leg: &ShareEvent) -> U256 {
    // shares_delta is signed; both in- and out-legs compare against the
    // magnitude the chain emitted, never the sign.
    leg.shares_delta.0.unsigned_abs()
}

/// Drops legs and events carrying a zero amount before matching — a handful
/// of real deployments emit a zero-value Transfer/Deposit pair as a no-op
/// approval-style call, and zero-amount rows only ever produce noise in the
/// unmatched report (§4.10 "drop zero-amount events").
fn drop_zero_amount(legs: Vec<ShareEvent>, events: Vec<IntegrationEvent>) -> (Vec<ShareEvent>, Vec<IntegrationEvent>) {
    (
        legs.into_iter().filter(|l| !leg_amount(l).is_zero()).collect(),
        events.into_iter().filter(|e| !e.amount.is_zero()).collect(),
    )
}

/// Cancels symmetric (same tx_hash, same amount, opposite direction) leg/event
/// pairs before the main pass. A small number of protected-collateral 4626
/// markets emit both a `Deposit` and a `Withdraw` in the same transaction when
/// a position is rolled into a new one; left alone these would each try to
/// match against an unrelated leg elsewhere in the range and produce a false
/// positive. Only applied for [`IntegrationKind::Erc4626`] (§4.10).
fn cancel_symmetric_pairs(
    mut legs: Vec<ShareEvent>,
    mut events: Vec<IntegrationEvent>,
) -> (Vec<ShareEvent>, Vec<IntegrationEvent>) {
    let mut survivors_legs = Vec::with_capacity(legs.len());

    while let Some(leg) = legs.pop() {
        let opposite_kind = match leg_kind(&leg) {
            IntegrationEventKind::In => IntegrationEventKind::Out,
            IntegrationEventKind::Out => IntegrationEventKind::In,
        };
        let amount = leg_amount(&leg);

        // Does another leg with the same tx_hash, opposite classification,
        // and equal amount exist? If so this is the roll-over pattern; cancel
        // both legs regardless of whether a decoded event backs either side,
        // and consume a matching event too if one happens to be present.
        let partner_idx = legs.iter().position(|other| {
            other.tx_hash == leg.tx_hash && leg_amount(other) == amount && leg_kind(other) == opposite_kind
        });
        if let Some(partner_idx) = partner_idx {
            legs.remove(partner_idx);
            if let Some(pos) = events.iter().position(|e| e.tx_hash == leg.tx_hash && e.amount == amount && e.kind == opposite_kind) {
                events.remove(pos);
            }
            continue;
        }
        survivors_legs.push(leg);
    }

    survivors_legs.reverse();
    (survivors_legs, events)
}

/// Runs the matcher for one contract's block range. `kind` selects both the
/// prefilters and the [`MatchStrategy`].
pub fn reconcile(
    kind: IntegrationKind,
    legs: Vec<ShareEvent>,
    events: Vec<IntegrationEvent>,
) -> MatchOutcome {
    let (legs, events) = drop_zero_amount(legs, events);
    let (mut legs, mut events) = if kind == IntegrationKind::Erc4626 {
        cancel_symmetric_pairs(legs, events)
    } else {
        (legs, events)
    };

    let strategy = default_strategy(kind);
    let mut matched = Vec::new();

    match strategy {
        MatchStrategy::AddressAssetAmount => {
            // index remaining events by (account, amount, kind); each event
            // consumed at most once.
            let mut by_key: HashMap<(String, U256, IntegrationEventKind), Vec<usize>> = HashMap::new();
            for (i, e) in events.iter().enumerate() {
                if let Some(account) = e.account {
                    by_key
                        .entry((format!("{account:#x}"), e.amount, e.kind))
                        .or_default()
                        .push(i);
                }
            }
            let mut consumed = vec![false; events.len()];
            let mut remaining_legs = Vec::new();

            for leg in legs.drain(..) {
                let key = (format!("{:#x}", leg.address), leg_amount(&leg), leg_kind(&leg));
                let found = by_key
                    .get_mut(&key)
                    .and_then(|idxs| idxs.iter().position(|&i| !consumed[i]).map(|p| idxs[p]));
                match found {
                    Some(idx) => {
                        consumed[idx] = true;
                        matched.push(MatchedPair { leg, integration_event: events[idx].clone() });
                    }
                    None => remaining_legs.push(leg),
                }
            }
            let unmatched_events = events
                .into_iter()
                .enumerate()
                .filter(|(i, _)| !consumed[*i])
                .map(|(_, e)| e)
                .collect();
            legs = remaining_legs;
            events = unmatched_events;
        }
        MatchStrategy::TxHashAmount => {
            let mut by_key: HashMap<(H256, U256, IntegrationEventKind), Vec<usize>> = HashMap::new();
            for (i, e) in events.iter().enumerate() {
                by_key.entry((e.tx_hash, e.amount, e.kind)).or_default().push(i);
            }
            let mut consumed = vec![false; events.len()];
            let mut remaining_legs = Vec::new();

            for leg in legs.drain(..) {
                let key = (leg.tx_hash, leg_amount(&leg), leg_kind(&leg));
                let found = by_key
                    .get_mut(&key)
                    .and_then(|idxs| idxs.iter().position(|&i| !consumed[i]).map(|p| idxs[p]));
                match found {
                    Some(idx) => {
                        consumed[idx] = true;
                        matched.push(MatchedPair { leg, integration_event: events[idx].clone() });
                    }
                    None => remaining_legs.push(leg),
                }
            }
            let unmatched_events = events
                .into_iter()
                .enumerate()
                .filter(|(i, _)| !consumed[*i])
                .map(|(_, e)| e)
                .collect();
            legs = remaining_legs;
            events = unmatched_events;
        }
        MatchStrategy::TxHashOnly => {
            let mut by_key: HashMap<(H256, IntegrationEventKind), Vec<usize>> = HashMap::new();
            for (i, e) in events.iter().enumerate() {
                by_key.entry((e.tx_hash, e.kind)).or_default().push(i);
            }
            let mut consumed = vec![false; events.len()];
            let mut remaining_legs = Vec::new();

            for leg in legs.drain(..) {
                let key = (leg.tx_hash, leg_kind(&leg));
                let found = by_key
                    .get_mut(&key)
                    .and_then(|idxs| idxs.iter().position(|&i| !consumed[i]).map(|p| idxs[p]));
                match found {
                    Some(idx) => {
                        consumed[idx] = true;
                        matched.push(MatchedPair { leg, integration_event: events[idx].clone() });
                    }
                    None => remaining_legs.push(leg),
                }
            }
            let unmatched_events = events
                .into_iter()
                .enumerate()
                .filter(|(i, _)| !consumed[*i])
                .map(|(_, e)| e)
                .collect();
            legs = remaining_legs;
            events = unmatched_events;
        }
    }

    MatchOutcome { matched, unmatched_legs: legs, unmatched_events: events }
}

#[cfg(test)]
mod tests {
    use super::*;
    use droplets_common::model::EventType;
    use droplets_common::{AssetSymbol, ChainId, SignedAmount};
    use ethers::types::{Address, I256};

    fn leg(address: Address, amount: i64, classification: Classification, tx_hash: H256) -> ShareEvent {
        ShareEvent {
            chain_id: ChainId(1),
            tx_hash,
            log_index: 0,
            address,
            asset: AssetSymbol::AEth,
            event_type: EventType::Transfer,
            shares_delta: SignedAmount(I256::from(amount)),
            block: 100,
            timestamp: chrono::DateTime::from_timestamp(0, 0).unwrap(),
            round_id: None,
            classification,
        }
    }

    fn event(kind: IntegrationEventKind, account: Option<Address>, amount: u64, tx_hash: H256) -> IntegrationEvent {
        IntegrationEvent { kind, account, amount: U256::from(amount), tx_hash, log_index: 0, block_number: 100 }
    }

    #[test]
    fn address_asset_amount_matches_exact_pair() {
        let addr = Address::from_low_u64_be(1);
        let tx = H256::from_low_u64_be(1);
        let legs = vec![leg(addr, 500, Classification::IntegrationIn, tx)];
        let events = vec![event(IntegrationEventKind::In, Some(addr), 500, tx)];
        let outcome = reconcile(IntegrationKind::Erc4626, legs, events);
        assert_eq!(outcome.matched.len(), 1);
        assert!(outcome.unmatched_legs.is_empty());
        assert!(outcome.unmatched_events.is_empty());
    }

    #[test]
    fn mismatched_amount_is_unmatched_on_both_sides() {
        let addr = Address::from_low_u64_be(1);
        let tx = H256::from_low_u64_be(1);
        let legs = vec![leg(addr, 500, Classification::IntegrationIn, tx)];
        let events = vec![event(IntegrationEventKind::In, Some(addr), 400, tx)];
        let outcome = reconcile(IntegrationKind::Erc4626, legs, events);
        assert!(outcome.matched.is_empty());
        assert_eq!(outcome.unmatched_legs.len(), 1);
        assert_eq!(outcome.unmatched_events.len(), 1);
    }

    #[test]
    fn tx_hash_only_ignores_amount_for_lp_kind() {
        let tx = H256::from_low_u64_be(9);
        let legs = vec![leg(Address::from_low_u64_be(2), 100, Classification::IntegrationIn, tx)];
        let events = vec![event(IntegrationEventKind::In, None, 999, tx)];
        let outcome = reconcile(IntegrationKind::AmmLp, legs, events);
        assert_eq!(outcome.matched.len(), 1);
    }

    #[test]
    fn symmetric_pair_is_cancelled_for_erc4626() {
        let tx = H256::from_low_u64_be(3);
        let addr = Address::from_low_u64_be(1);
        let legs = vec![
            leg(addr, 500, Classification::IntegrationIn, tx),
            leg(addr, 500, Classification::IntegrationOut, tx),
        ];
        // no integration events decoded for this tx at all — both legs should
        // still cancel against each other via the roll-over prefilter.
        let outcome = reconcile(IntegrationKind::Erc4626, legs, vec![]);
        assert!(outcome.matched.is_empty());
        assert!(outcome.unmatched_legs.is_empty());
    }

    #[test]
    fn zero_amount_rows_are_dropped_before_matching() {
        let addr = Address::from_low_u64_be(1);
        let tx = H256::from_low_u64_be(1);
        let legs = vec![leg(addr, 0, Classification::IntegrationIn, tx)];
        let events = vec![event(IntegrationEventKind::In, Some(addr), 0, tx)];
        let outcome = reconcile(IntegrationKind::Erc4626, legs, events);
        assert!(outcome.matched.is_empty());
        assert!(outcome.unmatched_legs.is_empty());
        assert!(outcome.unmatched_events.is_empty());
    }
}
