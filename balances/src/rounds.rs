//! C7: ingesting `RoundRolled` and answering `pps(asset, block)`.

use chrono::{DateTime, Utc};
use droplets_common::error::StoreError;
use droplets_common::model::Round;
use droplets_common::{Amount, AssetSymbol, ChainId};
use droplets_store::Db;
use sqlx::Postgres;

/// The PPS fallback when no round data exists at all: 1.0 at 18-decimal
/// scale, logged as a warning rather than silently used (§4.4).
pub const FALLBACK_PPS_SCALE: u8 = 18;

pub fn fallback_pps() -> Amount {
    Amount::from_u64(10u64.pow(FALLBACK_PPS_SCALE as u32))
}

/// Upserts the new round and closes the prior one, within the caller's
/// transaction (§4.4). Snapshotting is the caller's responsibility
/// (`balances::folder::snapshot_round_start`), since it needs the chain
/// registry's exclusion set, which this crate doesn't own.
pub async fn roll_round(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    chain_id: ChainId,
    round: &Round,
) -> Result<(), StoreError> {
    if round.round_id > 0 {
        droplets_store::rounds::close_prior_round(tx, round.asset, chain_id, round.round_id - 1, round.start_ts)
            .await?;
    }
    droplets_store::rounds::upsert(tx, chain_id, round).await
}

/// `pps(asset, block)` on Chain-E: the round whose `[start_block, end_block)`
/// window covers `block` (§4.4, first branch).
pub async fn pps_on_canonical(
    db: &Db,
    asset: AssetSymbol,
    canonical_chain_id: ChainId,
    block: u64,
) -> Result<(Amount, u8), StoreError> {
    match droplets_store::rounds::covering_block(db, asset, canonical_chain_id, block).await? {
        Some(round) => Ok((round.pps, round.pps_scale)),
        None => {
            tracing::warn!(%asset, block, "no round covers block; falling back to pps=1.0");
            Ok((fallback_pps(), FALLBACK_PPS_SCALE))
        }
    }
}

/// `pps(asset, block)` for a block on a satellite chain: the latest round on
/// Chain-E whose `start_ts <= satellite_block_timestamp` (§4.4, second
/// branch). The caller resolves `satellite_block_timestamp` via C8's
/// timestamp<->block mapping on the satellite chain.
pub async fn pps_on_satellite(
    db: &Db,
    asset: AssetSymbol,
    canonical_chain_id: ChainId,
    satellite_block_timestamp: DateTime<Utc>,
) -> Result<(Amount, u8), StoreError> {
    match droplets_store::rounds::latest_at_or_before(db, asset, canonical_chain_id, satellite_block_timestamp)
        .await?
    {
        Some(round) => Ok((round.pps, round.pps_scale)),
        None => {
            tracing::warn!(%asset, %satellite_block_timestamp, "no round found at or before timestamp; falling back to pps=1.0");
            Ok((fallback_pps(), FALLBACK_PPS_SCALE))
        }
    }
}

/// Round-contiguity check used by the property test in §8: round ids for an
/// asset form a contiguous sequence and each round's `end_ts` equals the
/// next round's `start_ts`.
pub fn rounds_are_contiguous(rounds: &[Round]) -> bool {
    for pair in rounds.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        if b.round_id != a.round_id + 1 {
            return false;
        }
        if a.end_ts != Some(b.start_ts) {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::{H256, I256, U256};

    fn round(id: u64, start_ts: i64, end_ts: Option<i64>) -> Round {
        Round {
            asset: AssetSymbol::AEth,
            round_id: id,
            start_block: id * 1000,
            start_ts: DateTime::from_timestamp(start_ts, 0).unwrap(),
            end_ts: end_ts.map(|t| DateTime::from_timestamp(t, 0).unwrap()),
            pps: Amount(U256::from(10u64).pow(U256::from(18))),
            pps_scale: 18,
            shares_minted: Amount::ZERO,
            yield_amount: droplets_common::SignedAmount(I256::zero()),
            is_yield_positive: true,
            tx_hash: H256::zero(),
        }
    }

    #[test]
    fn contiguous_rounds_pass() {
        let rounds = vec![round(0, 100, Some(200)), round(1, 200, Some(300)), round(2, 300, None)];
        assert!(rounds_are_contiguous(&rounds));
    }

    #[test]
    fn gap_in_round_id_fails() {
        let rounds = vec![round(0, 100, Some(200)), round(2, 200, Some(300))];
        assert!(!rounds_are_contiguous(&rounds));
    }

    #[test]
    fn mismatched_end_start_fails() {
        let rounds = vec![round(0, 100, Some(199)), round(1, 200, None)];
        assert!(!rounds_are_contiguous(&rounds));
    }

    #[test]
    fn fallback_is_one_point_zero_at_18_decimals() {
        assert_eq!(fallback_pps(), Amount(U256::from(10u64).pow(U256::from(18))));
    }
}
