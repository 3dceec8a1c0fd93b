//! C7: `RoundRolled` history on Chain-E. Round ids per asset form a contiguous
//! sequence; `end_ts[n] == start_ts[n+1]` (§3, §8).

use crate::codec::*;
use crate::db::Db;
use droplets_common::error::StoreError;
use droplets_common::model::Round;
use droplets_common::{AssetSymbol, ChainId};
use sqlx::Postgres;

pub async fn upsert(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    chain_id: ChainId,
    round: &Round,
) -> Result<(), StoreError> {
    sqlx::query(
        "insert into rounds \
         (asset, chain_id, round_id, start_block, start_ts, end_ts, pps, pps_scale, shares_minted, yield_amount, is_yield_positive, tx_hash) \
         values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
         on conflict (asset, chain_id, round_id) do update set \
           start_block = excluded.start_block, \
           start_ts = excluded.start_ts, \
           end_ts = coalesce(excluded.end_ts, rounds.end_ts), \
           pps = excluded.pps, \
           pps_scale = excluded.pps_scale, \
           shares_minted = excluded.shares_minted, \
           yield_amount = excluded.yield_amount, \
           is_yield_positive = excluded.is_yield_positive, \
           tx_hash = excluded.tx_hash",
    )
    .bind(asset_to_db(round.asset))
    .bind(chain_id_to_db(chain_id))
    .bind(round.round_id as i64)
    .bind(round.start_block as i64)
    .bind(round.start_ts)
    .bind(round.end_ts)
    .bind(amount_to_db(&round.pps))
    .bind(round.pps_scale as i16)
    .bind(amount_to_db(&round.shares_minted))
    .bind(signed_amount_to_db(&round.yield_amount))
    .bind(round.is_yield_positive)
    .bind(h256_to_db(&round.tx_hash))
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Closes the prior round by setting its `end_ts` to the new round's
/// `start_ts`, per §4.4. A no-op if there is no prior round (genesis round).
pub async fn close_prior_round(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    asset: AssetSymbol,
    chain_id: ChainId,
    prior_round_id: u64,
    end_ts: chrono::DateTime<chrono::Utc>,
) -> Result<(), StoreError> {
    sqlx::query(
        "update rounds set end_ts = $1 where asset = $2 and chain_id = $3 and round_id = $4",
    )
    .bind(end_ts)
    .bind(asset_to_db(asset))
    .bind(chain_id_to_db(chain_id))
    .bind(prior_round_id as i64)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

type RoundRow = (
    String,
    i64,
    i64,
    i64,
    chrono::DateTime<chrono::Utc>,
    Option<chrono::DateTime<chrono::Utc>>,
    String,
    i16,
    String,
    String,
    bool,
    String,
);

fn row_to_round(row: RoundRow) -> Result<Round, StoreError> {
    let (asset, _chain_id, round_id, start_block, start_ts, end_ts, pps, pps_scale, shares_minted, yield_amount, is_yield_positive, tx_hash) = row;
    Ok(Round {
        asset: asset_from_db(&asset)?,
        round_id: round_id as u64,
        start_block: start_block as u64,
        start_ts,
        end_ts,
        pps: amount_from_db(&pps)?,
        pps_scale: pps_scale as u8,
        shares_minted: amount_from_db(&shares_minted)?,
        yield_amount: signed_amount_from_db(&yield_amount)?,
        is_yield_positive,
        tx_hash: h256_from_db(&tx_hash)?,
    })
}

/// Latest round (by round_id) for an asset on Chain-E.
pub async fn latest(db: &Db, asset: AssetSymbol, chain_id: ChainId) -> Result<Option<Round>, StoreError> {
    let row = sqlx::query_as::<Postgres, RoundRow>(
        "select asset, chain_id, round_id, start_block, start_ts, end_ts, pps, pps_scale, shares_minted, yield_amount, is_yield_positive, tx_hash \
         from rounds where asset = $1 and chain_id = $2 order by round_id desc limit 1",
    )
    .bind(asset_to_db(asset))
    .bind(chain_id_to_db(chain_id))
    .fetch_optional(&db.pool)
    .await?;
    row.map(row_to_round).transpose()
}

/// The round whose [start_block, end_block) window covers `block`.
pub async fn covering_block(
    db: &Db,
    asset: AssetSymbol,
    chain_id: ChainId,
    block: u64,
) -> Result<Option<Round>, StoreError> {
    let row = sqlx::query_as::<Postgres, RoundRow>(
        "select asset, chain_id, round_id, start_block, start_ts, end_ts, pps, pps_scale, shares_minted, yield_amount, is_yield_positive, tx_hash \
         from rounds where asset = $1 and chain_id = $2 and start_block <= $3 \
         order by start_block desc limit 1",
    )
    .bind(asset_to_db(asset))
    .bind(chain_id_to_db(chain_id))
    .bind(block as i64)
    .fetch_optional(&db.pool)
    .await?;
    row.map(row_to_round).transpose()
}

/// Latest round whose `start_ts <= at_or_before`, used when resolving PPS for
/// a non-canonical chain (§4.4).
pub async fn latest_at_or_before(
    db: &Db,
    asset: AssetSymbol,
    chain_id: ChainId,
    at_or_before: chrono::DateTime<chrono::Utc>,
) -> Result<Option<Round>, StoreError> {
    let row = sqlx::query_as::<Postgres, RoundRow>(
        "select asset, chain_id, round_id, start_block, start_ts, end_ts, pps, pps_scale, shares_minted, yield_amount, is_yield_positive, tx_hash \
         from rounds where asset = $1 and chain_id = $2 and start_ts <= $3 \
         order by start_ts desc limit 1",
    )
    .bind(asset_to_db(asset))
    .bind(chain_id_to_db(chain_id))
    .bind(at_or_before)
    .fetch_optional(&db.pool)
    .await?;
    row.map(row_to_round).transpose()
}

pub async fn all_for_asset(db: &Db, asset: AssetSymbol, chain_id: ChainId) -> Result<Vec<Round>, StoreError> {
    let rows = sqlx::query_as::<Postgres, RoundRow>(
        "select asset, chain_id, round_id, start_block, start_ts, end_ts, pps, pps_scale, shares_minted, yield_amount, is_yield_positive, tx_hash \
         from rounds where asset = $1 and chain_id = $2 order by round_id asc",
    )
    .bind(asset_to_db(asset))
    .bind(chain_id_to_db(chain_id))
    .fetch_all(&db.pool)
    .await?;
    rows.into_iter().map(row_to_round).collect()
}
