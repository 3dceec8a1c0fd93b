//! C6 persistence: `CurrentBalance` (invariant: never negative) and the
//! per-round `BalanceSnapshot` rows created at each `RoundRolled`.
//!
//! The only read-modify-write sequence in the whole system lives here
//! (§5): every balance mutation takes a row lock with `select ... for update`
//! inside the caller's transaction before computing and writing the new
//! value, so concurrent tasks touching different (address, asset, chain)
//! triples never block each other and the same triple is never raced.

use crate::codec::*;
use crate::db::Db;
use droplets_common::error::StoreError;
use droplets_common::model::{BalanceSnapshot, CurrentBalance, RoundFlags};
use droplets_common::{Amount, AssetSymbol, ChainId};
use ethers::types::Address;
use sqlx::Postgres;

/// Locks the (address, asset, chain) row (inserting a zero row first if it
/// doesn't exist yet) and returns the current shares for the caller to apply
/// a delta to.
pub async fn lock_for_update(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    address: Address,
    asset: AssetSymbol,
    chain_id: ChainId,
) -> Result<Amount, StoreError> {
    sqlx::query(
        "insert into current_balances (address, asset, chain_id, shares, last_update_block) \
         values ($1, $2, $3, 0, 0) on conflict (address, asset, chain_id) do nothing",
    )
    .bind(addr_to_db(&address))
    .bind(asset_to_db(asset))
    .bind(chain_id_to_db(chain_id))
    .execute(&mut **tx)
    .await?;

    let row: (String,) = sqlx::query_as(
        "select shares from current_balances where address = $1 and asset = $2 and chain_id = $3 for update",
    )
    .bind(addr_to_db(&address))
    .bind(asset_to_db(asset))
    .bind(chain_id_to_db(chain_id))
    .fetch_one(&mut **tx)
    .await?;

    amount_from_db(&row.0)
}

pub async fn write(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    address: Address,
    asset: AssetSymbol,
    chain_id: ChainId,
    new_shares: Amount,
    block: u64,
) -> Result<(), StoreError> {
    sqlx::query(
        "update current_balances set shares = $1, last_update_block = $2 \
         where address = $3 and asset = $4 and chain_id = $5",
    )
    .bind(amount_to_db(&new_shares))
    .bind(block as i64)
    .bind(addr_to_db(&address))
    .bind(asset_to_db(asset))
    .bind(chain_id_to_db(chain_id))
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn get(
    db: &Db,
    address: Address,
    asset: AssetSymbol,
    chain_id: ChainId,
) -> Result<Option<CurrentBalance>, StoreError> {
    let row: Option<(String,)> = sqlx::query_as(
        "select shares from current_balances where address = $1 and asset = $2 and chain_id = $3",
    )
    .bind(addr_to_db(&address))
    .bind(asset_to_db(asset))
    .bind(chain_id_to_db(chain_id))
    .fetch_optional(&db.pool)
    .await?;

    row.map(|(shares,)| {
        Ok(CurrentBalance {
            address,
            asset,
            chain_id,
            shares: amount_from_db(&shares)?,
            last_update_block: 0,
        })
    })
    .transpose()
}

/// Every address holding a positive balance in any (asset, chain), across
/// the whole engine — the base population C10 snapshots each day before
/// excluding operationally-excluded addresses. Exclusion filtering happens
/// in the caller, which has the registry's excluded-address set.
pub async fn all_addresses_with_positive_balance(db: &Db) -> Result<Vec<Address>, StoreError> {
    let rows: Vec<(String,)> =
        sqlx::query_as("select distinct address from current_balances where shares > 0")
            .fetch_all(&db.pool)
            .await?;
    rows.into_iter().map(|(a,)| addr_from_db(&a)).collect()
}

/// Every (address, chain) balance for `address` across every asset, the
/// per-address view C10 needs to total vault and OFT exposure in one place.
pub async fn for_address(db: &Db, address: Address) -> Result<Vec<CurrentBalance>, StoreError> {
    let rows: Vec<(String, i64, String)> = sqlx::query_as(
        "select asset, chain_id, shares from current_balances where address = $1 and shares > 0",
    )
    .bind(addr_to_db(&address))
    .fetch_all(&db.pool)
    .await?;

    rows.into_iter()
        .map(|(asset, chain_id, shares)| {
            Ok(CurrentBalance {
                address,
                asset: asset_from_db(&asset)?,
                chain_id: chain_id_from_db(chain_id),
                shares: amount_from_db(&shares)?,
                last_update_block: 0,
            })
        })
        .collect()
}

/// Every (address, asset=this asset, chain=E) holder with shares > 0 and not
/// excluded — the population a new `BalanceSnapshot` row is created for at
/// round-roll time (§4.5). Exclusion filtering happens in the caller, which
/// has the registry's excluded-address set.
pub async fn holders_with_positive_balance(
    db: &Db,
    asset: AssetSymbol,
    chain_id: ChainId,
) -> Result<Vec<(Address, Amount)>, StoreError> {
    let rows: Vec<(String, String)> = sqlx::query_as(
        "select address, shares from current_balances \
         where asset = $1 and chain_id = $2 and shares > 0",
    )
    .bind(asset_to_db(asset))
    .bind(chain_id_to_db(chain_id))
    .fetch_all(&db.pool)
    .await?;

    rows.into_iter()
        .map(|(addr, shares)| Ok((addr_from_db(&addr)?, amount_from_db(&shares)?)))
        .collect()
}

pub async fn insert_snapshot(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    snapshot: &BalanceSnapshot,
) -> Result<(), StoreError> {
    sqlx::query(
        "insert into balance_snapshots (address, asset, round_id, shares_at_start, had_unstake_in_round, had_transfer_in_round, had_bridge_in_round) \
         values ($1, $2, $3, $4, $5, $6, $7) \
         on conflict (address, asset, round_id) do nothing",
    )
    .bind(addr_to_db(&snapshot.address))
    .bind(asset_to_db(snapshot.asset))
    .bind(snapshot.round_id as i64)
    .bind(amount_to_db(&snapshot.shares_at_start))
    .bind(snapshot.flags.had_unstake_in_round)
    .bind(snapshot.flags.had_transfer_in_round)
    .bind(snapshot.flags.had_bridge_in_round)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Sets one of the `had_*_in_round` flags for every open `BalanceSnapshot` row
/// matching (address, asset, round_id), as events land within the round
/// window (§4.5).
pub async fn mark_flag(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    address: Address,
    asset: AssetSymbol,
    round_id: u64,
    flag: RoundFlagKind,
) -> Result<(), StoreError> {
    let column = match flag {
        RoundFlagKind::Unstake => "had_unstake_in_round",
        RoundFlagKind::Transfer => "had_transfer_in_round",
        RoundFlagKind::Bridge => "had_bridge_in_round",
    };
    let sql = format!(
        "update balance_snapshots set {column} = true where address = $1 and asset = $2 and round_id = $3"
    );
    sqlx::query(&sql)
        .bind(addr_to_db(&address))
        .bind(asset_to_db(asset))
        .bind(round_id as i64)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

#[derive(Debug, Clone, Copy)]
pub enum RoundFlagKind {
    Unstake,
    Transfer,
    Bridge,
}

pub async fn flags_for_round(
    db: &Db,
    address: Address,
    asset: AssetSymbol,
    round_id: u64,
) -> Result<Option<RoundFlags>, StoreError> {
    let row: Option<(bool, bool, bool)> = sqlx::query_as(
        "select had_unstake_in_round, had_transfer_in_round, had_bridge_in_round \
         from balance_snapshots where address = $1 and asset = $2 and round_id = $3",
    )
    .bind(addr_to_db(&address))
    .bind(asset_to_db(asset))
    .bind(round_id as i64)
    .fetch_optional(&db.pool)
    .await?;

    Ok(row.map(|(u, t, b)| RoundFlags {
        had_unstake_in_round: u,
        had_transfer_in_round: t,
        had_bridge_in_round: b,
    }))
}
