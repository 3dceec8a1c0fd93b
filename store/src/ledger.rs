//! C11 persistence: the append-only `droplet_ledger` and the derived
//! `leaderboard` rollup. A ledger row is keyed on (address, snapshot_date),
//! so re-running a snapshot date is idempotent (§8).

use crate::codec::{addr_from_db, addr_to_db};
use crate::db::Db;
use droplets_common::error::StoreError;
use droplets_common::model::{DropletLedgerEntry, LeaderboardEntry};
use droplets_common::Amount;
use chrono::NaiveDate;
use ethers::types::{Address, U256};
use sqlx::Postgres;

pub async fn insert_entry(db: &Db, entry: &DropletLedgerEntry) -> Result<(), StoreError> {
    let mut tx = db.pool.begin().await?;
    insert_entry_tx(&mut tx, entry).await?;
    tx.commit().await?;
    Ok(())
}

/// Transaction-scoped twin of [`insert_entry`]; the daily snapshot engine
/// writes every address's ledger row and leaderboard update for a date in
/// one commit (§4.8 atomicity).
pub async fn insert_entry_tx(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    entry: &DropletLedgerEntry,
) -> Result<(), StoreError> {
    sqlx::query(
        "insert into droplet_ledger (address, snapshot_date, amount, reason) values ($1, $2, $3, $4) \
         on conflict (address, snapshot_date) do nothing",
    )
    .bind(addr_to_db(&entry.address))
    .bind(entry.snapshot_date)
    .bind(entry.amount.0.to_string())
    .bind(&entry.reason)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Folds the day's ledger entry into the running leaderboard total. Called
/// once per address immediately after `insert_entry` succeeds.
pub async fn apply_to_leaderboard(
    db: &Db,
    address: Address,
    snapshot_date: NaiveDate,
    amount: &Amount,
    daily_usd: &Amount,
) -> Result<(), StoreError> {
    let mut tx = db.pool.begin().await?;
    apply_to_leaderboard_tx(&mut tx, address, snapshot_date, amount, daily_usd).await?;
    tx.commit().await?;
    Ok(())
}

/// Transaction-scoped twin of [`apply_to_leaderboard`] (§4.8, §4.9: the
/// leaderboard rollup updates inside the same transaction as the ledger
/// write it derives from).
pub async fn apply_to_leaderboard_tx(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    address: Address,
    snapshot_date: NaiveDate,
    amount: &Amount,
    daily_usd: &Amount,
) -> Result<(), StoreError> {
    sqlx::query(
        "insert into leaderboard (address, total_droplets, days_participated, last_snapshot_date, average_daily_usd) \
         values ($1, $2, 1, $3, $4) \
         on conflict (address) do update set \
           total_droplets = leaderboard.total_droplets + excluded.total_droplets, \
           days_participated = leaderboard.days_participated + 1, \
           last_snapshot_date = excluded.last_snapshot_date, \
           average_daily_usd = ((leaderboard.average_daily_usd * leaderboard.days_participated) + excluded.average_daily_usd) \
             / (leaderboard.days_participated + 1)",
    )
    .bind(addr_to_db(&address))
    .bind(amount.0.to_string())
    .bind(snapshot_date)
    .bind(daily_usd.0.to_string())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

type LedgerRow = (String, NaiveDate, String, String);

fn row_to_entry(row: LedgerRow) -> Result<DropletLedgerEntry, StoreError> {
    let (address, snapshot_date, amount, reason) = row;
    Ok(DropletLedgerEntry {
        address: addr_from_db(&address)?,
        snapshot_date,
        amount: parse_amount(&amount)?,
        reason,
    })
}

fn parse_amount(s: &str) -> Result<Amount, StoreError> {
    U256::from_dec_str(s)
        .map(Amount)
        .map_err(|_| StoreError::Invariant(format!("bad amount in db: {s}")))
}

pub async fn for_address(db: &Db, address: Address) -> Result<Vec<DropletLedgerEntry>, StoreError> {
    let rows = sqlx::query_as::<Postgres, LedgerRow>(
        "select address, snapshot_date, amount, reason from droplet_ledger \
         where address = $1 order by snapshot_date asc",
    )
    .bind(addr_to_db(&address))
    .fetch_all(&db.pool)
    .await?;
    rows.into_iter().map(row_to_entry).collect()
}

pub async fn entry_exists(db: &Db, address: Address, snapshot_date: NaiveDate) -> Result<bool, StoreError> {
    let row: Option<(i32,)> = sqlx::query_as(
        "select 1 from droplet_ledger where address = $1 and snapshot_date = $2",
    )
    .bind(addr_to_db(&address))
    .bind(snapshot_date)
    .fetch_optional(&db.pool)
    .await?;
    Ok(row.is_some())
}

type LeaderboardRow = (String, String, i64, Option<NaiveDate>, String);

fn row_to_leaderboard(row: LeaderboardRow) -> Result<LeaderboardEntry, StoreError> {
    let (address, total_droplets, days_participated, last_snapshot_date, average_daily_usd) = row;
    Ok(LeaderboardEntry {
        address: addr_from_db(&address)?,
        total_droplets: parse_amount(&total_droplets)?,
        days_participated: days_participated as u64,
        last_snapshot_date,
        average_daily_usd: parse_amount(&average_daily_usd)?,
    })
}

pub async fn top_n(db: &Db, n: i64) -> Result<Vec<LeaderboardEntry>, StoreError> {
    let rows = sqlx::query_as::<Postgres, LeaderboardRow>(
        "select address, total_droplets, days_participated, last_snapshot_date, average_daily_usd \
         from leaderboard order by total_droplets desc limit $1",
    )
    .bind(n)
    .fetch_all(&db.pool)
    .await?;
    rows.into_iter().map(row_to_leaderboard).collect()
}

pub async fn get(db: &Db, address: Address) -> Result<Option<LeaderboardEntry>, StoreError> {
    let row = sqlx::query_as::<Postgres, LeaderboardRow>(
        "select address, total_droplets, days_participated, last_snapshot_date, average_daily_usd \
         from leaderboard where address = $1",
    )
    .bind(addr_to_db(&address))
    .fetch_optional(&db.pool)
    .await?;
    row.map(row_to_leaderboard).transpose()
}
