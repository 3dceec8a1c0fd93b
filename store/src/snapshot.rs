//! C10 persistence: the daily per-address USD snapshot and the `DailyJob`
//! state machine that guards one snapshot run per `snapshot_date` (§4.7, §8:
//! "a given snapshot_date is processed at most once to completion").

use crate::codec::{addr_from_db, addr_to_db};
use crate::db::Db;
use droplets_common::error::{SnapshotError, StoreError};
use droplets_common::model::{AssetUsdBreakdown, DailyJob, DailyJobStatus, DailyUsdSnapshot};
use droplets_common::Amount;
use chrono::NaiveDate;
use ethers::types::Address;
use sqlx::Postgres;

fn status_to_db(status: DailyJobStatus) -> &'static str {
    status.as_str()
}

fn status_from_db(s: &str) -> Result<DailyJobStatus, StoreError> {
    Ok(match s {
        "pending" => DailyJobStatus::Pending,
        "processing" => DailyJobStatus::Processing,
        "completed" => DailyJobStatus::Completed,
        "failed" => DailyJobStatus::Failed,
        other => return Err(StoreError::Invariant(format!("unknown daily job status: {other}"))),
    })
}

/// Attempts to claim `snapshot_date` for processing. Returns `Ok(false)`
/// without claiming if a row for that date is already `processing` or
/// `completed` — the caller should skip the run entirely in that case.
pub async fn try_claim(db: &Db, snapshot_date: NaiveDate) -> Result<bool, SnapshotError> {
    let existing: Option<(String,)> =
        sqlx::query_as("select status from daily_jobs where snapshot_date = $1")
            .bind(snapshot_date)
            .fetch_optional(&db.pool)
            .await
            .map_err(StoreError::from)?;

    if let Some((status,)) = &existing {
        if status == "processing" || status == "completed" {
            return Ok(false);
        }
    }

    sqlx::query(
        "insert into daily_jobs (snapshot_date, status, started_at) values ($1, 'processing', now()) \
         on conflict (snapshot_date) do update set status = 'processing', started_at = now(), error_message = null \
         where daily_jobs.status != 'processing' and daily_jobs.status != 'completed'",
    )
    .bind(snapshot_date)
    .execute(&db.pool)
    .await
    .map_err(StoreError::from)?;

    Ok(true)
}

pub async fn mark_completed(db: &Db, snapshot_date: NaiveDate) -> Result<(), StoreError> {
    sqlx::query("update daily_jobs set status = 'completed', completed_at = now() where snapshot_date = $1")
        .bind(snapshot_date)
        .execute(&db.pool)
        .await?;
    Ok(())
}

/// Transaction-scoped twin of [`mark_completed`], for callers that must land
/// the job-status flip in the same commit as the snapshot/ledger rows it
/// guards (§4.8 atomicity).
pub async fn mark_completed_tx(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    snapshot_date: NaiveDate,
) -> Result<(), StoreError> {
    sqlx::query("update daily_jobs set status = 'completed', completed_at = now() where snapshot_date = $1")
        .bind(snapshot_date)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

pub async fn mark_failed(db: &Db, snapshot_date: NaiveDate, error_message: &str) -> Result<(), StoreError> {
    sqlx::query(
        "update daily_jobs set status = 'failed', error_message = $1, completed_at = now() where snapshot_date = $2",
    )
    .bind(error_message)
    .bind(snapshot_date)
    .execute(&db.pool)
    .await?;
    Ok(())
}

pub async fn get_job(db: &Db, snapshot_date: NaiveDate) -> Result<Option<DailyJob>, StoreError> {
    let row: Option<(
        String,
        Option<String>,
        chrono::DateTime<chrono::Utc>,
        Option<chrono::DateTime<chrono::Utc>>,
    )> = sqlx::query_as(
        "select status, error_message, started_at, completed_at from daily_jobs where snapshot_date = $1",
    )
    .bind(snapshot_date)
    .fetch_optional(&db.pool)
    .await?;

    row.map(|(status, error_message, started_at, completed_at)| {
        Ok(DailyJob {
            snapshot_date,
            status: status_from_db(&status)?,
            error_message,
            started_at,
            completed_at,
        })
    })
    .transpose()
}

pub async fn insert_usd_snapshot(db: &Db, snapshot: &DailyUsdSnapshot) -> Result<(), StoreError> {
    let mut tx = db.pool.begin().await?;
    insert_usd_snapshot_tx(&mut tx, snapshot).await?;
    tx.commit().await?;
    Ok(())
}

/// Transaction-scoped twin of [`insert_usd_snapshot`], used by the daily
/// snapshot engine so every address's row for a date lands in the same
/// commit as the job-status flip (§4.8 atomicity).
pub async fn insert_usd_snapshot_tx(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    snapshot: &DailyUsdSnapshot,
) -> Result<(), StoreError> {
    let breakdown = serde_json::to_value(&snapshot.breakdown)
        .map_err(|e| StoreError::Invariant(format!("breakdown serialize failed: {e}")))?;

    sqlx::query(
        "insert into daily_usd_snapshots \
         (address, snapshot_date, total_usd_value, breakdown, had_unstake, is_excluded, droplets_earned, snapshot_ts) \
         values ($1, $2, $3, $4, $5, $6, $7, $8) \
         on conflict (address, snapshot_date) do nothing",
    )
    .bind(addr_to_db(&snapshot.address))
    .bind(snapshot.snapshot_date)
    .bind(snapshot.total_usd_value.0.to_string())
    .bind(breakdown)
    .bind(snapshot.had_unstake)
    .bind(snapshot.is_excluded)
    .bind(snapshot.droplets_earned.0.to_string())
    .bind(snapshot.snapshot_ts)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

type SnapshotRow = (
    String,
    NaiveDate,
    String,
    serde_json::Value,
    bool,
    bool,
    String,
    chrono::DateTime<chrono::Utc>,
);

fn row_to_snapshot(row: SnapshotRow) -> Result<DailyUsdSnapshot, StoreError> {
    let (address, snapshot_date, total_usd_value, breakdown, had_unstake, is_excluded, droplets_earned, snapshot_ts) = row;
    let breakdown: Vec<AssetUsdBreakdown> = serde_json::from_value(breakdown)
        .map_err(|e| StoreError::Invariant(format!("breakdown deserialize failed: {e}")))?;
    Ok(DailyUsdSnapshot {
        address: addr_from_db(&address)?,
        snapshot_date,
        total_usd_value: parse_amount(&total_usd_value)?,
        breakdown,
        had_unstake,
        is_excluded,
        droplets_earned: parse_amount(&droplets_earned)?,
        snapshot_ts,
    })
}

fn parse_amount(s: &str) -> Result<Amount, StoreError> {
    ethers::types::U256::from_dec_str(s)
        .map(Amount)
        .map_err(|_| StoreError::Invariant(format!("bad amount in db: {s}")))
}

pub async fn get_snapshot(
    db: &Db,
    address: Address,
    snapshot_date: NaiveDate,
) -> Result<Option<DailyUsdSnapshot>, StoreError> {
    let row = sqlx::query_as::<Postgres, SnapshotRow>(
        "select address, snapshot_date, total_usd_value, breakdown, had_unstake, is_excluded, droplets_earned, snapshot_ts \
         from daily_usd_snapshots where address = $1 and snapshot_date = $2",
    )
    .bind(addr_to_db(&address))
    .bind(snapshot_date)
    .fetch_optional(&db.pool)
    .await?;
    row.map(row_to_snapshot).transpose()
}

pub async fn for_date(db: &Db, snapshot_date: NaiveDate) -> Result<Vec<DailyUsdSnapshot>, StoreError> {
    let rows = sqlx::query_as::<Postgres, SnapshotRow>(
        "select address, snapshot_date, total_usd_value, breakdown, had_unstake, is_excluded, droplets_earned, snapshot_ts \
         from daily_usd_snapshots where snapshot_date = $1",
    )
    .bind(snapshot_date)
    .fetch_all(&db.pool)
    .await?;
    rows.into_iter().map(row_to_snapshot).collect()
}
