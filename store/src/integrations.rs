//! C9 persistence: the latest known `IntegrationPosition` per (protocol,
//! user). Positions are overwritten in place rather than accumulated, since
//! only the most recent exposure matters for snapshotting.

use crate::codec::*;
use crate::db::Db;
use droplets_common::error::StoreError;
use droplets_common::model::{IntegrationPosition, ProtocolId};
use ethers::types::Address;
use sqlx::Postgres;

/// Records `user_address` as having held `protocol_id`'s token as of
/// `block`, the first time it's seen (§4.7: "tracked via Transfer events").
pub async fn record_holder(
    db: &Db,
    protocol_id: &ProtocolId,
    user_address: Address,
    block: u64,
) -> Result<(), StoreError> {
    sqlx::query(
        "insert into integration_holders (protocol_id, user_address, first_seen_block) \
         values ($1, $2, $3) on conflict (protocol_id, user_address) do nothing",
    )
    .bind(&protocol_id.0)
    .bind(addr_to_db(&user_address))
    .bind(block as i64)
    .execute(&db.pool)
    .await?;
    Ok(())
}

pub async fn holders_for_protocol(db: &Db, protocol_id: &ProtocolId) -> Result<Vec<Address>, StoreError> {
    let rows: Vec<(String,)> =
        sqlx::query_as("select user_address from integration_holders where protocol_id = $1")
            .bind(&protocol_id.0)
            .fetch_all(&db.pool)
            .await?;
    rows.into_iter().map(|(a,)| addr_from_db(&a)).collect()
}

pub async fn upsert(db: &Db, position: &IntegrationPosition) -> Result<(), StoreError> {
    sqlx::query(
        "insert into integration_positions \
         (protocol_id, user_address, underlying_asset, position_shares, underlying_xtoken_amount, block_number, ts) \
         values ($1, $2, $3, $4, $5, $6, $7) \
         on conflict (protocol_id, user_address) do update set \
           underlying_asset = excluded.underlying_asset, \
           position_shares = excluded.position_shares, \
           underlying_xtoken_amount = excluded.underlying_xtoken_amount, \
           block_number = excluded.block_number, \
           ts = excluded.ts \
         where excluded.block_number >= integration_positions.block_number",
    )
    .bind(&position.protocol_id.0)
    .bind(addr_to_db(&position.user_address))
    .bind(asset_to_db(position.underlying_asset))
    .bind(amount_to_db(&position.position_shares))
    .bind(amount_to_db(&position.underlying_xtoken_amount))
    .bind(position.block_number as i64)
    .bind(position.timestamp)
    .execute(&db.pool)
    .await?;
    Ok(())
}

type PositionRow = (String, String, String, String, String, i64, chrono::DateTime<chrono::Utc>);

fn row_to_position(row: PositionRow) -> Result<IntegrationPosition, StoreError> {
    let (protocol_id, user_address, underlying_asset, position_shares, underlying_xtoken_amount, block_number, ts) = row;
    Ok(IntegrationPosition {
        protocol_id: ProtocolId(protocol_id),
        user_address: addr_from_db(&user_address)?,
        underlying_asset: asset_from_db(&underlying_asset)?,
        position_shares: amount_from_db(&position_shares)?,
        underlying_xtoken_amount: amount_from_db(&underlying_xtoken_amount)?,
        block_number: block_number as u64,
        timestamp: ts,
    })
}

pub async fn for_user(db: &Db, user_address: Address) -> Result<Vec<IntegrationPosition>, StoreError> {
    let rows = sqlx::query_as::<Postgres, PositionRow>(
        "select protocol_id, user_address, underlying_asset, position_shares, underlying_xtoken_amount, block_number, ts \
         from integration_positions where user_address = $1",
    )
    .bind(addr_to_db(&user_address))
    .fetch_all(&db.pool)
    .await?;
    rows.into_iter().map(row_to_position).collect()
}

pub async fn all(db: &Db) -> Result<Vec<IntegrationPosition>, StoreError> {
    let rows = sqlx::query_as::<Postgres, PositionRow>(
        "select protocol_id, user_address, underlying_asset, position_shares, underlying_xtoken_amount, block_number, ts \
         from integration_positions",
    )
    .fetch_all(&db.pool)
    .await?;
    rows.into_iter().map(row_to_position).collect()
}
