//! C8 persistence: cached `OraclePrice` rows keyed by (asset, chain_id,
//! block_number). A cache hit avoids re-deriving a price that was already
//! resolved for this exact block.

use crate::codec::*;
use crate::db::Db;
use droplets_common::error::StoreError;
use droplets_common::model::{OraclePrice, PriceSource};
use droplets_common::{AssetSymbol, ChainId};
use sqlx::Postgres;

fn source_to_db(source: PriceSource) -> &'static str {
    match source {
        PriceSource::Onchain => "onchain",
        PriceSource::Cache => "cache",
        PriceSource::Fallback => "fallback",
    }
}

fn source_from_db(s: &str) -> Result<PriceSource, StoreError> {
    Ok(match s {
        "onchain" => PriceSource::Onchain,
        "cache" => PriceSource::Cache,
        "fallback" => PriceSource::Fallback,
        other => return Err(StoreError::Invariant(format!("unknown price source: {other}"))),
    })
}

pub async fn insert(db: &Db, price: &OraclePrice) -> Result<(), StoreError> {
    sqlx::query(
        "insert into oracle_prices (asset, chain_id, block_number, ts, price_usd, scale, source) \
         values ($1, $2, $3, $4, $5, $6, $7) \
         on conflict (asset, chain_id, block_number) do nothing",
    )
    .bind(asset_to_db(price.asset))
    .bind(chain_id_to_db(price.chain_id))
    .bind(price.block_number as i64)
    .bind(price.timestamp)
    .bind(amount_to_db(&price.price_usd))
    .bind(price.scale as i16)
    .bind(source_to_db(price.source))
    .execute(&db.pool)
    .await?;
    Ok(())
}

type PriceRow = (String, i64, i64, chrono::DateTime<chrono::Utc>, String, i16, String);

fn row_to_price(row: PriceRow) -> Result<OraclePrice, StoreError> {
    let (asset, chain_id, block_number, ts, price_usd, scale, source) = row;
    Ok(OraclePrice {
        asset: asset_from_db(&asset)?,
        chain_id: chain_id_from_db(chain_id),
        block_number: block_number as u64,
        timestamp: ts,
        price_usd: amount_from_db(&price_usd)?,
        scale: scale as u8,
        source: source_from_db(&source)?,
    })
}

/// Exact cache hit for (asset, chain_id, block_number).
pub async fn get_at_block(
    db: &Db,
    asset: AssetSymbol,
    chain_id: ChainId,
    block_number: u64,
) -> Result<Option<OraclePrice>, StoreError> {
    let row = sqlx::query_as::<Postgres, PriceRow>(
        "select asset, chain_id, block_number, ts, price_usd, scale, source \
         from oracle_prices where asset = $1 and chain_id = $2 and block_number = $3",
    )
    .bind(asset_to_db(asset))
    .bind(chain_id_to_db(chain_id))
    .bind(block_number as i64)
    .fetch_optional(&db.pool)
    .await?;
    row.map(row_to_price).transpose()
}

/// Nearest cached price at or before `timestamp`, used to check staleness
/// before falling back to a fresh on-chain read (§4.6).
pub async fn latest_at_or_before(
    db: &Db,
    asset: AssetSymbol,
    chain_id: ChainId,
    timestamp: chrono::DateTime<chrono::Utc>,
) -> Result<Option<OraclePrice>, StoreError> {
    let row = sqlx::query_as::<Postgres, PriceRow>(
        "select asset, chain_id, block_number, ts, price_usd, scale, source \
         from oracle_prices where asset = $1 and chain_id = $2 and ts <= $3 \
         order by ts desc limit 1",
    )
    .bind(asset_to_db(asset))
    .bind(chain_id_to_db(chain_id))
    .bind(timestamp)
    .fetch_optional(&db.pool)
    .await?;
    row.map(row_to_price).transpose()
}
