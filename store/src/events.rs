//! Raw, append-only `ShareEvent` rows. Unique on (chain_id, tx_hash, log_index);
//! duplicate ingestion is a no-op (§7, §8 idempotency).

use crate::codec::*;
use crate::db::Db;
use droplets_common::error::StoreError;
use droplets_common::model::{Classification, EventType, ShareEvent};
use sqlx::Postgres;

fn event_type_to_db(e: EventType) -> &'static str {
    e.as_str()
}

fn event_type_from_db(s: &str) -> Result<EventType, StoreError> {
    Ok(match s {
        "stake" => EventType::Stake,
        "unstake" => EventType::Unstake,
        "redeem" => EventType::Redeem,
        "instant_unstake" => EventType::InstantUnstake,
        "transfer" => EventType::Transfer,
        "bridge_in" => EventType::BridgeIn,
        "bridge_out" => EventType::BridgeOut,
        other => return Err(StoreError::Invariant(format!("unknown event_type: {other}"))),
    })
}

fn classification_to_db(c: Classification) -> &'static str {
    c.as_str()
}

fn classification_from_db(s: &str) -> Result<Classification, StoreError> {
    Ok(match s {
        "mint" => Classification::Mint,
        "burn_unstake" => Classification::BurnUnstake,
        "bridge_burn" => Classification::BridgeBurn,
        "bridge_mint" => Classification::BridgeMint,
        "integration_in" => Classification::IntegrationIn,
        "integration_out" => Classification::IntegrationOut,
        "transfer_user" => Classification::TransferUser,
        other => return Err(StoreError::Invariant(format!("unknown classification: {other}"))),
    })
}

/// Inserts the event within the caller's transaction. `on conflict do nothing`
/// makes re-ingestion of an already-seen (chain_id, tx_hash, log_index) a
/// true no-op, satisfying the idempotency invariant in §8.
pub async fn insert(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    event: &ShareEvent,
) -> Result<(), StoreError> {
    sqlx::query(
        "insert into share_events \
         (chain_id, tx_hash, log_index, address, asset, event_type, shares_delta, block_number, ts, round_id, classification) \
         values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
         on conflict (chain_id, tx_hash, log_index) do nothing",
    )
    .bind(chain_id_to_db(event.chain_id))
    .bind(h256_to_db(&event.tx_hash))
    .bind(event.log_index as i64)
    .bind(addr_to_db(&event.address))
    .bind(asset_to_db(event.asset))
    .bind(event_type_to_db(event.event_type))
    .bind(signed_amount_to_db(&event.shares_delta))
    .bind(event.block as i64)
    .bind(event.timestamp)
    .bind(event.round_id.map(|r| r as i64))
    .bind(classification_to_db(event.classification))
    .execute(&mut **tx)
    .await?;

    Ok(())
}

type EventRow = (
    i64,
    String,
    i64,
    String,
    String,
    String,
    String,
    i64,
    chrono::DateTime<chrono::Utc>,
    Option<i64>,
    String,
);

fn row_to_event(row: EventRow) -> Result<ShareEvent, StoreError> {
    let (chain_id, tx_hash, log_index, address, asset, event_type, shares_delta, block, ts, round_id, classification) = row;
    Ok(ShareEvent {
        chain_id: chain_id_from_db(chain_id),
        tx_hash: h256_from_db(&tx_hash)?,
        log_index: log_index as u64,
        address: addr_from_db(&address)?,
        asset: asset_from_db(&asset)?,
        event_type: event_type_from_db(&event_type)?,
        shares_delta: signed_amount_from_db(&shares_delta)?,
        block: block as u64,
        timestamp: ts,
        round_id: round_id.map(|r| r as u64),
        classification: classification_from_db(&classification)?,
    })
}

/// All events for a (address, asset, chain) triple, in canonical
/// (block, log_index) order — used by the sum-of-deltas property in §8 and by
/// crash-recovery backfills.
pub async fn for_balance_triple(
    db: &Db,
    address: ethers::types::Address,
    asset: droplets_common::AssetSymbol,
    chain_id: droplets_common::ChainId,
) -> Result<Vec<ShareEvent>, StoreError> {
    let rows = sqlx::query_as::<Postgres, EventRow>(
        "select chain_id, tx_hash, log_index, address, asset, event_type, shares_delta, block_number, ts, round_id, classification \
         from share_events \
         where address = $1 and asset = $2 and chain_id = $3 \
         order by block_number, log_index",
    )
    .bind(addr_to_db(&address))
    .bind(asset_to_db(asset))
    .bind(chain_id_to_db(chain_id))
    .fetch_all(&db.pool)
    .await?;

    rows.into_iter().map(row_to_event).collect()
}

/// Vault-side legs already classified as crossing an integration boundary
/// (`integration_in`/`integration_out`) within a block range on one chain —
/// the half of C12's reconciliation input that comes from canonical storage
/// rather than a fresh log fetch against the integration contracts.
pub async fn integration_legs_in_range(
    db: &Db,
    chain_id: droplets_common::ChainId,
    from_block: u64,
    to_block: u64,
) -> Result<Vec<ShareEvent>, StoreError> {
    let rows = sqlx::query_as::<Postgres, EventRow>(
        "select chain_id, tx_hash, log_index, address, asset, event_type, shares_delta, block_number, ts, round_id, classification \
         from share_events \
         where chain_id = $1 and block_number between $2 and $3 \
           and classification in ('integration_in', 'integration_out') \
         order by block_number, log_index",
    )
    .bind(chain_id_to_db(chain_id))
    .bind(from_block as i64)
    .bind(to_block as i64)
    .fetch_all(&db.pool)
    .await?;

    rows.into_iter().map(row_to_event).collect()
}

/// Every raw event in canonical chain order, used to replay state from empty
/// (§8 replay-determinism property).
pub async fn all_in_canonical_order(db: &Db) -> Result<Vec<ShareEvent>, StoreError> {
    let rows = sqlx::query_as::<Postgres, EventRow>(
        "select chain_id, tx_hash, log_index, address, asset, event_type, shares_delta, block_number, ts, round_id, classification \
         from share_events \
         order by chain_id, block_number, log_index",
    )
    .fetch_all(&db.pool)
    .await?;

    rows.into_iter().map(row_to_event).collect()
}
