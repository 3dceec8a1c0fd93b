//! C6: folds a classified `ShareEvent` into `CurrentBalance` and, at round
//! boundaries, `BalanceSnapshot`. Every mutation runs inside the caller's
//! transaction using `balances::lock_for_update` so the read-modify-write is
//! atomic with the event's own insert (§5).

use droplets_common::error::StoreError;
use droplets_common::model::{Classification, ShareEvent};
use droplets_common::{Amount, AssetSymbol, ChainId};
use droplets_store::balances::{self, RoundFlagKind};
use ethers::types::Address;
use sqlx::Postgres;

/// Applies one classified event's effect on `CurrentBalance`, per the rules
/// in §4.5. Negative results are refused: the event is still persisted by the
/// caller (append-only), but the balance row is left unchanged and an error
/// is logged, since that indicates missing mint history before the cursor's
/// start block.
pub async fn apply_event(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    event: &ShareEvent,
) -> Result<(), StoreError> {
    match event.classification {
        Classification::Mint | Classification::IntegrationIn | Classification::BridgeMint => {
            credit(tx, event.address, event.asset, event.chain_id, event.shares_delta.unsigned_abs(), event.block).await
        }
        Classification::BurnUnstake | Classification::IntegrationOut | Classification::BridgeBurn => {
            debit(tx, event.address, event.asset, event.chain_id, event.shares_delta.unsigned_abs(), event.block).await
        }
        Classification::TransferUser => {
            // The decoder/classifier is expected to emit one ShareEvent per
            // side of a transfer_user transfer (sender with a negative delta,
            // receiver with a positive one); each is folded independently.
            if event.shares_delta.is_negative() {
                debit(tx, event.address, event.asset, event.chain_id, event.shares_delta.unsigned_abs(), event.block).await
            } else {
                credit(tx, event.address, event.asset, event.chain_id, event.shares_delta.unsigned_abs(), event.block).await
            }
        }
    }
}

async fn credit(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    address: Address,
    asset: AssetSymbol,
    chain_id: ChainId,
    delta: Amount,
    block: u64,
) -> Result<(), StoreError> {
    let current = balances::lock_for_update(tx, address, asset, chain_id).await?;
    let updated = current.checked_add(delta).ok_or_else(|| {
        StoreError::Invariant(format!("balance overflow for {address:#x}/{asset}/{chain_id}"))
    })?;
    balances::write(tx, address, asset, chain_id, updated, block).await
}

async fn debit(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    address: Address,
    asset: AssetSymbol,
    chain_id: ChainId,
    delta: Amount,
    block: u64,
) -> Result<(), StoreError> {
    let current = balances::lock_for_update(tx, address, asset, chain_id).await?;
    match current.checked_sub(delta) {
        Some(updated) => balances::write(tx, address, asset, chain_id, updated, block).await,
        None => {
            tracing::error!(
                address = %format!("{address:#x}"),
                %asset,
                %chain_id,
                "refusing to debit balance below zero; leaving CurrentBalance unchanged, \
                 backfill from the earliest deployment block is required to heal this"
            );
            Ok(())
        }
    }
}

/// Snapshots every positive, non-excluded Chain-E holder of `asset` at the
/// start of a new round (§4.5). Called once per `RoundRolled`, inside the
/// same transaction as the round upsert.
pub async fn snapshot_round_start(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    db: &droplets_store::Db,
    asset: AssetSymbol,
    chain_id: ChainId,
    round_id: u64,
    is_excluded: impl Fn(Address) -> bool,
) -> Result<(), StoreError> {
    let holders = balances::holders_with_positive_balance(db, asset, chain_id).await?;
    for (address, shares) in holders {
        if is_excluded(address) {
            continue;
        }
        balances::insert_snapshot(
            tx,
            &droplets_common::model::BalanceSnapshot {
                address,
                asset,
                round_id,
                shares_at_start: shares,
                flags: Default::default(),
            },
        )
        .await?;
    }
    Ok(())
}

/// Sets the matching `had_*_in_round` flag on the open snapshot row for this
/// (address, asset, round), if one exists — a no-op for excluded addresses or
/// addresses with no open snapshot yet.
pub async fn flag_round_activity(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    address: Address,
    asset: AssetSymbol,
    round_id: u64,
    event_type: &droplets_common::model::EventType,
) -> Result<(), StoreError> {
    use droplets_common::model::EventType;
    let flag = match event_type {
        EventType::Unstake | EventType::InstantUnstake => Some(RoundFlagKind::Unstake),
        EventType::Transfer => Some(RoundFlagKind::Transfer),
        EventType::BridgeIn | EventType::BridgeOut => Some(RoundFlagKind::Bridge),
        _ => None,
    };
    if let Some(flag) = flag {
        balances::mark_flag(tx, address, asset, round_id, flag).await?;
    }
    Ok(())
}
