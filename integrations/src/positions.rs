//! Drives every adapter's `positionsAt(block)` over its known holder set and
//! persists the results, ready for C10 to read at snapshot time.

use crate::adapter::IntegrationAdapter;
use chrono::Utc;
use droplets_chain::transport::ChainTransport;
use droplets_common::error::StoreError;
use droplets_common::model::IntegrationPosition;
use droplets_store::Db;

/// Recomputes every known holder's position for one adapter at `block`.
/// Errors from a single holder's RPC calls are logged and skipped so one bad
/// call doesn't block the rest of the protocol's holder set.
pub async fn refresh_positions(
    db: &Db,
    transport: &dyn ChainTransport,
    adapter: &dyn IntegrationAdapter,
    block: u64,
) -> Result<usize, StoreError> {
    let protocol_id = &adapter.config().protocol_id;
    let holders = droplets_store::integrations::holders_for_protocol(db, protocol_id).await?;

    let mut updated = 0;
    for holder in holders {
        match adapter.position_for_holder(transport, holder, block).await {
            Ok(position) => {
                let row = IntegrationPosition {
                    protocol_id: protocol_id.clone(),
                    user_address: holder,
                    underlying_asset: adapter.config().underlying_asset,
                    position_shares: position.position_shares,
                    underlying_xtoken_amount: position.underlying_xtoken_amount,
                    block_number: block,
                    timestamp: Utc::now(),
                };
                droplets_store::integrations::upsert(db, &row).await?;
                updated += 1;
            }
            Err(err) => {
                tracing::warn!(%protocol_id, holder = %format!("{holder:#x}"), %err, "skipping holder: position refresh failed");
            }
        }
    }

    Ok(updated)
}
