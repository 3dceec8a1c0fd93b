//! Runs C12 on a recurring schedule over a trailing block window per
//! integration contract, logging counts and full context for any unmatched
//! record (§4.10: "the validator never mutates canonical tables" — this is
//! purely an observability pass, not a correction mechanism).

use droplets_chain::transport::ChainTransport;
use droplets_common::model::IntegrationContractConfig;
use droplets_common::ChainId;
use droplets_store::Db;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// How many blocks back from the current safe tip each pass checks. Wide
/// enough to catch an integration event whose vault-side leg landed a few
/// blocks earlier in a different contract's ingestion cadence.
const RECONCILE_WINDOW_BLOCKS: u64 = 50_000;

pub struct ReconciliationPlan {
    pub db: Db,
    pub integration_contracts: Vec<IntegrationContractConfig>,
    pub transports: HashMap<ChainId, Arc<dyn ChainTransport>>,
    pub interval: Duration,
}

pub async fn run(plan: ReconciliationPlan, mut shutdown: watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            return;
        }

        tokio::select! {
            _ = tokio::time::sleep(plan.interval) => {}
            _ = shutdown.changed() => continue,
        }
        if *shutdown.borrow() {
            return;
        }

        for contract in &plan.integration_contracts {
            let Some(transport) = plan.transports.get(&contract.chain_id) else { continue };
            let latest = match transport.block_number().await {
                Ok(b) => b,
                Err(err) => {
                    tracing::warn!(protocol = %contract.protocol_id.0, error = %err, "reconciliation: block_number failed, skipping pass");
                    continue;
                }
            };
            let from = latest.saturating_sub(RECONCILE_WINDOW_BLOCKS).max(contract.deploy_block);
            if from >= latest {
                continue;
            }

            match droplets_reconcile::reconcile_contract(&plan.db, transport.clone(), contract, from, latest).await {
                Ok(outcome) => {
                    if !outcome.unmatched_legs.is_empty() || !outcome.unmatched_events.is_empty() {
                        tracing::warn!(
                            protocol = %contract.protocol_id.0,
                            from_block = from,
                            to_block = latest,
                            matched = outcome.matched.len(),
                            unmatched_legs = outcome.unmatched_legs.len(),
                            unmatched_events = outcome.unmatched_events.len(),
                            "reconciliation found unmatched records"
                        );
                    } else {
                        tracing::info!(
                            protocol = %contract.protocol_id.0,
                            from_block = from,
                            to_block = latest,
                            matched = outcome.matched.len(),
                            "reconciliation pass clean"
                        );
                    }
                }
                Err(err) => {
                    tracing::warn!(protocol = %contract.protocol_id.0, error = %err, "reconciliation pass failed");
                }
            }
        }
    }
}
