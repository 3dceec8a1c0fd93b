//! The cooperative task that keeps one integration contract's holder set and
//! positions current, mirroring `droplets_ingest::task::ContractTask`'s shape
//! (§5: one long-lived task per tracked contract) but for C9's read side
//! rather than C5/C6's canonical event stream: holder discovery reuses C3's
//! cursor store so a restart resumes exactly where it left off, and position
//! refresh runs on its own cadence against the latest safe block rather than
//! once per log.

use crate::adapter::IntegrationAdapter;
use crate::{discovery, positions};
use chrono::Utc;
use droplets_chain::transport::{ChainTransport, LogFilter};
use droplets_common::model::{ChainId, Cursor, ProtocolId};
use droplets_common::StoreError;
use droplets_store::Db;
use ethers::types::Address;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

pub struct IntegrationTask {
    pub chain_id: ChainId,
    pub protocol_id: ProtocolId,
    pub contract_address: Address,
    pub deploy_block: u64,
    pub confirmations: u64,
    pub batch_size: u64,
    pub poll_interval: Duration,
    pub position_refresh_interval: Duration,
    pub transport: Arc<dyn ChainTransport>,
    pub db: Db,
    pub adapter: Arc<dyn IntegrationAdapter>,
}

impl IntegrationTask {
    /// Runs until `shutdown` fires: each iteration discovers new holders from
    /// fresh logs, then refreshes every known holder's position if the
    /// refresh interval has elapsed.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut last_refresh = Instant::now() - self.position_refresh_interval;

        loop {
            if *shutdown.borrow() {
                return;
            }

            match self.run_iteration(&mut last_refresh).await {
                Ok(()) => {}
                Err(err) => {
                    tracing::warn!(
                        %self.protocol_id,
                        chain_id = %self.chain_id,
                        error = %err,
                        "integration task iteration failed, retrying"
                    );
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = shutdown.changed() => {}
            }
        }
    }

    async fn run_iteration(&self, last_refresh: &mut Instant) -> Result<(), IntegrationTaskError> {
        let latest = self.transport.block_number().await?;
        let safe = latest.saturating_sub(self.confirmations);

        let cursor = droplets_store::cursor::load(&self.db, self.chain_id, self.contract_address)
            .await?
            .unwrap_or_else(|| Cursor::genesis(self.chain_id, self.contract_address, self.deploy_block));

        // Re-fetch the cursor's own block: `is_before_or_at` below filters out
        // logs already applied, so `+ 1` here would skip any log past the
        // cursor's tie-breaker but still in the same block after a restart.
        let from = cursor.last_safe_block;
        if from <= safe {
            let to = (from + self.batch_size - 1).min(safe);
            let mut logs = self
                .transport
                .get_logs(LogFilter { address: self.contract_address, from_block: from, to_block: to, topics: vec![] })
                .await?;
            logs.sort_by_key(|l| (l.block_number, l.transaction_index, l.log_index));

            let mut last_applied: Option<&droplets_chain::transport::RawLog> = None;
            for log in &logs {
                if cursor.is_before_or_at(log.block_number, log.transaction_hash, log.log_index) {
                    continue;
                }
                if discovery::is_transfer_log(log) {
                    discovery::record_transfer(&self.db, &self.protocol_id, log).await?;
                }
                last_applied = Some(log);
            }

            if let Some(log) = last_applied {
                let mut tx = self.db.pool.begin().await.map_err(StoreError::from)?;
                droplets_store::cursor::advance(
                    &mut tx,
                    &Cursor {
                        chain_id: self.chain_id,
                        contract_address: self.contract_address,
                        last_safe_block: log.block_number,
                        last_tx_hash: log.transaction_hash,
                        last_log_index: log.log_index,
                        updated_at: Utc::now(),
                    },
                )
                .await?;
                tx.commit().await.map_err(StoreError::from)?;
            }
        }

        if last_refresh.elapsed() >= self.position_refresh_interval {
            let updated = positions::refresh_positions(&self.db, self.transport.as_ref(), self.adapter.as_ref(), safe)
                .await?;
            tracing::info!(%self.protocol_id, chain_id = %self.chain_id, block = safe, updated, "refreshed integration positions");
            *last_refresh = Instant::now();
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
enum IntegrationTaskError {
    #[error(transparent)]
    Rpc(#[from] droplets_common::RpcError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
