//! C4: the per-(chain, contract) cooperative ingestion loop of §4.2, wired
//! up to C5's decoder/classifier, C6's folder and C7's round store.

use crate::decode::{self, RawEvent};
use crate::signatures;
use crate::translate::{self, TranslatedEvent};
use crate::{ClassifyContext, IngestError};
use chrono::{DateTime, Utc};
use droplets_chain::transport::{ChainTransport, LogFilter, RawLog};
use droplets_common::model::{Cursor, Round};
use droplets_common::{Amount, AssetSymbol, ChainId, SignedAmount, StoreError};
use droplets_store::Db;
use ethers::types::{Address, H256};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Everything one ingestion task needs about the (chain, contract, asset) it
/// is responsible for. One of these runs per entry in the Chain Registry's
/// `contracts_to_track()` (§5: one long-lived task per chain/contract pair).
pub struct ContractTask {
    pub chain_id: ChainId,
    pub canonical_chain_id: ChainId,
    pub contract_address: Address,
    pub asset: AssetSymbol,
    pub deploy_block: u64,
    pub pps_scale: u8,
    pub confirmations: u64,
    pub batch_size: u64,
    pub poll_interval: Duration,
    pub transport: Arc<dyn ChainTransport>,
    pub db: Db,
    pub integration_addresses: Vec<Address>,
    pub is_excluded: Arc<dyn Fn(Address) -> bool + Send + Sync>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationOutcome {
    /// Nothing new to do: either the safe tip hasn't advanced past the
    /// cursor, or the fetched batch contained nothing past it.
    Idle,
    /// Processed at least one log. `caught_up` is true once the batch's
    /// `to_block` reached the chain's current safe tip.
    Progressed { processed: usize, caught_up: bool },
}

impl ContractTask {
    fn is_canonical(&self) -> bool {
        self.chain_id == self.canonical_chain_id
    }

    /// Runs the task's loop until `shutdown` is signalled. Per §5, each log
    /// commits its own transaction, so there is never a partially-applied
    /// batch left behind when the signal lands mid-iteration.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                return;
            }

            let sleep_for = match self.run_iteration().await {
                Ok(IterationOutcome::Idle) => Some(self.poll_interval),
                Ok(IterationOutcome::Progressed { caught_up, .. }) => caught_up.then_some(self.poll_interval),
                Err(err) => {
                    tracing::warn!(
                        chain_id = %self.chain_id,
                        contract = %format!("{:#x}", self.contract_address),
                        asset = %self.asset,
                        error = %err,
                        "ingest iteration failed, retrying"
                    );
                    Some(Duration::from_secs(5))
                }
            };

            if let Some(duration) = sleep_for {
                tokio::select! {
                    _ = tokio::time::sleep(duration) => {}
                    _ = shutdown.changed() => {}
                }
            }
        }
    }

    /// One pass of §4.2's six steps. Never advances the cursor ahead of the
    /// last log it actually applied.
    pub async fn run_iteration(&self) -> Result<IterationOutcome, IngestError> {
        let latest = self.transport.block_number().await?;
        let safe = latest.saturating_sub(self.confirmations);

        let cursor = droplets_store::cursor::load(&self.db, self.chain_id, self.contract_address)
            .await?
            .unwrap_or_else(|| Cursor::genesis(self.chain_id, self.contract_address, self.deploy_block));

        // Re-fetch the cursor's own block: `process_log` commits per-log, so a
        // crash can leave the cursor pointing partway through a block with
        // logs after it still unapplied. `from + 1` would skip those; the
        // `is_before_or_at` filter below drops whatever was already applied.
        let from = cursor.last_safe_block;
        if from > safe {
            return Ok(IterationOutcome::Idle);
        }
        let to = (from + self.batch_size - 1).min(safe);

        let mut logs = self
            .transport
            .get_logs(LogFilter { address: self.contract_address, from_block: from, to_block: to, topics: vec![] })
            .await?;
        logs.sort_by_key(|l| (l.block_number, l.transaction_index, l.log_index));

        let oft_txs = oft_marked_transactions(&logs);

        let mut processed = 0usize;
        for log in &logs {
            if cursor.is_before_or_at(log.block_number, log.transaction_hash, log.log_index) {
                continue;
            }
            let oft_event_in_same_tx = oft_txs.contains(&log.transaction_hash);
            self.process_log(log, oft_event_in_same_tx).await?;
            processed += 1;
        }

        Ok(IterationOutcome::Progressed { processed, caught_up: to >= safe })
    }

    /// Decodes, classifies, folds and advances the cursor for one log, all
    /// inside a single transaction so the cursor moves exactly together with
    /// the effects it represents (§4.2, §8).
    async fn process_log(&self, log: &RawLog, oft_event_in_same_tx: bool) -> Result<(), IngestError> {
        let decoded = match decode::decode_log(log) {
            Ok(decoded) => decoded,
            Err(err) => {
                // §7: decode failures are counted and logged, never fatal.
                tracing::warn!(
                    chain_id = %self.chain_id,
                    tx_hash = %log.transaction_hash,
                    log_index = log.log_index,
                    error = %err,
                    "dropping malformed log"
                );
                None
            }
        };

        let mut tx = self.db.pool.begin().await.map_err(StoreError::from)?;

        match &decoded {
            Some(RawEvent::RoundRolled(r)) => self.apply_round_rolled(&mut tx, log, r).await?,
            Some(RawEvent::OftSent(_)) | Some(RawEvent::OftReceived(_)) => {
                // Consumed only as the same-tx bridge-pairing signal above; no row of their own.
            }
            Some(raw) => self.apply_share_events(&mut tx, log, raw, oft_event_in_same_tx).await?,
            None => {}
        }

        let new_cursor = Cursor {
            chain_id: self.chain_id,
            contract_address: self.contract_address,
            last_safe_block: log.block_number,
            last_tx_hash: log.transaction_hash,
            last_log_index: log.log_index,
            updated_at: Utc::now(),
        };
        droplets_store::cursor::advance(&mut tx, &new_cursor).await?;

        tx.commit().await.map_err(StoreError::from)?;
        Ok(())
    }

    async fn apply_round_rolled(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        log: &RawLog,
        r: &decode::RoundRolledLog,
    ) -> Result<(), IngestError> {
        if !self.is_canonical() {
            tracing::warn!(chain_id = %self.chain_id, "RoundRolled observed on a non-canonical chain; ignoring");
            return Ok(());
        }

        let header = self.transport.block_by_number(log.block_number).await?;
        let round = Round {
            asset: self.asset,
            round_id: r.round_id,
            start_block: log.block_number,
            start_ts: timestamp_from_unix(header.timestamp),
            end_ts: None,
            pps: Amount(r.pps),
            pps_scale: self.pps_scale,
            shares_minted: Amount(r.shares_minted),
            yield_amount: SignedAmount(r.yield_amount),
            is_yield_positive: r.is_yield_positive,
            tx_hash: log.transaction_hash,
        };

        droplets_balances::rounds::roll_round(tx, self.chain_id, &round).await?;
        droplets_balances::folder::snapshot_round_start(
            tx,
            &self.db,
            self.asset,
            self.chain_id,
            round.round_id,
            |addr| (self.is_excluded)(addr),
        )
        .await?;
        Ok(())
    }

    async fn apply_share_events(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        log: &RawLog,
        raw: &RawEvent,
        oft_event_in_same_tx: bool,
    ) -> Result<(), IngestError> {
        let header = self.transport.block_by_number(log.block_number).await?;
        let timestamp = timestamp_from_unix(header.timestamp);

        let round_id = if self.is_canonical() {
            droplets_store::rounds::covering_block(&self.db, self.asset, self.canonical_chain_id, log.block_number)
                .await?
                .map(|round| round.round_id)
        } else {
            None
        };

        let ctx = ClassifyContext {
            contract_address: self.contract_address,
            is_canonical_chain: self.is_canonical(),
            oft_event_in_same_tx,
            integration_addresses: &self.integration_addresses,
        };

        let events = translate::translate(
            raw,
            &ctx,
            self.chain_id,
            self.asset,
            log.transaction_hash,
            log.log_index,
            log.block_number,
            timestamp,
            round_id,
        );

        for TranslatedEvent { share_event, apply_to_balance } in &events {
            droplets_store::events::insert(tx, share_event).await?;
            if *apply_to_balance {
                droplets_balances::folder::apply_event(tx, share_event).await?;
            }
            if let Some(round_id) = share_event.round_id {
                droplets_balances::folder::flag_round_activity(
                    tx,
                    share_event.address,
                    share_event.asset,
                    round_id,
                    &share_event.event_type,
                )
                .await?;
            }
        }
        Ok(())
    }
}

fn oft_marked_transactions(logs: &[RawLog]) -> HashSet<H256> {
    logs.iter()
        .filter(|log| matches!(log.topics.first(), Some(t) if *t == signatures::OFT_SENT || *t == signatures::OFT_RECEIVED))
        .map(|log| log.transaction_hash)
        .collect()
}

fn timestamp_from_unix(secs: u64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs as i64, 0).unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::abi::{encode, Token};
    use ethers::types::U256;

    fn address_to_topic(address: Address) -> H256 {
        let mut bytes = [0u8; 32];
        bytes[12..].copy_from_slice(address.as_bytes());
        H256(bytes)
    }

    fn transfer_log(from: Address, to: Address, value: u64, block: u64, tx_index: u64, log_index: u64) -> RawLog {
        RawLog {
            address: Address::from_low_u64_be(999),
            topics: vec![signatures::TRANSFER, address_to_topic(from), address_to_topic(to)],
            data: encode(&[Token::Uint(U256::from(value))]).into(),
            block_number: block,
            transaction_hash: H256::from_low_u64_be(block * 100 + tx_index),
            transaction_index: tx_index,
            log_index,
        }
    }

    #[test]
    fn oft_marked_transactions_picks_up_same_tx_logs() {
        let oft_log = RawLog {
            address: Address::zero(),
            topics: vec![signatures::OFT_SENT, H256::zero(), H256::zero()],
            data: vec![].into(),
            block_number: 10,
            transaction_hash: H256::from_low_u64_be(42),
            transaction_index: 0,
            log_index: 0,
        };
        let mut transfer = transfer_log(Address::zero(), Address::from_low_u64_be(1), 5, 10, 0, 1);
        transfer.transaction_hash = H256::from_low_u64_be(42);

        let marked = oft_marked_transactions(&[oft_log, transfer]);
        assert!(marked.contains(&H256::from_low_u64_be(42)));
    }

    #[test]
    fn oft_marked_transactions_ignores_unrelated_tx() {
        let oft_log = RawLog {
            address: Address::zero(),
            topics: vec![signatures::OFT_RECEIVED, H256::zero(), H256::zero()],
            data: vec![].into(),
            block_number: 10,
            transaction_hash: H256::from_low_u64_be(1),
            transaction_index: 0,
            log_index: 0,
        };
        let transfer = transfer_log(Address::zero(), Address::from_low_u64_be(1), 5, 10, 1, 1);

        let marked = oft_marked_transactions(&[oft_log, transfer.clone()]);
        assert!(!marked.contains(&transfer.transaction_hash));
    }
}
