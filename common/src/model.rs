//! The entities of §3: the data model shared by every component. Raw events and
//! rounds are append-only and canonical; everything else here is derived and
//! rebuildable from them.

use crate::amount::{Amount, SignedAmount};
use chrono::{DateTime, NaiveDate, Utc};
use ethers::types::{Address, H256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the four yield-bearing assets this engine tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetSymbol {
    AEth,
    ABtc,
    AUsd,
    AEur,
}

impl AssetSymbol {
    pub const ALL: [AssetSymbol; 4] = [
        AssetSymbol::AEth,
        AssetSymbol::ABtc,
        AssetSymbol::AUsd,
        AssetSymbol::AEur,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AssetSymbol::AEth => "A_ETH",
            AssetSymbol::ABtc => "A_BTC",
            AssetSymbol::AUsd => "A_USD",
            AssetSymbol::AEur => "A_EUR",
        }
    }
}

impl fmt::Display for AssetSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// EVM chain id. Chain-E is whichever id the [`crate::config::Config`] names as
/// canonical; there is nothing chain-E-specific baked into this type itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChainId(pub u64);

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// (chain_id, contract_address) resume point for the log ingester. C3.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    pub chain_id: ChainId,
    pub contract_address: Address,
    pub last_safe_block: u64,
    pub last_tx_hash: H256,
    pub last_log_index: u64,
    pub updated_at: DateTime<Utc>,
}

impl Cursor {
    pub fn genesis(chain_id: ChainId, contract_address: Address, deploy_block: u64) -> Self {
        Cursor {
            chain_id,
            contract_address,
            last_safe_block: deploy_block.saturating_sub(1),
            last_tx_hash: H256::zero(),
            last_log_index: 0,
            updated_at: Utc::now(),
        }
    }

    /// Tie-break ordering used to decide whether a log has already been applied:
    /// strictly after (last_safe_block, last_tx_hash, last_log_index) within the
    /// same block.
    pub fn is_before_or_at(&self, block: u64, tx_hash: H256, log_index: u64) -> bool {
        if block != self.last_safe_block {
            return block <= self.last_safe_block;
        }
        (tx_hash, log_index) <= (self.last_tx_hash, self.last_log_index)
    }
}

/// What a raw `Transfer` classifies to once C5 applies the rules in §4.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Classification {
    Mint,
    BurnUnstake,
    BridgeBurn,
    BridgeMint,
    IntegrationIn,
    IntegrationOut,
    TransferUser,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Mint => "mint",
            Classification::BurnUnstake => "burn_unstake",
            Classification::BridgeBurn => "bridge_burn",
            Classification::BridgeMint => "bridge_mint",
            Classification::IntegrationIn => "integration_in",
            Classification::IntegrationOut => "integration_out",
            Classification::TransferUser => "transfer_user",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    Stake,
    Unstake,
    Redeem,
    InstantUnstake,
    Transfer,
    BridgeIn,
    BridgeOut,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Stake => "stake",
            EventType::Unstake => "unstake",
            EventType::Redeem => "redeem",
            EventType::InstantUnstake => "instant_unstake",
            EventType::Transfer => "transfer",
            EventType::BridgeIn => "bridge_in",
            EventType::BridgeOut => "bridge_out",
        }
    }
}

/// A canonical, append-only raw event. Unique on (chain_id, tx_hash, log_index).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShareEvent {
    pub chain_id: ChainId,
    pub tx_hash: H256,
    pub log_index: u64,
    pub address: Address,
    pub asset: AssetSymbol,
    pub event_type: EventType,
    pub shares_delta: SignedAmount,
    pub block: u64,
    pub timestamp: DateTime<Utc>,
    pub round_id: Option<u64>,
    pub classification: Classification,
}

/// A contiguous time interval on Chain-E delimited by `RoundRolled` events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Round {
    pub asset: AssetSymbol,
    pub round_id: u64,
    pub start_block: u64,
    pub start_ts: DateTime<Utc>,
    pub end_ts: Option<DateTime<Utc>>,
    pub pps: Amount,
    pub pps_scale: u8,
    pub shares_minted: Amount,
    pub yield_amount: SignedAmount,
    pub is_yield_positive: bool,
    pub tx_hash: H256,
}

/// Eligibility flags captured at round-roll time, consumed by the optional
/// `ELIGIBILITY_ZERO_ON_UNSTAKE` policy in C10.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RoundFlags {
    pub had_unstake_in_round: bool,
    pub had_transfer_in_round: bool,
    pub had_bridge_in_round: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    pub address: Address,
    pub asset: AssetSymbol,
    pub round_id: u64,
    pub shares_at_start: Amount,
    pub flags: RoundFlags,
}

/// (address, asset, chain) live balance. Always non-negative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentBalance {
    pub address: Address,
    pub asset: AssetSymbol,
    pub chain_id: ChainId,
    pub shares: Amount,
    pub last_update_block: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriceSource {
    Onchain,
    Cache,
    Fallback,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OraclePrice {
    pub asset: AssetSymbol,
    pub chain_id: ChainId,
    pub block_number: u64,
    pub timestamp: DateTime<Utc>,
    pub price_usd: Amount,
    pub scale: u8,
    pub source: PriceSource,
}

/// A protocol id for one of the integration adapters in C9.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProtocolId(pub String);

impl fmt::Display for ProtocolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A user's derived exposure through a third-party protocol at a given block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationPosition {
    pub protocol_id: ProtocolId,
    pub user_address: Address,
    pub underlying_asset: AssetSymbol,
    pub position_shares: Amount,
    pub underlying_xtoken_amount: Amount,
    pub block_number: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetUsdBreakdown {
    pub asset: AssetSymbol,
    pub usd_value: Amount,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyUsdSnapshot {
    pub address: Address,
    pub snapshot_date: NaiveDate,
    pub total_usd_value: Amount,
    pub breakdown: Vec<AssetUsdBreakdown>,
    pub had_unstake: bool,
    pub is_excluded: bool,
    pub droplets_earned: Amount,
    pub snapshot_ts: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DropletLedgerEntry {
    pub address: Address,
    pub snapshot_date: NaiveDate,
    pub amount: Amount,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub address: Address,
    pub total_droplets: Amount,
    pub days_participated: u64,
    pub last_snapshot_date: Option<NaiveDate>,
    pub average_daily_usd: Amount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DailyJobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl DailyJobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DailyJobStatus::Pending => "pending",
            DailyJobStatus::Processing => "processing",
            DailyJobStatus::Completed => "completed",
            DailyJobStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyJob {
    pub snapshot_date: NaiveDate,
    pub status: DailyJobStatus,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExcludedAddress {
    pub address: Address,
    pub reason: String,
}

/// Per-chain metadata (C2). One row per chain the engine tracks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chain {
    pub chain_id: ChainId,
    pub name: String,
    pub is_canonical: bool,
    pub confirmations: u64,
    pub batch_size: u64,
    pub poll_interval_secs: u64,
}

/// Per-(asset, chain) contract metadata (C2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetConfig {
    pub asset: AssetSymbol,
    pub chain_id: ChainId,
    pub decimals: u8,
    pub oracle_feed: Address,
    pub contract_address: Address,
    pub deploy_block: u64,
    pub is_oft: bool,
}

/// Which formula an integration adapter (C9) applies to its token's holders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntegrationKind {
    AmmLp,
    Erc4626,
    LendingCToken,
    LendingAToken,
}

/// One registered third-party protocol contract whose holders C9 tracks and
/// whose contract address C2 excludes from ordinary vault-share accounting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationContractConfig {
    pub protocol_id: ProtocolId,
    pub kind: IntegrationKind,
    pub chain_id: ChainId,
    pub contract_address: Address,
    pub underlying_asset: AssetSymbol,
    pub deploy_block: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::Address;

    #[test]
    fn cursor_tie_break_orders_within_block() {
        let cursor = Cursor {
            chain_id: ChainId(1),
            contract_address: Address::zero(),
            last_safe_block: 100,
            last_tx_hash: H256::from_low_u64_be(5),
            last_log_index: 2,
            updated_at: Utc::now(),
        };
        assert!(cursor.is_before_or_at(99, H256::zero(), 0));
        assert!(cursor.is_before_or_at(100, H256::from_low_u64_be(5), 1));
        assert!(cursor.is_before_or_at(100, H256::from_low_u64_be(5), 2));
        assert!(!cursor.is_before_or_at(100, H256::from_low_u64_be(5), 3));
        assert!(!cursor.is_before_or_at(101, H256::zero(), 0));
    }
}
