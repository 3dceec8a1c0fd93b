//! C8: `priceAt(asset, t)`, `priceAtBlock(asset, block, chain)`, and the
//! staleness check `validate(asset, maxAgeSec)`.

use crate::aggregator;
use chrono::{DateTime, Duration, Utc};
use droplets_chain::transport::ChainTransport;
use droplets_common::error::OracleError;
use droplets_common::model::{OraclePrice, PriceSource};
use droplets_common::{Amount, AssetSymbol, ChainId};
use droplets_store::Db;
use ethers::types::Address;

/// Chainlink prices are reported at 8 decimals.
pub const AGGREGATOR_SCALE: u8 = 8;

/// A cache hit within this window of the requested timestamp is considered
/// "the same price" and is returned without a fresh RPC round trip (§4.6
/// step 1).
const CACHE_WINDOW: Duration = Duration::hours(1);

const BINARY_SEARCH_MAX_ITERATIONS: u32 = 30;

pub struct OracleService<'a> {
    transport: &'a dyn ChainTransport,
    db: &'a Db,
    canonical_chain_id: ChainId,
}

impl<'a> OracleService<'a> {
    pub fn new(transport: &'a dyn ChainTransport, db: &'a Db, canonical_chain_id: ChainId) -> Self {
        OracleService { transport, db, canonical_chain_id }
    }

    /// §4.6: cached hit within ±1h, else binary-search the closest Chain-E
    /// block to `t`, read the aggregator there, cache, and return.
    pub async fn price_at(
        &self,
        asset: AssetSymbol,
        aggregator: Address,
        t: DateTime<Utc>,
    ) -> Result<OraclePrice, OracleError> {
        if let Some(cached) = droplets_store::oracle::latest_at_or_before(self.db, asset, self.canonical_chain_id, t + CACHE_WINDOW)
            .await?
        {
            if (cached.timestamp - t).abs() <= CACHE_WINDOW {
                return Ok(OraclePrice { source: PriceSource::Cache, ..cached });
            }
        }

        let block = self.find_block_for_timestamp(t).await?;
        let round = aggregator::latest_round_data(self.transport, aggregator, block).await?;
        let header = self.transport.block_by_number(block).await?;

        let price = OraclePrice {
            asset,
            chain_id: self.canonical_chain_id,
            block_number: block,
            timestamp: DateTime::from_timestamp(header.timestamp as i64, 0).unwrap_or(t),
            price_usd: Amount(round.answer.into_raw()),
            scale: AGGREGATOR_SCALE,
            source: PriceSource::Onchain,
        };

        droplets_store::oracle::insert(self.db, &price).await?;
        Ok(price)
    }

    /// §4.6 dedicated path: reads the aggregator using the given block's own
    /// Chain-E timestamp rather than binary-searching for one.
    pub async fn price_at_block(
        &self,
        asset: AssetSymbol,
        aggregator: Address,
        block: u64,
    ) -> Result<OraclePrice, OracleError> {
        if let Some(cached) = droplets_store::oracle::get_at_block(self.db, asset, self.canonical_chain_id, block).await? {
            return Ok(OraclePrice { source: PriceSource::Cache, ..cached });
        }

        let header = self.transport.block_by_number(block).await?;
        let round = aggregator::latest_round_data(self.transport, aggregator, block).await?;

        let price = OraclePrice {
            asset,
            chain_id: self.canonical_chain_id,
            block_number: block,
            timestamp: DateTime::from_timestamp(header.timestamp as i64, 0)
                .unwrap_or_else(Utc::now),
            price_usd: Amount(round.answer.into_raw()),
            scale: AGGREGATOR_SCALE,
            source: PriceSource::Onchain,
        };

        droplets_store::oracle::insert(self.db, &price).await?;
        Ok(price)
    }

    /// `validate(asset, maxAgeSec)`: false if the latest cached price is
    /// older than `maxAgeSec` as of now.
    pub async fn validate(&self, asset: AssetSymbol, max_age_sec: i64) -> Result<bool, OracleError> {
        let now = Utc::now();
        match droplets_store::oracle::latest_at_or_before(self.db, asset, self.canonical_chain_id, now).await? {
            None => Ok(false),
            Some(price) => {
                let age = (now - price.timestamp).num_seconds();
                Ok(age <= max_age_sec)
            }
        }
    }

    /// Binary-search blocks on Chain-E for the one whose timestamp is
    /// closest to `t`, bounded at 30 iterations (§4.6 step 2, §5 timeouts).
    async fn find_block_for_timestamp(&self, t: DateTime<Utc>) -> Result<u64, OracleError> {
        let target = t.timestamp();
        let mut low = 0u64;
        let mut high = self.transport.block_number().await?;

        let mut best = high;
        let mut converged = low >= high;
        for _ in 0..BINARY_SEARCH_MAX_ITERATIONS {
            if low >= high {
                converged = true;
                break;
            }
            let mid = low + (high - low) / 2;
            let header = self.transport.block_by_number(mid).await?;
            best = mid;
            match (header.timestamp as i64).cmp(&target) {
                std::cmp::Ordering::Equal => return Ok(mid),
                std::cmp::Ordering::Less => low = mid + 1,
                std::cmp::Ordering::Greater => {
                    if mid == 0 {
                        converged = true;
                        break;
                    }
                    high = mid - 1;
                }
            }
        }

        if converged || low >= high {
            Ok(best)
        } else {
            Err(OracleError::SearchDidNotConverge(BINARY_SEARCH_MAX_ITERATIONS))
        }
    }
}
