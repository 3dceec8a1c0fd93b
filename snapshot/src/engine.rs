//! C10: the daily job that turns every address's current exposure into a USD
//! value and, from it, a droplet award (§4.8). C11's ledger/leaderboard
//! writes happen inline here, inside the same transaction, per the
//! atomicity requirement: one `snapshot_date`'s rows and its `DailyJob`
//! status flip land in a single commit or not at all.

use chrono::{DateTime, NaiveDate, Utc};
use droplets_chain::ChainRegistry;
use droplets_common::model::{AssetUsdBreakdown, DailyUsdSnapshot, DropletLedgerEntry};
use droplets_common::{Amount, AssetSymbol, Config};
use droplets_oracle::OracleService;
use droplets_store::Db;
use ethers::types::Address;
use std::collections::HashSet;

/// Every USD figure this engine persists (`DailyUsdSnapshot::total_usd_value`,
/// `LeaderboardEntry::average_daily_usd`) is scaled by `10^USD_SCALE`, i.e.
/// six decimal places of a dollar. Droplets are then `floor(total_usd)`, the
/// whole-dollar part, times the configured ratio.
pub const USD_SCALE: u8 = 6;

/// One run's tally, returned to the caller (the node binary logs it).
#[derive(Debug, Clone, Copy, Default)]
pub struct SnapshotSummary {
    pub addresses_processed: usize,
    pub addresses_awarded: usize,
}

pub struct SnapshotEngine<'a> {
    db: &'a Db,
    registry: &'a ChainRegistry,
    oracle: &'a OracleService<'a>,
    config: &'a Config,
}

impl<'a> SnapshotEngine<'a> {
    pub fn new(db: &'a Db, registry: &'a ChainRegistry, oracle: &'a OracleService<'a>, config: &'a Config) -> Self {
        SnapshotEngine { db, registry, oracle, config }
    }

    /// Runs the full snapshot for `snapshot_date` if it hasn't already been
    /// claimed (§4.8: "a given snapshot_date is processed at most once to
    /// completion"). Returns `None` without doing any work if the date is
    /// already `processing` or `completed`.
    pub async fn run(&self, snapshot_date: NaiveDate) -> Result<Option<SnapshotSummary>, droplets_common::SnapshotError> {
        if !droplets_store::snapshot::try_claim(self.db, snapshot_date).await? {
            tracing::info!(%snapshot_date, "snapshot already claimed; skipping");
            return Ok(None);
        }

        match self.run_claimed(snapshot_date).await {
            Ok(summary) => Ok(Some(summary)),
            Err(e) => {
                droplets_store::snapshot::mark_failed(self.db, snapshot_date, &e.to_string()).await?;
                Err(e)
            }
        }
    }

    async fn run_claimed(&self, snapshot_date: NaiveDate) -> Result<SnapshotSummary, droplets_common::SnapshotError> {
        let snapshot_ts = snapshot_date
            .and_hms_opt(0, 0, 0)
            .expect("midnight is always a valid time")
            .and_utc();

        let candidates = self.candidate_addresses().await?;

        let mut tx = self.db.pool.begin().await.map_err(droplets_common::StoreError::from)?;
        let mut summary = SnapshotSummary::default();

        for address in &candidates {
            let snapshot = self.compute_for_address(*address, snapshot_date, snapshot_ts).await?;

            let earns_droplets = !snapshot.droplets_earned.is_zero();

            droplets_store::snapshot::insert_usd_snapshot_tx(&mut tx, &snapshot).await?;

            if earns_droplets {
                let entry = DropletLedgerEntry {
                    address: *address,
                    snapshot_date,
                    amount: snapshot.droplets_earned,
                    reason: "daily_snapshot".to_string(),
                };
                droplets_store::ledger::insert_entry_tx(&mut tx, &entry).await?;
                droplets_store::ledger::apply_to_leaderboard_tx(
                    &mut tx,
                    *address,
                    snapshot_date,
                    &snapshot.droplets_earned,
                    &snapshot.total_usd_value,
                )
                .await?;
                summary.addresses_awarded += 1;
            }

            summary.addresses_processed += 1;
        }

        droplets_store::snapshot::mark_completed_tx(&mut tx, snapshot_date).await?;
        tx.commit().await.map_err(droplets_common::StoreError::from)?;

        Ok(summary)
    }

    /// Union of every address holding a positive vault/OFT balance anywhere
    /// and every address holding an integration position, minus every
    /// excluded address — contracts the registry excludes outright (vaults,
    /// OFTs, zero address) and operationally-excluded addresses (treasury,
    /// LP escrows) alike. §8's exclusion-closure invariant requires that no
    /// excluded address ever gets a `DailyUsdSnapshot` or `DropletLedger`
    /// row, so exclusion is a candidate-set filter, not a per-row flag.
    async fn candidate_addresses(&self) -> Result<Vec<Address>, droplets_common::SnapshotError> {
        let mut set: HashSet<Address> = droplets_store::balances::all_addresses_with_positive_balance(self.db)
            .await?
            .into_iter()
            .collect();

        for position in droplets_store::integrations::all(self.db).await? {
            set.insert(position.user_address);
        }

        let operationally_excluded = droplets_store::excluded::all_as_set(self.db).await?;
        set.retain(|addr| !self.registry.is_excluded(*addr) && !operationally_excluded.contains(addr));
        Ok(set.into_iter().collect())
    }

    async fn compute_for_address(
        &self,
        address: Address,
        snapshot_date: NaiveDate,
        snapshot_ts: DateTime<Utc>,
    ) -> Result<DailyUsdSnapshot, droplets_common::SnapshotError> {
        let mut breakdown: Vec<AssetUsdBreakdown> = Vec::new();
        let mut total = Amount::ZERO;
        let mut had_unstake = false;

        let canonical_chain_id = self.registry.canonical_chain_id();

        for asset in AssetSymbol::ALL {
            let mut asset_usd = Amount::ZERO;

            if let Some(cfg) = self.registry.asset_config(asset, canonical_chain_id) {
                if let Some(balance) =
                    droplets_store::balances::get(self.db, address, asset, canonical_chain_id).await?
                {
                    if !balance.shares.is_zero() {
                        let (pps, pps_scale) = droplets_balances::rounds::pps_on_satellite(
                            self.db,
                            asset,
                            canonical_chain_id,
                            snapshot_ts,
                        )
                        .await?;
                        let price = self.oracle.price_at(asset, cfg.oracle_feed, snapshot_ts).await?;
                        if let Some(usd) = vault_usd(balance.shares, pps, pps_scale, price.price_usd, price.scale, cfg.decimals) {
                            asset_usd = asset_usd.checked_add(usd).unwrap_or(asset_usd);
                        }

                        if let Some(round) = droplets_store::rounds::latest_at_or_before(
                            self.db,
                            asset,
                            canonical_chain_id,
                            snapshot_ts,
                        )
                        .await?
                        {
                            if let Some(flags) =
                                droplets_store::balances::flags_for_round(self.db, address, asset, round.round_id).await?
                            {
                                had_unstake = had_unstake || flags.had_unstake_in_round;
                            }
                        }
                    }
                }
            }

            for chain in self.registry.chains() {
                if self.registry.is_canonical(chain.chain_id) {
                    continue;
                }
                if let (Some(cfg), Some(canonical_cfg)) = (
                    self.registry.asset_config(asset, chain.chain_id),
                    self.registry.asset_config(asset, canonical_chain_id),
                ) {
                    let balance = droplets_store::balances::get(self.db, address, asset, chain.chain_id).await?;
                    let shares = balance.map(|b| b.shares).unwrap_or(Amount::ZERO);
                    if shares.is_zero() {
                        continue;
                    }

                    let price = self.oracle.price_at(asset, canonical_cfg.oracle_feed, snapshot_ts).await?;
                    if let Some(usd) = oft_usd(shares, price.price_usd, price.scale, cfg.decimals) {
                        asset_usd = asset_usd.checked_add(usd).unwrap_or(asset_usd);
                    }
                }
            }

            if !asset_usd.is_zero() {
                breakdown.push(AssetUsdBreakdown { asset, usd_value: asset_usd });
                total = total.checked_add(asset_usd).unwrap_or(total);
            }
        }

        for position in droplets_store::integrations::for_user(self.db, address).await? {
            if let Some(cfg) = self.registry.asset_config(position.underlying_asset, canonical_chain_id) {
                let price = self
                    .oracle
                    .price_at(position.underlying_asset, cfg.oracle_feed, snapshot_ts)
                    .await?;
                if let Some(usd) =
                    oft_usd(position.underlying_xtoken_amount, price.price_usd, price.scale, cfg.decimals)
                {
                    total = total.checked_add(usd).unwrap_or(total);
                    if let Some(entry) = breakdown.iter_mut().find(|b| b.asset == position.underlying_asset) {
                        entry.usd_value = entry.usd_value.checked_add(usd).unwrap_or(entry.usd_value);
                    } else {
                        breakdown.push(AssetUsdBreakdown { asset: position.underlying_asset, usd_value: usd });
                    }
                }
            }
        }

        let zero_on_unstake = self.config.eligibility_zero_on_unstake && had_unstake;
        let droplets_earned = if zero_on_unstake {
            Amount::ZERO
        } else {
            scale_by_ratio(whole_dollars(total), self.config.droplet_usd_ratio)
        };

        Ok(DailyUsdSnapshot {
            address,
            snapshot_date,
            total_usd_value: total,
            breakdown,
            had_unstake,
            is_excluded: false,
            droplets_earned,
            snapshot_ts: Utc::now(),
        })
    }
}

/// `shares * pps / 10^pps_scale * price / 10^price_scale`, renormalized from
/// the asset's native decimals up to [`USD_SCALE`] (§4.8 step 1; the spec's
/// headline formula omits the decimals term because it assumes 18-decimal
/// shares, which doesn't hold for every asset here — see DESIGN.md).
fn vault_usd(shares: Amount, pps: Amount, pps_scale: u8, price: Amount, price_scale: u8, decimals: u8) -> Option<Amount> {
    let underlying = shares.mul_div(pps, Amount::pow10(pps_scale))?;
    let usd_native = underlying.mul_div(price, Amount::pow10(price_scale))?;
    to_usd_scale(usd_native, decimals)
}

/// `tokens * price / 10^price_scale`, renormalized from native decimals to
/// [`USD_SCALE`] (§4.8 step 2: OFT balances and integration xToken amounts
/// both follow this simpler path since there's no PPS involved).
fn oft_usd(tokens: Amount, price: Amount, price_scale: u8, decimals: u8) -> Option<Amount> {
    let usd_native = tokens.mul_div(price, Amount::pow10(price_scale))?;
    to_usd_scale(usd_native, decimals)
}

fn to_usd_scale(usd_native_decimals: Amount, decimals: u8) -> Option<Amount> {
    usd_native_decimals.mul_div(Amount::pow10(USD_SCALE), Amount::pow10(decimals))
}

fn whole_dollars(total_usd_value: Amount) -> Amount {
    total_usd_value.mul_div(Amount::from_u64(1), Amount::pow10(USD_SCALE)).unwrap_or(Amount::ZERO)
}

fn scale_by_ratio(whole_dollars: Amount, ratio: u64) -> Amount {
    whole_dollars.mul_div(Amount::from_u64(ratio), Amount::from_u64(1)).unwrap_or(Amount::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vault_usd_matches_worked_example() {
        // 10 shares (18 decimals) at pps=1.0 (scale 18), price=$2000 (scale 8, 18-decimal asset)
        // expect 20000 * 10^USD_SCALE, matching the §8 scenario this formula is grounded on.
        let shares = Amount::from_u64(10).mul_div(Amount::pow10(18), Amount::from_u64(1)).unwrap();
        let pps = Amount::pow10(18);
        let price = Amount::from_u64(2000).mul_div(Amount::pow10(8), Amount::from_u64(1)).unwrap();
        let usd = vault_usd(shares, pps, 18, price, 8, 18).unwrap();
        assert_eq!(usd, Amount::from_u64(20000).mul_div(Amount::pow10(USD_SCALE), Amount::from_u64(1)).unwrap());
    }

    #[test]
    fn oft_usd_zero_tokens_is_zero() {
        let price = Amount::from_u64(2000).mul_div(Amount::pow10(8), Amount::from_u64(1)).unwrap();
        let usd = oft_usd(Amount::ZERO, price, 8, 18).unwrap();
        assert_eq!(usd, Amount::ZERO);
    }

    #[test]
    fn whole_dollars_floors() {
        let total = Amount::from_u64(20000).mul_div(Amount::pow10(USD_SCALE), Amount::from_u64(1)).unwrap();
        let total = total.checked_add(Amount::from_u64(999_999)).unwrap(); // + $0.999999
        assert_eq!(whole_dollars(total), Amount::from_u64(20000));
    }

    #[test]
    fn scale_by_ratio_applies_configured_multiplier() {
        assert_eq!(scale_by_ratio(Amount::from_u64(20000), 1), Amount::from_u64(20000));
        assert_eq!(scale_by_ratio(Amount::from_u64(20000), 2), Amount::from_u64(40000));
    }
}
