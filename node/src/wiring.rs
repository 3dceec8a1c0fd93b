//! Builds the engine's topology from `Config` + the static chain table in
//! [`crate::chains`]: one RPC pool per chain, the chain registry, one
//! `ContractTask` per (chain, asset) contract the registry tracks, one
//! `IntegrationTask` per configured integration contract, and the recurring
//! daily snapshot job. Kept out of `main` so the wiring itself — which is
//! mostly plumbing, not control flow — stays unit-testable in isolation
//! from process lifecycle concerns.

use crate::chains::{self, CHAINS};
use chrono::{Duration as ChronoDuration, NaiveTime, Utc};
use droplets_chain::transport::ChainTransport;
use droplets_chain::{ChainRegistry, JsonRpcEndpoint, RpcPool};
use droplets_common::model::{Chain, IntegrationContractConfig, IntegrationKind};
use droplets_common::{AssetSymbol, ChainId, Config};
use droplets_ingest::ContractTask;
use droplets_integrations::IntegrationTask;
use droplets_oracle::OracleService;
use droplets_snapshot::SnapshotEngine;
use droplets_store::Db;
use ethers::types::Address;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

const INTEGRATION_POLL_INTERVAL: Duration = Duration::from_secs(20);
const INTEGRATION_POSITION_REFRESH_INTERVAL: Duration = Duration::from_secs(15 * 60);
const RECONCILIATION_INTERVAL: Duration = Duration::from_secs(10 * 60);
const DEFAULT_BATCH_SIZE: u64 = 500;

pub struct EnginePlan {
    pub contract_tasks: Vec<ContractTask>,
    pub integration_tasks: Vec<IntegrationTask>,
    pub snapshot: SnapshotPlan,
    pub reconciliation: crate::reconcile_loop::ReconciliationPlan,
}

/// Everything the snapshot loop needs, owned so it can run as its own
/// `'static` task independent of the wiring function's stack frame.
pub struct SnapshotPlan {
    pub db: Db,
    pub registry: Arc<ChainRegistry>,
    pub config: Arc<Config>,
    pub canonical_transport: Arc<dyn ChainTransport>,
}

pub async fn build(config: &Config, db: Db) -> anyhow::Result<EnginePlan> {
    let rpc_base_urls = config.rpc_base_urls()?;
    let mut transports: HashMap<ChainId, Arc<dyn ChainTransport>> = HashMap::new();

    for chain_def in CHAINS {
        let base_url = rpc_base_urls.get(chain_def.env_name).ok_or_else(|| {
            anyhow::anyhow!("missing ALCHEMY_{}_BASE_URL", chain_def.env_name)
        })?;

        let urls: Vec<String> = config
            .alchemy_api_keys
            .iter()
            .map(|key| format!("{}/{}", base_url.trim_end_matches('/'), key))
            .collect();
        let endpoints: Vec<Box<dyn ChainTransport>> = urls
            .iter()
            .map(|url| Box::new(JsonRpcEndpoint::new(url.clone(), config.rpc_call_timeout)) as Box<dyn ChainTransport>)
            .collect();

        let pool: Arc<dyn ChainTransport> = Arc::new(RpcPool::new(chain_def.chain_id, endpoints, &urls));
        transports.insert(ChainId(chain_def.chain_id), pool);
    }

    let mut chain_rows = Vec::new();
    for chain_def in CHAINS {
        let confirmations = config.confirmations_for(chain_def.env_name)?;
        chain_rows.push(Chain {
            chain_id: ChainId(chain_def.chain_id),
            name: chain_def.env_name.to_string(),
            is_canonical: chain_def.is_canonical,
            confirmations,
            batch_size: DEFAULT_BATCH_SIZE,
            poll_interval_secs: crate::poll_interval_default().as_secs(),
        });
    }

    let mut asset_rows = Vec::new();
    for asset in AssetSymbol::ALL {
        for chain_def in CHAINS {
            if !asset_is_configured(asset, chain_def.env_name, chain_def.is_canonical) {
                continue;
            }
            let cfg = config.resolve_asset(
                asset,
                ChainId(chain_def.chain_id),
                chain_def.env_name,
                chains::decimals_for(asset),
                chain_def.is_canonical,
            )?;
            asset_rows.push(cfg);
        }
    }

    let mut registry = ChainRegistry::new(chain_rows, asset_rows);

    let integration_contracts = config.integration_contracts()?;
    for ic in &integration_contracts {
        registry.register_excluded(ic.contract_address);
        droplets_store::excluded::insert(
            &db,
            &droplets_common::model::ExcludedAddress {
                address: ic.contract_address,
                reason: format!("integration:{}", ic.protocol_id.0),
            },
        )
        .await?;
    }

    let registry = Arc::new(registry);
    let canonical_chain_id = registry.canonical_chain_id();
    let canonical_transport = transports
        .get(&canonical_chain_id)
        .expect("canonical chain always has a transport")
        .clone();

    let is_excluded: Arc<dyn Fn(Address) -> bool + Send + Sync> = {
        let registry = registry.clone();
        Arc::new(move |addr: Address| registry.is_excluded(addr))
    };

    let mut contract_tasks = Vec::new();
    for asset_cfg in registry.contracts_to_track() {
        let chain_row = registry.chain(asset_cfg.chain_id).expect("chain row present for every tracked asset");

        contract_tasks.push(ContractTask {
            chain_id: asset_cfg.chain_id,
            canonical_chain_id,
            contract_address: asset_cfg.contract_address,
            asset: asset_cfg.asset,
            deploy_block: asset_cfg.deploy_block,
            pps_scale: 18,
            confirmations: chain_row.confirmations,
            batch_size: chain_row.batch_size,
            poll_interval: Duration::from_secs(chain_row.poll_interval_secs),
            transport: transports.get(&asset_cfg.chain_id).expect("transport built for every chain").clone(),
            db: db.clone(),
            integration_addresses: integration_contracts.iter().map(|ic| ic.contract_address).collect(),
            is_excluded: is_excluded.clone(),
        });
    }

    let mut integration_tasks = Vec::new();
    for ic in &integration_contracts {
        let chain_row = registry
            .chain(ic.chain_id)
            .ok_or_else(|| anyhow::anyhow!("integration {} configured on untracked chain {}", ic.protocol_id.0, ic.chain_id))?;
        let transport = transports
            .get(&ic.chain_id)
            .ok_or_else(|| anyhow::anyhow!("no transport for integration {} chain {}", ic.protocol_id.0, ic.chain_id))?
            .clone();
        let adapter: Arc<dyn droplets_integrations::IntegrationAdapter> =
            Arc::from(droplets_integrations::build_adapter(ic.clone(), xtoken_is_token0(ic)));

        integration_tasks.push(IntegrationTask {
            chain_id: ic.chain_id,
            protocol_id: ic.protocol_id.clone(),
            contract_address: ic.contract_address,
            deploy_block: ic.deploy_block,
            confirmations: chain_row.confirmations,
            batch_size: chain_row.batch_size,
            poll_interval: INTEGRATION_POLL_INTERVAL,
            position_refresh_interval: INTEGRATION_POSITION_REFRESH_INTERVAL,
            transport,
            db: db.clone(),
            adapter,
        });
    }

    let reconciliation = crate::reconcile_loop::ReconciliationPlan {
        db: db.clone(),
        integration_contracts,
        transports,
        interval: RECONCILIATION_INTERVAL,
    };

    Ok(EnginePlan {
        contract_tasks,
        integration_tasks,
        snapshot: SnapshotPlan {
            db,
            registry,
            config: Arc::new(config.clone()),
            canonical_transport,
        },
        reconciliation,
    })
}

/// A (asset, chain) pair is only tracked if its vault/OFT address is
/// actually configured — not every asset necessarily bridges to every
/// satellite chain (§1 non-goal: no arbitrary new chains, but a given
/// deployment may still skip a specific asset/chain combination).
fn asset_is_configured(asset: AssetSymbol, chain_env_name: &str, is_canonical: bool) -> bool {
    let prefix = asset.as_str();
    let key = if is_canonical {
        format!("{prefix}_VAULT_ETH")
    } else {
        format!("{prefix}_OFT_{chain_env_name}")
    };
    std::env::var(key).is_ok()
}

/// AMM LP pools need to know which reserve side is the tracked xToken;
/// `INTEGRATION_{NAME}_XTOKEN_TOKEN0` defaults to `true` (xToken is token0)
/// since most tracked pools pair the vault asset against a stable quote in
/// the second slot.
fn xtoken_is_token0(ic: &IntegrationContractConfig) -> bool {
    if ic.kind != IntegrationKind::AmmLp {
        return true;
    }
    let name = ic.protocol_id.0.to_uppercase();
    std::env::var(format!("INTEGRATION_{name}_XTOKEN_TOKEN0"))
        .map(|v| v != "false")
        .unwrap_or(true)
}

/// Runs the daily snapshot forever: sleeps until the configured
/// `SNAPSHOT_TIME_HOUR:MINUTE` UTC, runs the engine for that date, then
/// sleeps until the same time the next day. A `DailyJob` row is the mutex
/// (§5: "it never overlaps itself"), so a restart mid-run simply re-enters
/// `SnapshotEngine::run`, which is idempotent by date.
pub async fn run_snapshot_loop(plan: SnapshotPlan, mut shutdown: watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            return;
        }

        let sleep_for = time_until_next_run(plan.config.snapshot_time_hour, plan.config.snapshot_time_minute);
        tokio::select! {
            _ = tokio::time::sleep(sleep_for) => {}
            _ = shutdown.changed() => continue,
        }
        if *shutdown.borrow() {
            return;
        }

        let snapshot_date = Utc::now().date_naive();
        let oracle = OracleService::new(plan.canonical_transport.as_ref(), &plan.db, plan.registry.canonical_chain_id());
        let engine = SnapshotEngine::new(&plan.db, plan.registry.as_ref(), &oracle, plan.config.as_ref());

        match engine.run(snapshot_date).await {
            Ok(Some(summary)) => {
                tracing::info!(
                    %snapshot_date,
                    processed = summary.addresses_processed,
                    awarded = summary.addresses_awarded,
                    "daily snapshot completed"
                );
            }
            Ok(None) => {
                tracing::info!(%snapshot_date, "daily snapshot already completed; skipped");
            }
            Err(err) => {
                tracing::error!(%snapshot_date, error = %err, "daily snapshot failed");
            }
        }
    }
}

fn time_until_next_run(hour: u32, minute: u32) -> Duration {
    let now = Utc::now();
    let target_time = NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or_else(|| NaiveTime::from_hms_opt(0, 5, 0).unwrap());
    let mut target = now.date_naive().and_time(target_time).and_utc();
    if target <= now {
        target += ChronoDuration::days(1);
    }
    (target - now).to_std().unwrap_or(Duration::from_secs(60))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_is_configured_checks_canonical_key() {
        std::env::remove_var("A_ETH_VAULT_ETH");
        assert!(!asset_is_configured(AssetSymbol::AEth, "ETH", true));
        std::env::set_var("A_ETH_VAULT_ETH", "0x0000000000000000000000000000000000000001");
        assert!(asset_is_configured(AssetSymbol::AEth, "ETH", true));
        std::env::remove_var("A_ETH_VAULT_ETH");
    }

    #[test]
    fn asset_is_configured_checks_satellite_oft_key() {
        std::env::remove_var("A_USD_OFT_ARBITRUM");
        assert!(!asset_is_configured(AssetSymbol::AUsd, "ARBITRUM", false));
        std::env::set_var("A_USD_OFT_ARBITRUM", "0x0000000000000000000000000000000000000002");
        assert!(asset_is_configured(AssetSymbol::AUsd, "ARBITRUM", false));
        std::env::remove_var("A_USD_OFT_ARBITRUM");
    }

    #[test]
    fn time_until_next_run_is_never_negative_and_bounded_by_a_day() {
        let d = time_until_next_run(0, 5);
        assert!(d.as_secs() <= 24 * 60 * 60);
    }
}
