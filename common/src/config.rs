//! Environment-variable configuration, per the table in spec §6. There is no
//! CLI layer here — the thin admin CLI that would parse `--asset`/`--chain`
//! flags is an external collaborator (spec §1) and is out of scope.

use crate::error::ConfigError;
use crate::model::{
    AssetConfig, AssetSymbol, Chain, ChainId, IntegrationContractConfig, IntegrationKind,
    ProtocolId,
};
use ethers::types::Address;
use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub alchemy_api_keys: Vec<String>,
    pub chains: Vec<Chain>,
    pub canonical_chain_id: ChainId,
    pub assets: Vec<AssetConfig>,
    pub droplet_usd_ratio: u64,
    pub snapshot_time_hour: u32,
    pub snapshot_time_minute: u32,
    pub eligibility_zero_on_unstake: bool,
    pub rpc_call_timeout: Duration,
}

impl Config {
    /// Loads a `.env` file if present (dev convenience, mirrors the teacher's
    /// `dotenv` dependency) then reads the process environment. Fails loudly on
    /// any missing required key rather than silently defaulting — a missing
    /// vault address would otherwise quietly skip an entire asset.
    pub fn load() -> Result<Self, ConfigError> {
        let _ = dotenv::dotenv();

        let database_url = required("DATABASE_URL")?;

        let mut alchemy_api_keys = Vec::new();
        for i in 1..=3 {
            if let Ok(key) = env::var(format!("ALCHEMY_API_KEY_{i}")) {
                if !key.is_empty() {
                    alchemy_api_keys.push(key);
                }
            }
        }
        if alchemy_api_keys.is_empty() {
            return Err(ConfigError::Missing("ALCHEMY_API_KEY_{1..3}".into()));
        }

        let droplet_usd_ratio = optional_u64("DROPLET_USD_RATIO", 1)?;
        let snapshot_time_hour = optional_u64("SNAPSHOT_TIME_HOUR", 0)? as u32;
        let snapshot_time_minute = optional_u64("SNAPSHOT_TIME_MINUTE", 5)? as u32;
        let eligibility_zero_on_unstake =
            env::var("ELIGIBILITY_ZERO_ON_UNSTAKE").map(|v| v == "true").unwrap_or(false);

        Ok(Config {
            database_url,
            alchemy_api_keys,
            chains: Vec::new(),
            canonical_chain_id: ChainId(0),
            assets: Vec::new(),
            droplet_usd_ratio,
            snapshot_time_hour,
            snapshot_time_minute,
            eligibility_zero_on_unstake,
            rpc_call_timeout: Duration::from_secs(30),
        })
    }

    /// Resolves `{ASSET}_VAULT_ETH`/`{ASSET}_OFT_{CHAIN}` style keys for a given
    /// chain name, consulting the already-loaded chain list for confirmations
    /// and batch size. Called once per chain known to the registry at startup.
    pub fn resolve_asset(
        &self,
        asset: AssetSymbol,
        chain_id: ChainId,
        chain_name: &str,
        decimals: u8,
        is_canonical: bool,
    ) -> Result<AssetConfig, ConfigError> {
        let prefix = asset.as_str();
        let (addr_key, block_key) = if is_canonical {
            (format!("{prefix}_VAULT_ETH"), format!("{prefix}_VAULT_ETH_DEPLOY_BLOCK"))
        } else {
            (
                format!("{prefix}_OFT_{chain_name}"),
                format!("{prefix}_OFT_{chain_name}_DEPLOY_BLOCK"),
            )
        };

        let contract_address = required(&addr_key)?;
        let contract_address = Address::from_str(contract_address.trim())
            .map_err(|_| ConfigError::Invalid { key: addr_key.clone(), value: contract_address })?;

        let deploy_block = required(&block_key)?
            .parse::<u64>()
            .map_err(|_| ConfigError::Invalid { key: block_key.clone(), value: String::new() })?;

        let oracle_feed_key = format!("{prefix}_ORACLE_FEED");
        let oracle_feed = env::var(&oracle_feed_key)
            .ok()
            .and_then(|s| Address::from_str(s.trim()).ok())
            .unwrap_or_else(Address::zero);

        Ok(AssetConfig {
            asset,
            chain_id,
            decimals,
            oracle_feed,
            contract_address,
            deploy_block,
            is_oft: !is_canonical,
        })
    }

    pub fn confirmations_for(&self, chain_name: &str) -> Result<u64, ConfigError> {
        optional_u64(&format!("{chain_name}_CONFIRMATIONS"), 12)
    }

    /// Discovers every `INTEGRATION_{NAME}_KIND` env var and resolves its
    /// sibling keys (`_CONTRACT`, `_CHAIN`, `_UNDERLYING_ASSET`,
    /// `_DEPLOY_BLOCK`) into a full `IntegrationContractConfig` (C9).
    pub fn integration_contracts(&self) -> Result<Vec<IntegrationContractConfig>, ConfigError> {
        let mut names = Vec::new();
        for (key, _) in env::vars() {
            if let Some(name) = key.strip_prefix("INTEGRATION_").and_then(|r| r.strip_suffix("_KIND")) {
                names.push(name.to_string());
            }
        }

        names
            .into_iter()
            .map(|name| {
                let kind = match required(&format!("INTEGRATION_{name}_KIND"))?.as_str() {
                    "amm_lp" => IntegrationKind::AmmLp,
                    "erc4626" => IntegrationKind::Erc4626,
                    "lending_ctoken" => IntegrationKind::LendingCToken,
                    "lending_atoken" => IntegrationKind::LendingAToken,
                    other => {
                        return Err(ConfigError::Invalid {
                            key: format!("INTEGRATION_{name}_KIND"),
                            value: other.to_string(),
                        })
                    }
                };

                let contract_key = format!("INTEGRATION_{name}_CONTRACT");
                let contract_address = Address::from_str(required(&contract_key)?.trim())
                    .map_err(|_| ConfigError::Invalid { key: contract_key, value: String::new() })?;

                let chain_id = ChainId(optional_u64(&format!("INTEGRATION_{name}_CHAIN"), self.canonical_chain_id.0)?);

                let underlying_key = format!("INTEGRATION_{name}_UNDERLYING_ASSET");
                let underlying_asset = match required(&underlying_key)?.as_str() {
                    "A_ETH" => AssetSymbol::AEth,
                    "A_BTC" => AssetSymbol::ABtc,
                    "A_USD" => AssetSymbol::AUsd,
                    "A_EUR" => AssetSymbol::AEur,
                    other => {
                        return Err(ConfigError::Invalid { key: underlying_key, value: other.to_string() })
                    }
                };

                let deploy_block = optional_u64(&format!("INTEGRATION_{name}_DEPLOY_BLOCK"), 0)?;

                Ok(IntegrationContractConfig {
                    protocol_id: ProtocolId(name.to_lowercase()),
                    kind,
                    chain_id,
                    contract_address,
                    underlying_asset,
                    deploy_block,
                })
            })
            .collect()
    }

    pub fn rpc_base_urls(&self) -> Result<HashMap<String, String>, ConfigError> {
        let mut map = HashMap::new();
        for (key, value) in env::vars() {
            if let Some(chain) = key
                .strip_prefix("ALCHEMY_")
                .and_then(|rest| rest.strip_suffix("_BASE_URL"))
            {
                map.insert(chain.to_string(), value);
            }
        }
        Ok(map)
    }
}

fn required(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::Missing(key.to_string()))
}

fn optional_u64(key: &str, default: u64) -> Result<u64, ConfigError> {
    match env::var(key) {
        Ok(v) => v
            .parse::<u64>()
            .map_err(|_| ConfigError::Invalid { key: key.to_string(), value: v }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_u64_falls_back_to_default() {
        env::remove_var("SOME_UNSET_KEY_FOR_TEST");
        assert_eq!(optional_u64("SOME_UNSET_KEY_FOR_TEST", 42).unwrap(), 42);
    }
}
