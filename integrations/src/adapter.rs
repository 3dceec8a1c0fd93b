//! §4.7 adapters: one per protocol family, each producing a user's
//! underlying-xToken exposure at a specific historical block.

use crate::calls;
use droplets_chain::transport::ChainTransport;
use droplets_common::model::IntegrationContractConfig;
use droplets_common::model::IntegrationKind;
use droplets_common::{Amount, RpcError};
use ethers::types::Address;

/// The 1e18-scale divisor cToken exchange rates are reported at.
const CTOKEN_EXCHANGE_RATE_SCALE: u64 = 1_000_000_000_000_000_000;

/// The holder's raw protocol-token balance alongside the underlying xToken
/// amount it represents.
#[derive(Debug, Clone, Copy)]
pub struct HolderPosition {
    pub position_shares: Amount,
    pub underlying_xtoken_amount: Amount,
}

impl HolderPosition {
    fn zero() -> Self {
        HolderPosition { position_shares: Amount::ZERO, underlying_xtoken_amount: Amount::ZERO }
    }
}

/// A single protocol's `positionsAt(block)`, narrowed here to one holder at a
/// time since the caller already knows the holder set from
/// `integration_holders` discovery.
#[async_trait::async_trait]
pub trait IntegrationAdapter: Send + Sync {
    fn config(&self) -> &IntegrationContractConfig;

    async fn position_for_holder(
        &self,
        transport: &dyn ChainTransport,
        holder: Address,
        block: u64,
    ) -> Result<HolderPosition, RpcError>;
}

pub struct AmmLpAdapter {
    pub config: IntegrationContractConfig,
    /// Whether the underlying asset this engine cares about is token0 (vs
    /// token1) in the pair's reserve ordering.
    pub xtoken_is_token0: bool,
}

#[async_trait::async_trait]
impl IntegrationAdapter for AmmLpAdapter {
    fn config(&self) -> &IntegrationContractConfig {
        &self.config
    }

    /// `underlying = lp_shares * reserve(xToken) / totalSupply` (§4.7).
    async fn position_for_holder(
        &self,
        transport: &dyn ChainTransport,
        holder: Address,
        block: u64,
    ) -> Result<HolderPosition, RpcError> {
        let pair = self.config.contract_address;
        let lp_shares = calls::balance_of(transport, pair, holder, block).await?;
        if lp_shares.is_zero() {
            return Ok(HolderPosition::zero());
        }
        let total_supply = calls::total_supply(transport, pair, block).await?;
        let (reserve0, reserve1) = calls::get_reserves(transport, pair, block).await?;
        let reserve = if self.xtoken_is_token0 { reserve0 } else { reserve1 };

        let underlying = Amount(lp_shares).mul_div(Amount(reserve), Amount(total_supply)).ok_or_else(|| {
            RpcError::Rpc { endpoint: format!("{pair:#x}"), code: 0, message: "lp underlying computation overflowed".into() }
        })?;

        Ok(HolderPosition { position_shares: Amount(lp_shares), underlying_xtoken_amount: underlying })
    }
}

pub struct Erc4626Adapter {
    pub config: IntegrationContractConfig,
}

#[async_trait::async_trait]
impl IntegrationAdapter for Erc4626Adapter {
    fn config(&self) -> &IntegrationContractConfig {
        &self.config
    }

    /// `underlying = user_shares * totalAssets / totalSupply` (§4.7).
    async fn position_for_holder(
        &self,
        transport: &dyn ChainTransport,
        holder: Address,
        block: u64,
    ) -> Result<HolderPosition, RpcError> {
        let vault = self.config.contract_address;
        let shares = calls::balance_of(transport, vault, holder, block).await?;
        if shares.is_zero() {
            return Ok(HolderPosition::zero());
        }
        let total_assets = calls::total_assets(transport, vault, block).await?;
        let total_supply = calls::total_supply(transport, vault, block).await?;

        let underlying = Amount(shares).mul_div(Amount(total_assets), Amount(total_supply)).ok_or_else(|| {
            RpcError::Rpc { endpoint: format!("{vault:#x}"), code: 0, message: "4626 underlying computation overflowed".into() }
        })?;

        Ok(HolderPosition { position_shares: Amount(shares), underlying_xtoken_amount: underlying })
    }
}

pub struct LendingMarketAdapter {
    pub config: IntegrationContractConfig,
}

#[async_trait::async_trait]
impl IntegrationAdapter for LendingMarketAdapter {
    fn config(&self) -> &IntegrationContractConfig {
        &self.config
    }

    /// cTokens: `underlying = cToken_balance * exchangeRateStored / 10^18`.
    /// aTokens: 1:1 with underlying (§4.7).
    async fn position_for_holder(
        &self,
        transport: &dyn ChainTransport,
        holder: Address,
        block: u64,
    ) -> Result<HolderPosition, RpcError> {
        let market = self.config.contract_address;
        let balance = calls::balance_of(transport, market, holder, block).await?;
        if balance.is_zero() {
            return Ok(HolderPosition::zero());
        }

        let underlying = match self.config.kind {
            IntegrationKind::LendingAToken => Amount(balance),
            IntegrationKind::LendingCToken => {
                let exchange_rate = calls::exchange_rate_stored(transport, market, block).await?;
                Amount(balance)
                    .mul_div(Amount(exchange_rate), Amount::from_u64(CTOKEN_EXCHANGE_RATE_SCALE))
                    .ok_or_else(|| RpcError::Rpc {
                        endpoint: format!("{market:#x}"),
                        code: 0,
                        message: "lending market underlying computation overflowed".into(),
                    })?
            }
            other => unreachable!("LendingMarketAdapter constructed with non-lending kind {other:?}"),
        };

        Ok(HolderPosition { position_shares: Amount(balance), underlying_xtoken_amount: underlying })
    }
}
