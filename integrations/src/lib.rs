//! C9: per-protocol integration adapters producing a user's underlying-xToken
//! exposure at a given block, plus the holder-discovery/persistence glue that
//! drives `positionsAt(block)` over every known holder of a protocol's token.

pub mod adapter;
pub mod calls;
pub mod discovery;
pub mod positions;
pub mod task;

pub use adapter::{AmmLpAdapter, Erc4626Adapter, HolderPosition, IntegrationAdapter, LendingMarketAdapter};
pub use task::IntegrationTask;

use droplets_common::model::{IntegrationContractConfig, IntegrationKind};

/// Builds the right adapter for a configured integration contract (§4.7).
/// AMM LP pools need to know which reserve side is the tracked xToken;
/// callers resolve that themselves (e.g. from pool token ordering) and pass
/// it in, since it isn't part of `IntegrationContractConfig`.
pub fn build_adapter(config: IntegrationContractConfig, xtoken_is_token0: bool) -> Box<dyn IntegrationAdapter> {
    match config.kind {
        IntegrationKind::AmmLp => Box::new(AmmLpAdapter { config, xtoken_is_token0 }),
        IntegrationKind::Erc4626 => Box::new(Erc4626Adapter { config }),
        IntegrationKind::LendingCToken | IntegrationKind::LendingAToken => {
            Box::new(LendingMarketAdapter { config })
        }
    }
}
