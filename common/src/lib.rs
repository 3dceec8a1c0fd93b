pub mod amount;
pub mod config;
pub mod error;
pub mod model;

pub use amount::{Amount, SignedAmount};
pub use config::Config;
pub use error::{ConfigError, OracleError, RpcError, SnapshotError, StoreError};
pub use model::*;

use ethers::types::Address;
use std::str::FromStr;

/// Static exclusion set (§3 `ExcludedAddress`): zero address and burn address are
/// always excluded regardless of config; vault contracts and integration
/// contracts are added to this at registry-construction time.
pub fn is_statically_excluded(address: Address) -> bool {
    address == Address::zero() || address == burn_address()
}

pub fn burn_address() -> Address {
    Address::from_str("0x000000000000000000000000000000000000dEaD").unwrap()
}
