//! Bare ABI call helpers shared by every adapter: no `ethers::contract`
//! bindings exist for these third-party tokens, so calls are hand-encoded
//! the way the rest of this workspace talks to chains it doesn't control.

use droplets_chain::transport::ChainTransport;
use droplets_common::RpcError;
use ethers::abi::{decode, encode, ParamType, Token};
use ethers::types::{Address, Bytes, U256};
use ethers::utils::keccak256;

fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

async fn call_uint256(
    transport: &dyn ChainTransport,
    contract: Address,
    signature: &str,
    args: &[Token],
    block: u64,
) -> Result<U256, RpcError> {
    let mut data = selector(signature).to_vec();
    data.extend(encode(args));
    let output = transport.call_at_block(contract, Bytes::from(data), block).await?;
    let tokens = decode(&[ParamType::Uint(256)], &output).map_err(|e| RpcError::Rpc {
        endpoint: format!("{contract:#x}"),
        code: 0,
        message: format!("{signature} decode failed: {e}"),
    })?;
    match &tokens[0] {
        Token::Uint(v) => Ok(*v),
        _ => unreachable!("ParamType::Uint always decodes to Token::Uint"),
    }
}

pub async fn balance_of(
    transport: &dyn ChainTransport,
    token: Address,
    holder: Address,
    block: u64,
) -> Result<U256, RpcError> {
    call_uint256(transport, token, "balanceOf(address)", &[Token::Address(holder)], block).await
}

pub async fn total_supply(transport: &dyn ChainTransport, token: Address, block: u64) -> Result<U256, RpcError> {
    call_uint256(transport, token, "totalSupply()", &[], block).await
}

pub async fn total_assets(transport: &dyn ChainTransport, vault: Address, block: u64) -> Result<U256, RpcError> {
    call_uint256(transport, vault, "totalAssets()", &[], block).await
}

pub async fn exchange_rate_stored(
    transport: &dyn ChainTransport,
    market: Address,
    block: u64,
) -> Result<U256, RpcError> {
    call_uint256(transport, market, "exchangeRateStored()", &[], block).await
}

/// Uniswap-v2-style `getReserves()`: returns `(reserve0, reserve1, blockTimestampLast)`.
pub async fn get_reserves(
    transport: &dyn ChainTransport,
    pair: Address,
    block: u64,
) -> Result<(U256, U256), RpcError> {
    let data = selector("getReserves()").to_vec();
    let output = transport.call_at_block(pair, Bytes::from(data), block).await?;
    let tokens = decode(&[ParamType::Uint(112), ParamType::Uint(112), ParamType::Uint(32)], &output)
        .map_err(|e| RpcError::Rpc {
            endpoint: format!("{pair:#x}"),
            code: 0,
            message: format!("getReserves decode failed: {e}"),
        })?;
    let reserve0 = match &tokens[0] {
        Token::Uint(v) => *v,
        _ => unreachable!(),
    };
    let reserve1 = match &tokens[1] {
        Token::Uint(v) => *v,
        _ => unreachable!(),
    };
    Ok((reserve0, reserve1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balance_of_selector_is_well_known() {
        assert_eq!(selector("balanceOf(address)"), [0x70, 0xa0, 0x82, 0x31]);
    }

    #[test]
    fn total_supply_selector_is_well_known() {
        assert_eq!(selector("totalSupply()"), [0x18, 0x16, 0x0d, 0xdd]);
    }
}
