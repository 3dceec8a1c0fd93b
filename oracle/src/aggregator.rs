//! Minimal Chainlink aggregator ABI: just enough of `latestRoundData()` to
//! read a price at a specific historical block via `eth_call`.

use droplets_common::RpcError;
use droplets_chain::transport::ChainTransport;
use ethers::abi::{decode, ParamType, Token};
use ethers::types::{Address, Bytes, I256};
use ethers::utils::keccak256;

/// `answer` from `latestRoundData()`, called as of a specific historical
/// block via `eth_call`.
pub struct RoundData {
    pub answer: I256,
    pub updated_at: u64,
}

fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Calls `latestRoundData()` on `aggregator` at `block`, per §4.6 step 3.
pub async fn latest_round_data(
    transport: &dyn ChainTransport,
    aggregator: Address,
    block: u64,
) -> Result<RoundData, RpcError> {
    let data = Bytes::from(selector("latestRoundData()").to_vec());
    let output = transport.call_at_block(aggregator, data, block).await?;

    let tokens = decode(
        &[
            ParamType::Uint(80),
            ParamType::Int(256),
            ParamType::Uint(256),
            ParamType::Uint(256),
            ParamType::Uint(80),
        ],
        &output,
    )
    .map_err(|e| RpcError::Rpc {
        endpoint: format!("{aggregator:#x}"),
        code: 0,
        message: format!("latestRoundData decode failed: {e}"),
    })?;

    let answer = match &tokens[1] {
        Token::Int(v) => I256::from_raw(*v),
        _ => unreachable!("ParamType::Int always decodes to Token::Int"),
    };
    let updated_at = match &tokens[3] {
        Token::Uint(v) => v.as_u64(),
        _ => unreachable!("ParamType::Uint always decodes to Token::Uint"),
    };

    Ok(RoundData { answer, updated_at })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_matches_known_signature() {
        // keccak256("latestRoundData()")[0..4] is a well-known Chainlink selector.
        assert_eq!(selector("latestRoundData()"), [0xfe, 0xaf, 0x96, 0x8c]);
    }
}
