//! The read surface a chain task needs: latest block number, block-by-number,
//! bounded log fetch, and a historical contract view-call. C1's contract.

use async_trait::async_trait;
use droplets_common::RpcError;
use ethers::types::{Address, Bytes, H256};

#[derive(Debug, Clone)]
pub struct BlockHeader {
    pub number: u64,
    pub hash: H256,
    pub timestamp: u64,
}

#[derive(Debug, Clone)]
pub struct LogFilter {
    pub address: Address,
    pub from_block: u64,
    pub to_block: u64,
    pub topics: Vec<H256>,
}

/// One decoded-free log record: everything the decoder (C5) needs to know
/// which event signature it is and where it sits in chain order.
#[derive(Debug, Clone)]
pub struct RawLog {
    pub address: Address,
    pub topics: Vec<H256>,
    pub data: Bytes,
    pub block_number: u64,
    pub transaction_hash: H256,
    pub transaction_index: u64,
    pub log_index: u64,
}

#[async_trait]
pub trait ChainTransport: Send + Sync {
    async fn block_number(&self) -> Result<u64, RpcError>;

    async fn block_by_number(&self, block: u64) -> Result<BlockHeader, RpcError>;

    async fn get_logs(&self, filter: LogFilter) -> Result<Vec<RawLog>, RpcError>;

    /// `eth_call` at a specific historical block. Callers are responsible for
    /// ABI-encoding `data` and decoding the returned bytes.
    async fn call_at_block(
        &self,
        to: Address,
        data: Bytes,
        block: u64,
    ) -> Result<Bytes, RpcError>;
}

/// Scheme + host only, for logging. Never includes the path, which is where
/// Alchemy-style URLs embed the API key.
pub fn endpoint_label(url: &str) -> String {
    let without_scheme = url.split("://").nth(1).unwrap_or(url);
    let host = without_scheme.split('/').next().unwrap_or(without_scheme);
    let scheme = url.split("://").next().unwrap_or("http");
    format!("{scheme}://{host}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_label_strips_path() {
        assert_eq!(
            endpoint_label("https://eth.example.com/v2/secret-key"),
            "https://eth.example.com"
        );
    }
}
