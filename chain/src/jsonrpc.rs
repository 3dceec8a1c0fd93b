//! A minimal JSON-RPC 2.0 transport over `reqwest`, speaking exactly the four
//! methods C1 needs: `eth_blockNumber`, `eth_getBlockByNumber`, `eth_getLogs`,
//! `eth_call`.

use crate::transport::{BlockHeader, ChainTransport, LogFilter, RawLog};
use async_trait::async_trait;
use droplets_common::RpcError;
use ethers::types::{Address, Bytes, H256};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

pub struct JsonRpcEndpoint {
    pub url: String,
    client: reqwest::Client,
}

impl JsonRpcEndpoint {
    pub fn new(url: String, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client");
        JsonRpcEndpoint { url, client }
    }

    async fn send(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        #[derive(Serialize)]
        struct Request<'a> {
            jsonrpc: &'a str,
            id: u64,
            method: &'a str,
            params: Value,
        }
        #[derive(Deserialize)]
        struct RpcErrorBody {
            code: i64,
            message: String,
        }
        #[derive(Deserialize)]
        struct Response {
            result: Option<Value>,
            error: Option<RpcErrorBody>,
        }

        let body = Request { jsonrpc: "2.0", id: 1, method, params };

        let resp = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|source| RpcError::Transport { endpoint: self.url.clone(), source })?;

        let parsed: Response = resp
            .json()
            .await
            .map_err(|source| RpcError::Transport { endpoint: self.url.clone(), source })?;

        if let Some(err) = parsed.error {
            if is_historical_depth_error(&err.message) {
                return Err(RpcError::HistoricalDepthUnavailable(err.message));
            }
            return Err(RpcError::Rpc { endpoint: self.url.clone(), code: err.code, message: err.message });
        }

        parsed.result.ok_or_else(|| RpcError::Rpc {
            endpoint: self.url.clone(),
            code: 0,
            message: "empty result".to_string(),
        })
    }
}

/// §4.1: "block range too large", "archive required" style errors bubble
/// instead of retrying.
fn is_historical_depth_error(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("block range") && lower.contains("large")
        || lower.contains("archive")
        || lower.contains("pruned")
        || lower.contains("too many blocks")
        || lower.contains("more than 10000 results")
        || lower.contains("query returned more than")
}

fn hex_u64(v: u64) -> String {
    format!("0x{v:x}")
}

fn parse_hex_u64(v: &str) -> Result<u64, RpcError> {
    u64::from_str_radix(v.trim_start_matches("0x"), 16)
        .map_err(|_| RpcError::Rpc { endpoint: String::new(), code: 0, message: format!("bad hex u64: {v}") })
}

#[async_trait]
impl ChainTransport for JsonRpcEndpoint {
    async fn block_number(&self) -> Result<u64, RpcError> {
        let result = self.send("eth_blockNumber", json!([])).await?;
        let hex = result.as_str().ok_or_else(|| RpcError::Rpc {
            endpoint: self.url.clone(),
            code: 0,
            message: "blockNumber not a string".to_string(),
        })?;
        parse_hex_u64(hex)
    }

    async fn block_by_number(&self, block: u64) -> Result<BlockHeader, RpcError> {
        let result = self
            .send("eth_getBlockByNumber", json!([hex_u64(block), false]))
            .await?;
        if result.is_null() {
            return Err(RpcError::Rpc {
                endpoint: self.url.clone(),
                code: 0,
                message: format!("block {block} not found"),
            });
        }
        let number = parse_hex_u64(result["number"].as_str().unwrap_or("0x0"))?;
        let timestamp = parse_hex_u64(result["timestamp"].as_str().unwrap_or("0x0"))?;
        let hash = result["hash"]
            .as_str()
            .and_then(|h| h.parse::<H256>().ok())
            .unwrap_or_default();
        Ok(BlockHeader { number, hash, timestamp })
    }

    async fn get_logs(&self, filter: LogFilter) -> Result<Vec<RawLog>, RpcError> {
        let topics: Vec<String> = filter.topics.iter().map(|t| format!("{t:#x}")).collect();
        let params = json!([{
            "address": format!("{:#x}", filter.address),
            "fromBlock": hex_u64(filter.from_block),
            "toBlock": hex_u64(filter.to_block),
            "topics": topics,
        }]);
        let result = self.send("eth_getLogs", params).await?;
        let entries = result.as_array().cloned().unwrap_or_default();
        entries
            .into_iter()
            .map(|entry| {
                let address = entry["address"]
                    .as_str()
                    .and_then(|a| a.parse::<Address>().ok())
                    .unwrap_or_default();
                let topics: Vec<H256> = entry["topics"]
                    .as_array()
                    .cloned()
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|t| t.as_str().and_then(|s| s.parse::<H256>().ok()))
                    .collect();
                let data: Bytes = entry["data"]
                    .as_str()
                    .and_then(|d| d.parse::<Bytes>().ok())
                    .unwrap_or_default();
                let block_number = parse_hex_u64(entry["blockNumber"].as_str().unwrap_or("0x0"))?;
                let transaction_hash = entry["transactionHash"]
                    .as_str()
                    .and_then(|h| h.parse::<H256>().ok())
                    .unwrap_or_default();
                let transaction_index =
                    parse_hex_u64(entry["transactionIndex"].as_str().unwrap_or("0x0"))?;
                let log_index = parse_hex_u64(entry["logIndex"].as_str().unwrap_or("0x0"))?;
                Ok(RawLog {
                    address,
                    topics,
                    data,
                    block_number,
                    transaction_hash,
                    transaction_index,
                    log_index,
                })
            })
            .collect()
    }

    async fn call_at_block(&self, to: Address, data: Bytes, block: u64) -> Result<Bytes, RpcError> {
        let params = json!([
            { "to": format!("{to:#x}"), "data": format!("{data}") },
            hex_u64(block),
        ]);
        let result = self.send("eth_call", params).await?;
        result
            .as_str()
            .and_then(|s| s.parse::<Bytes>().ok())
            .ok_or_else(|| RpcError::Rpc {
                endpoint: self.url.clone(),
                code: 0,
                message: "eth_call result not bytes".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn historical_depth_errors_are_recognized() {
        assert!(is_historical_depth_error("block range too large for archive node"));
        assert!(is_historical_depth_error("query returned more than 10000 results"));
        assert!(is_historical_depth_error("archive required for this call"));
        assert!(!is_historical_depth_error("nonce too low"));
    }

    #[test]
    fn hex_u64_roundtrips() {
        assert_eq!(hex_u64(255), "0xff");
        assert_eq!(parse_hex_u64("0xff").unwrap(), 255);
    }
}
