use thiserror::Error;

/// Errors surfaced by the RPC pool (C1). Historical-depth errors are a distinct
/// variant because §4.1 requires callers to see them and fall back to cache
/// rather than have them swallowed by the generic retry path.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("endpoint {endpoint}: transport error: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("endpoint {endpoint}: rpc error {code}: {message}")]
    Rpc {
        endpoint: String,
        code: i64,
        message: String,
    },

    #[error("historical depth unavailable: {0}")]
    HistoricalDepthUnavailable(String),

    #[error("all {attempted} endpoint(s) exhausted for chain {chain_id}")]
    AllEndpointsExhausted { chain_id: u64, attempted: usize },

    #[error("call deadline exceeded after {0:?}")]
    Timeout(std::time::Duration),
}

impl RpcError {
    /// §4.1: historical-depth errors must not be retried by the backoff wrapper.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, RpcError::HistoricalDepthUnavailable(_))
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invariant violation: {0}")]
    Invariant(String),

    #[error("not found: {0}")]
    NotFound(String),
}

#[derive(Debug, Error)]
pub enum OracleError {
    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("no aggregator round found for {asset} at or before block {block}")]
    NoRoundData { asset: String, block: u64 },

    #[error("price for {asset} is stale: last updated {age_secs}s ago (max {max_age_secs}s)")]
    Stale {
        asset: String,
        age_secs: i64,
        max_age_secs: i64,
    },

    #[error("binary search exceeded {0} iterations without converging")]
    SearchDidNotConverge(u32),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    Missing(String),

    #[error("invalid value for {key}: {value}")]
    Invalid { key: String, value: String },
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error("daily job for {0} is already processing")]
    AlreadyProcessing(chrono::NaiveDate),
}
