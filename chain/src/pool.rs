//! C1: an ordered list of endpoints (one per API key), round-robin with
//! per-key load counters, retry with backoff, historical-depth errors bubble
//! instead of retrying.

use crate::transport::{endpoint_label, BlockHeader, ChainTransport, LogFilter, RawLog};
use async_trait::async_trait;
use droplets_common::RpcError;
use ethers::types::{Address, Bytes};
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const ROTATION_WINDOW: Duration = Duration::from_secs(60);
const ROTATION_THRESHOLD: u64 = 50;
const RETRY_BASE: Duration = Duration::from_secs(1);
const RETRY_MULTIPLIER: u32 = 2;
const RETRY_CAP: Duration = Duration::from_secs(30);
const MAX_ATTEMPTS: u32 = 5;

struct EndpointSlot {
    transport: Box<dyn ChainTransport>,
    label: String,
    request_count: AtomicU64,
    window_start: Mutex<Instant>,
}

impl EndpointSlot {
    fn new(transport: Box<dyn ChainTransport>, url: &str) -> Self {
        EndpointSlot {
            transport,
            label: endpoint_label(url),
            request_count: AtomicU64::new(0),
            window_start: Mutex::new(Instant::now()),
        }
    }

    /// Resets the per-minute counter if the 60s window has elapsed, then
    /// records one more request against it.
    fn record_request(&self) -> u64 {
        let mut window_start = self.window_start.lock().expect("window_start mutex poisoned");
        if window_start.elapsed() >= ROTATION_WINDOW {
            *window_start = Instant::now();
            self.request_count.store(0, Ordering::SeqCst);
        }
        self.request_count.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn current_count(&self) -> u64 {
        let window_start = self.window_start.lock().expect("window_start mutex poisoned");
        if window_start.elapsed() >= ROTATION_WINDOW {
            0
        } else {
            self.request_count.load(Ordering::SeqCst)
        }
    }
}

/// A pool of RPC endpoints for one chain, shared read-only after construction
/// except for the per-endpoint atomic counters (§5).
pub struct RpcPool {
    chain_id: u64,
    endpoints: Vec<EndpointSlot>,
    current: AtomicUsize,
}

impl RpcPool {
    pub fn new(chain_id: u64, endpoints: Vec<Box<dyn ChainTransport>>, urls: &[String]) -> Self {
        let endpoints = endpoints
            .into_iter()
            .zip(urls.iter())
            .map(|(t, url)| EndpointSlot::new(t, url))
            .collect();
        RpcPool { chain_id, endpoints, current: AtomicUsize::new(0) }
    }

    /// Returns the current endpoint index, advancing to the lowest-loaded
    /// endpoint if the current one has exceeded the rotation threshold.
    fn next_index(&self) -> usize {
        let current = self.current.load(Ordering::SeqCst);
        if self.endpoints[current].current_count() <= ROTATION_THRESHOLD {
            return current;
        }
        let (lowest_idx, _) = self
            .endpoints
            .iter()
            .enumerate()
            .min_by_key(|(_, e)| e.current_count())
            .expect("pool is non-empty");
        self.current.store(lowest_idx, Ordering::SeqCst);
        lowest_idx
    }

    /// Runs `op` against one endpoint with retry+backoff; if it fails on every
    /// endpoint the final error is surfaced — never silently zero-filled
    /// (§4.1's failure policy).
    async fn with_retry<T, F, Fut>(&self, op: F) -> Result<T, RpcError>
    where
        F: Fn(&dyn ChainTransport) -> Fut,
        Fut: Future<Output = Result<T, RpcError>>,
    {
        let mut last_err = None;
        let mut attempted = 0usize;

        'endpoints: for _ in 0..self.endpoints.len().max(1) {
            let idx = self.next_index();
            let endpoint = &self.endpoints[idx];
            let mut delay = RETRY_BASE;

            for attempt in 1..=MAX_ATTEMPTS {
                endpoint.record_request();
                attempted += 1;
                match op(endpoint.transport.as_ref()).await {
                    Ok(value) => return Ok(value),
                    Err(err) if !err.is_retryable() => {
                        debug!(chain_id = self.chain_id, endpoint = %endpoint.label, "non-retryable rpc error, bubbling");
                        return Err(err);
                    }
                    Err(err) => {
                        warn!(
                            chain_id = self.chain_id,
                            endpoint = %endpoint.label,
                            attempt,
                            error = %err,
                            "rpc call failed, retrying"
                        );
                        last_err = Some(err);
                        if attempt < MAX_ATTEMPTS {
                            tokio::time::sleep(delay).await;
                            delay = (delay * RETRY_MULTIPLIER).min(RETRY_CAP);
                        }
                    }
                }
            }
            // Exhausted retries on this endpoint; try the next one in the pool.
            let _ = &mut last_err;
            continue 'endpoints;
        }

        Err(last_err.unwrap_or(RpcError::AllEndpointsExhausted { chain_id: self.chain_id, attempted }))
    }
}

#[async_trait]
impl ChainTransport for RpcPool {
    async fn block_number(&self) -> Result<u64, RpcError> {
        self.with_retry(|t| t.block_number()).await
    }

    async fn block_by_number(&self, block: u64) -> Result<BlockHeader, RpcError> {
        self.with_retry(|t| t.block_by_number(block)).await
    }

    async fn get_logs(&self, filter: LogFilter) -> Result<Vec<RawLog>, RpcError> {
        self.with_retry(|t| t.get_logs(filter.clone())).await
    }

    async fn call_at_block(&self, to: Address, data: Bytes, block: u64) -> Result<Bytes, RpcError> {
        self.with_retry(|t| t.call_at_block(to, data.clone(), block)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::sync::Arc;

    struct FlakyTransport {
        calls: Arc<AtomicU32>,
        fail_times: u32,
    }

    #[async_trait]
    impl ChainTransport for FlakyTransport {
        async fn block_number(&self) -> Result<u64, RpcError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_times {
                Err(RpcError::Rpc { endpoint: "flaky".into(), code: -1, message: "flaky".into() })
            } else {
                Ok(42)
            }
        }
        async fn block_by_number(&self, _block: u64) -> Result<BlockHeader, RpcError> {
            unimplemented!()
        }
        async fn get_logs(&self, _filter: LogFilter) -> Result<Vec<RawLog>, RpcError> {
            unimplemented!()
        }
        async fn call_at_block(&self, _to: Address, _data: Bytes, _block: u64) -> Result<Bytes, RpcError> {
            unimplemented!()
        }
    }

    struct AlwaysHistoricalDepth;

    #[async_trait]
    impl ChainTransport for AlwaysHistoricalDepth {
        async fn block_number(&self) -> Result<u64, RpcError> {
            Err(RpcError::HistoricalDepthUnavailable("archive required".into()))
        }
        async fn block_by_number(&self, _block: u64) -> Result<BlockHeader, RpcError> {
            unimplemented!()
        }
        async fn get_logs(&self, _filter: LogFilter) -> Result<Vec<RawLog>, RpcError> {
            unimplemented!()
        }
        async fn call_at_block(&self, _to: Address, _data: Bytes, _block: u64) -> Result<Bytes, RpcError> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let transport: Box<dyn ChainTransport> =
            Box::new(FlakyTransport { calls: calls.clone(), fail_times: 2 });
        let pool = RpcPool::new(1, vec![transport], &["https://a.example".to_string()]);
        let result = pool.block_number().await.unwrap();
        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn historical_depth_errors_are_not_retried() {
        let transport: Box<dyn ChainTransport> = Box::new(AlwaysHistoricalDepth);
        let pool = RpcPool::new(1, vec![transport], &["https://a.example".to_string()]);
        let err = pool.block_number().await.unwrap_err();
        assert!(matches!(err, RpcError::HistoricalDepthUnavailable(_)));
    }

    #[tokio::test]
    async fn all_endpoints_exhausted_surfaces_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let transport: Box<dyn ChainTransport> =
            Box::new(FlakyTransport { calls: calls.clone(), fail_times: 100 });
        let pool = RpcPool::new(1, vec![transport], &["https://a.example".to_string()]);
        let err = pool.block_number().await.unwrap_err();
        assert!(matches!(err, RpcError::Rpc { .. }));
    }

    #[test]
    fn rotation_picks_lowest_loaded_endpoint_over_threshold() {
        let t1: Box<dyn ChainTransport> = Box::new(AlwaysHistoricalDepth);
        let t2: Box<dyn ChainTransport> = Box::new(AlwaysHistoricalDepth);
        let pool = RpcPool::new(
            1,
            vec![t1, t2],
            &["https://a.example".to_string(), "https://b.example".to_string()],
        );
        for _ in 0..(ROTATION_THRESHOLD + 1) {
            pool.endpoints[0].record_request();
        }
        assert_eq!(pool.next_index(), 1);
    }
}
