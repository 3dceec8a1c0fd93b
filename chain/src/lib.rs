pub mod jsonrpc;
pub mod pool;
pub mod registry;
pub mod transport;

pub use jsonrpc::JsonRpcEndpoint;
pub use pool::RpcPool;
pub use registry::ChainRegistry;
pub use transport::{BlockHeader, ChainTransport, LogFilter, RawLog};
