//! Log ingestion: C4's per-(chain, contract) polling loop plus C5's event
//! decoder and transfer classifier, folded into C6/C7 via `droplets-balances`.

pub mod classify;
pub mod decode;
pub mod signatures;
pub mod task;
pub mod translate;

pub use classify::{classify_transfer, ClassifyContext, TransferLeg};
pub use decode::{decode_log, DecodeError, RawEvent};
pub use task::{ContractTask, IterationOutcome};
pub use translate::{translate, TranslatedEvent};

use droplets_common::{RpcError, StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
