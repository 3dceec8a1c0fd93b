//! C10 Daily Snapshot Engine + C11 Droplet Ledger: turns current balances,
//! PPS and oracle prices into a per-address daily USD figure and droplet
//! award, written atomically alongside the `DailyJob` that guards the run.

pub mod engine;

pub use engine::{SnapshotEngine, SnapshotSummary, USD_SCALE};
