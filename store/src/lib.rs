//! Postgres persistence for the droplets engine. Raw SQL via `sqlx`, no ORM;
//! every table and query is grounded in the data model of `droplets_common`.
//!
//! Modules line up with the components that own each table: `cursor` (C3),
//! `events` (C4/C5), `rounds`/`balances` (C6/C7), `oracle` (C8),
//! `integrations` (C9), `snapshot`/`ledger` (C10/C11), plus `excluded` for
//! the operational exclusion list shared across several components.

pub mod balances;
pub mod codec;
pub mod cursor;
pub mod db;
pub mod events;
pub mod excluded;
pub mod integrations;
pub mod ledger;
pub mod oracle;
pub mod rounds;
pub mod snapshot;

pub use db::Db;
