//! C2/C10 persistence: operationally excluded addresses (treasury, LP pools,
//! bridge escrows) layered on top of the statically-known burn/zero addresses
//! in `droplets_common::is_statically_excluded`.

use crate::codec::{addr_from_db, addr_to_db};
use crate::db::Db;
use droplets_common::error::StoreError;
use droplets_common::model::ExcludedAddress;
use ethers::types::Address;
use std::collections::HashSet;

pub async fn insert(db: &Db, excluded: &ExcludedAddress) -> Result<(), StoreError> {
    sqlx::query(
        "insert into excluded_addresses (address, reason) values ($1, $2) \
         on conflict (address) do update set reason = excluded.reason",
    )
    .bind(addr_to_db(&excluded.address))
    .bind(&excluded.reason)
    .execute(&db.pool)
    .await?;
    Ok(())
}

pub async fn all(db: &Db) -> Result<Vec<ExcludedAddress>, StoreError> {
    let rows: Vec<(String, String)> =
        sqlx::query_as("select address, reason from excluded_addresses")
            .fetch_all(&db.pool)
            .await?;

    rows.into_iter()
        .map(|(address, reason)| Ok(ExcludedAddress { address: addr_from_db(&address)?, reason }))
        .collect()
}

pub async fn all_as_set(db: &Db) -> Result<HashSet<Address>, StoreError> {
    Ok(all(db).await?.into_iter().map(|e| e.address).collect())
}
