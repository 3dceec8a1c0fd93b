use droplets_common::error::StoreError;
use sqlx::postgres::{PgPoolOptions, Postgres};
use sqlx::Pool;
use std::time::Duration;

/// The single DB pool shared by every task (§5): min 2, max 10 connections,
/// explicit transactions on every write path.
#[derive(Clone)]
pub struct Db {
    pub pool: Pool<Postgres>,
}

impl Db {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .min_connections(2)
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(60))
            .connect(database_url)
            .await?;
        Ok(Db { pool })
    }

    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Invariant(format!("migration failed: {e}")))?;
        Ok(())
    }
}
