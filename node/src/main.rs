//! The long-lived process (§5's "task-pool orchestrator"): loads config,
//! connects the single shared DB pool, builds the RPC pool and chain
//! registry, then spawns one cooperative task per (chain, contract) — the
//! ingester (C4/C5/C6/C7), one per integration contract (C9's holder
//! discovery + position refresh) — plus the single daily snapshot task
//! (C10/C11). Shutdown is a broadcast `watch` channel; every task finishes
//! its current batch/transaction before exiting (§5 cancellation).

mod chains;
mod reconcile_loop;
mod wiring;

use anyhow::Context;
use droplets_common::Config;
use droplets_store::Db;
use std::time::Duration;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = Config::load().context("loading configuration")?;
    tracing::info!("droplets-node starting up");

    let db = Db::connect(&config.database_url).await.context("connecting to database")?;
    db.run_migrations().await.context("running migrations")?;
    tracing::info!("migrations applied");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let plan = wiring::build(&config, db.clone()).await.context("building engine topology")?;
    tracing::info!(
        contract_tasks = plan.contract_tasks.len(),
        integration_tasks = plan.integration_tasks.len(),
        "topology ready"
    );

    let mut handles = Vec::new();

    for task in plan.contract_tasks {
        let rx = shutdown_rx.clone();
        handles.push(tokio::spawn(async move { task.run(rx).await }));
    }

    for task in plan.integration_tasks {
        let rx = shutdown_rx.clone();
        handles.push(tokio::spawn(async move { task.run(rx).await }));
    }

    {
        let rx = shutdown_rx.clone();
        let snapshot_plan = plan.snapshot;
        handles.push(tokio::spawn(async move { wiring::run_snapshot_loop(snapshot_plan, rx).await }));
    }

    {
        let rx = shutdown_rx.clone();
        let reconciliation_plan = plan.reconciliation;
        handles.push(tokio::spawn(async move { reconcile_loop::run(reconciliation_plan, rx).await }));
    }

    wait_for_shutdown_signal().await;
    tracing::info!("shutdown signal received; waiting for in-flight batches to finish");
    let _ = shutdown_tx.send(true);

    for handle in handles {
        let _ = handle.await;
    }

    tracing::info!("droplets-node shut down cleanly");
    Ok(())
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        sigterm.recv().await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).json().with_target(true).init();
}

/// Small helper retained for symmetry with `droplets_common::config`'s
/// `optional_u64`; node-local operational defaults (batch size, poll
/// interval) aren't part of the enumerated §6 config table, so they live
/// here rather than growing that table with knobs the spec never names.
pub(crate) fn poll_interval_default() -> Duration {
    Duration::from_secs(15)
}
