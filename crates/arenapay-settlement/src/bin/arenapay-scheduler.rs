//! ArenaPay scheduler process.
//!
//! Ticks tournament auto-start and the stuck-entry timeout on the configured
//! interval until Ctrl-C.
//!
//! Environment:
//! - `ARENAPAY_CONFIG`: path to a JSON `WalletConfig` (defaults when unset)
//! - `ARENAPAY_LOG_FORMAT`: `json` for JSON log lines
//! - `RUST_LOG`: tracing filter, default `arenapay=info`

use std::process::ExitCode;
use std::sync::Arc;

use arenapay_ledger::WalletStore;
use arenapay_settlement::telemetry::{LogFormat, init_tracing};
use arenapay_settlement::{SchedulerHooks, SchedulerRunner, SettlementEngine};
use arenapay_types::{ArenaError, Result, WalletConfig, constants};
use tokio::sync::watch;

#[tokio::main]
async fn main() -> ExitCode {
    let format = std::env::var("ARENAPAY_LOG_FORMAT")
        .map(|raw| LogFormat::parse(&raw))
        .unwrap_or_default();
    if let Err(e) = init_tracing(format) {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "scheduler exited with error");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let config = match std::env::var("ARENAPAY_CONFIG") {
        Ok(path) => WalletConfig::from_json_file(&path)?,
        Err(_) => WalletConfig::default(),
    };
    if config.scheduler.shared_secret.is_none() {
        return Err(ArenaError::Configuration("scheduler.shared_secret must be set".to_string()));
    }
    tracing::info!(
        engine = constants::ENGINE_NAME,
        version = constants::VERSION,
        interval_secs = config.scheduler.interval_secs,
        "starting scheduler"
    );

    let engine = SettlementEngine::new(Arc::new(WalletStore::new()), config.clone())?;
    let hooks = SchedulerHooks::new(engine, &config.scheduler);
    let runner = SchedulerRunner::new(hooks, &config.scheduler);

    let (stop, stopped) = watch::channel(false);
    let handle = tokio::spawn(runner.run(stopped));

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested");
    let _ = stop.send(true);
    handle
        .await
        .map_err(|e| ArenaError::Internal(format!("scheduler task failed: {e}")))?;
    Ok(())
}
