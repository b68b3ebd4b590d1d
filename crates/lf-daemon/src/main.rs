//! leadflow daemon: runs the periodic escalation sweep and delivers
//! notifications until interrupted.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use lf_core::config::Config;
use lf_core::memory_store::MemoryStore;
use lf_core::sqlite_store::SqliteStore;
use lf_core::store::LeadStore;
use lf_daemon::daemon::Daemon;
use lf_telemetry::logging::{self, LogFormat};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().context("failed to load configuration")?;

    logging::init(
        &config.general.service_name,
        &config.general.log_level,
        LogFormat::from_json_flag(config.general.json_logs),
    );
    info!(version = env!("CARGO_PKG_VERSION"), "leadflow daemon starting");

    let store = open_store(&config).await?;
    let daemon = Daemon::new(&config, store);

    let shutdown = daemon.shutdown_handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => shutdown.trigger(),
            Err(e) => tracing::error!(error = %e, "failed to listen for ctrl-c"),
        }
    });

    let stats = daemon.run().await.context("daemon loop failed")?;
    info!(
        sweeps = stats.sweeps,
        sweep_errors = stats.sweep_errors,
        "leadflow daemon exited"
    );
    Ok(())
}

async fn open_store(config: &Config) -> Result<Arc<dyn LeadStore>> {
    if config.store.in_memory {
        info!("using in-memory store; nothing will be persisted");
        return Ok(Arc::new(MemoryStore::new()));
    }

    let path = config.store.resolved_path();
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create data directory {}", dir.display()))?;
    }
    let store = SqliteStore::new(&path)
        .await
        .with_context(|| format!("failed to open store at {}", path.display()))?;
    info!(path = %path.display(), "sqlite store opened");
    Ok(Arc::new(store))
}
