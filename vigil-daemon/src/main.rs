use anyhow::{anyhow, Context};
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{error, info};
use vigil_core::{
    init_observability, shutdown_observability, Config, HealthChecker, HistoryStore, SnapshotBus,
    SourceKind, Sources,
};

mod api;
mod poller;
mod shutdown;

use poller::{Poller, HISTORY_SUBSYSTEM};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize observability FIRST
    init_observability("vigild", config.metrics_port)
        .map_err(|e| anyhow!("Failed to initialize observability: {}", e))?;

    info!("vigild starting");

    let health = HealthChecker::new();
    for kind in SourceKind::ALL {
        health.register_subsystem(kind.as_str()).await;
    }
    health.register_subsystem(HISTORY_SUBSYSTEM).await;

    let history = HistoryStore::new(config.history.db_path())
        .await
        .context("Failed to open history database")?;

    let sources = Sources::from_config(&config).context("Failed to set up upstream sources")?;
    for kind in SourceKind::ALL {
        info!(source = %kind, via = sources.get(kind).name(), "Upstream configured");
    }

    let bus = SnapshotBus::new();
    let refresh = Arc::new(Notify::new());
    let shutdown = shutdown::shutdown_signal();

    let retention = config
        .history
        .retention_hours
        .map(|hours| Duration::from_secs(u64::from(hours) * 3600));
    let poller = Poller::new(
        sources.clone(),
        bus.clone(),
        history.clone(),
        health.clone(),
        Arc::clone(&refresh),
        config.poll_interval(),
    )
    .with_retention(retention);
    let poll_handle = tokio::spawn(poller.run(shutdown.subscribe()));

    let store = history.clone();
    let state = api::AppState {
        sources,
        bus,
        history,
        health,
        refresh,
        poll_interval: config.poll_interval(),
        window_hours: config.history.window_hours,
        push_clients: Arc::new(AtomicUsize::new(0)),
    };
    let addr = config.listen_socket()?;

    info!("vigild ready");
    if let Err(e) = api::serve(state, addr, shutdown.subscribe()).await {
        error!("HTTP API failed: {}", e);
        // stop the poller too
        let _ = shutdown.send(());
    }

    if let Err(e) = poll_handle.await {
        error!("Poll loop panicked: {}", e);
    }

    store.close().await;
    info!("vigild shutting down");
    shutdown_observability();
    Ok(())
}
