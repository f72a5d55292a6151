//! Poll loop.
//!
//! Fetches both upstreams on a fixed interval (or on demand), records history
//! and publishes one snapshot per cycle. Upstream failures end up in the
//! snapshot as `{error}` reports; nothing in a cycle is fatal.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Notify};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};
use vigil_core::observability::health::HealthStatus;
use vigil_core::observability::metrics as telemetry;
use vigil_core::{
    HealthChecker, HistoryRecord, HistoryStore, NodeHistoryRecord, Snapshot, SnapshotBus,
    SourceKind, SourceReport, Sources, VigilError,
};

/// Health subsystem name of the history store.
pub const HISTORY_SUBSYSTEM: &str = "history";

/// Outcome of one poll cycle.
#[derive(Debug, Default)]
pub struct CycleReport {
    pub cycle: u64,
    pub failed: Vec<SourceKind>,
    pub recorded: usize,
    /// Per-node Proxmox rows written.
    pub node_rows: usize,
    pub pruned: u64,
}

pub struct Poller {
    sources: Sources,
    bus: SnapshotBus,
    history: HistoryStore,
    health: HealthChecker,
    refresh: Arc<Notify>,
    interval: Duration,
    retention: Option<Duration>,
    cycle: u64,
}

impl Poller {
    pub fn new(
        sources: Sources,
        bus: SnapshotBus,
        history: HistoryStore,
        health: HealthChecker,
        refresh: Arc<Notify>,
        interval: Duration,
    ) -> Self {
        Self { sources, bus, history, health, refresh, interval, retention: None, cycle: 0 }
    }

    /// Prune history rows older than `retention` after each cycle.
    pub fn with_retention(mut self, retention: Option<Duration>) -> Self {
        self.retention = retention;
        self
    }

    /// Poll until a shutdown message arrives. A cycle in flight always completes.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(interval_secs = self.interval.as_secs(), "Poll loop started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.refresh.notified() => {
                    debug!("Refresh requested");
                    ticker.reset();
                }
                _ = shutdown.recv() => {
                    info!("Poll loop stopping");
                    break;
                }
            }

            self.poll_once().await;
        }
    }

    /// Run one cycle: fetch, record, publish.
    #[instrument(skip(self))]
    pub async fn poll_once(&mut self) -> CycleReport {
        let started = Instant::now();
        self.cycle += 1;

        let (nextcloud, proxmox) =
            tokio::join!(self.sources.nextcloud.fetch(), self.sources.proxmox.fetch());
        let snapshot =
            Snapshot::new(self.cycle, SourceReport::from(nextcloud), SourceReport::from(proxmox));

        let mut report = CycleReport { cycle: self.cycle, ..Default::default() };
        let mut history_failed = false;
        for kind in SourceKind::ALL {
            let source_report = snapshot.report(kind);
            match source_report.error() {
                Some(error) => {
                    warn!(source = %kind, %error, "Upstream fetch failed");
                    telemetry::record_upstream_failure(kind.as_str());
                    report.failed.push(kind);
                    self.health
                        .update_subsystem(
                            kind.as_str(),
                            HealthStatus::Degraded,
                            Some(error.to_string()),
                        )
                        .await;
                }
                None => {
                    self.health.update_subsystem(kind.as_str(), HealthStatus::Healthy, None).await;
                }
            }

            let timestamp = snapshot.timestamp;
            if let Some(record) = HistoryRecord::from_report(kind, source_report, timestamp) {
                match self.history.record(&record).await {
                    Ok(()) => report.recorded += 1,
                    Err(e) => {
                        warn!(source = %kind, error = %e, "Failed to record history");
                        self.history_degraded(&e).await;
                        history_failed = true;
                    }
                }
            }

            if kind == SourceKind::Proxmox {
                let nodes = NodeHistoryRecord::from_report(source_report, timestamp);
                match self.history.record_nodes(&nodes).await {
                    Ok(()) => report.node_rows = nodes.len(),
                    Err(e) => {
                        warn!(error = %e, "Failed to record node history");
                        self.history_degraded(&e).await;
                        history_failed = true;
                    }
                }
            }
        }

        if report.recorded > 0 && !history_failed {
            self.health.update_subsystem(HISTORY_SUBSYSTEM, HealthStatus::Healthy, None).await;
        }

        if let Some(retention) = self.retention {
            match self.history.prune(retention).await {
                Ok(pruned) => report.pruned = pruned,
                Err(e) => warn!(error = %e, "Failed to prune history"),
            }
        }

        self.bus.publish(snapshot).await;

        telemetry::record_poll_cycle(started.elapsed().as_secs_f64());
        debug!(
            cycle = report.cycle,
            failed = report.failed.len(),
            recorded = report.recorded,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Poll cycle complete"
        );
        report
    }

    async fn history_degraded(&self, error: &VigilError) {
        self.health
            .update_subsystem(HISTORY_SUBSYSTEM, HealthStatus::Degraded, Some(error.to_string()))
            .await;
    }
}
