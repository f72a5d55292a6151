//! Snapshot fan-out.
//!
//! Holds the latest snapshot and broadcasts each new one to subscribers.
//! A subscriber sees the latest snapshot first, then every later cycle at
//! most once, in order.

use crate::types::Snapshot;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

const SNAPSHOT_BUFFER_SIZE: usize = 16;

#[derive(Clone)]
pub struct SnapshotBus {
    sender: broadcast::Sender<Arc<Snapshot>>,
    latest: Arc<RwLock<Option<Arc<Snapshot>>>>,
}

impl SnapshotBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(SNAPSHOT_BUFFER_SIZE);
        Self { sender, latest: Arc::new(RwLock::new(None)) }
    }

    /// Store `snapshot` as the latest and broadcast it.
    pub async fn publish(&self, snapshot: Snapshot) -> Arc<Snapshot> {
        let snapshot = Arc::new(snapshot);
        let mut latest = self.latest.write().await;
        *latest = Some(Arc::clone(&snapshot));
        debug!(
            cycle = snapshot.cycle,
            subscribers = self.sender.receiver_count(),
            "Publishing snapshot"
        );
        // No subscribers is fine
        let _ = self.sender.send(Arc::clone(&snapshot));
        snapshot
    }

    pub async fn latest(&self) -> Option<Arc<Snapshot>> {
        self.latest.read().await.clone()
    }

    /// Subscribe. The first `recv` yields the latest snapshot if there is one.
    pub async fn subscribe(&self) -> SnapshotSubscriber {
        // Subscribe before reading `latest` so no cycle falls in between.
        let receiver = self.sender.subscribe();
        let initial = self.latest.read().await.clone();
        SnapshotSubscriber { receiver, initial, last_cycle: None }
    }
}

impl Default for SnapshotBus {
    fn default() -> Self {
        Self::new()
    }
}

pub struct SnapshotSubscriber {
    receiver: broadcast::Receiver<Arc<Snapshot>>,
    initial: Option<Arc<Snapshot>>,
    last_cycle: Option<u64>,
}

impl SnapshotSubscriber {
    /// Next undelivered snapshot. `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<Arc<Snapshot>> {
        if let Some(snapshot) = self.initial.take() {
            self.last_cycle = Some(snapshot.cycle);
            return Some(snapshot);
        }

        loop {
            match self.receiver.recv().await {
                Ok(snapshot) => {
                    if self.last_cycle.is_some_and(|last| snapshot.cycle <= last) {
                        continue;
                    }
                    self.last_cycle = Some(snapshot.cycle);
                    return Some(snapshot);
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!("Snapshot subscriber lagged by {} cycles", n);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn last_cycle(&self) -> Option<u64> {
        self.last_cycle
    }
}
