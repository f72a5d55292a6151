//! vigil core library
//!
//! Shared types, configuration, upstream clients, history store and client-side
//! coordination for the vigil Nextcloud/Proxmox monitor.

pub mod bus;
pub mod client;
pub mod config;
pub mod error;
pub mod format;
pub mod history;
pub mod observability;
pub mod paths;
pub mod types;
pub mod upstream;

// Re-export commonly used items
pub use bus::{SnapshotBus, SnapshotSubscriber};
pub use config::Config;
pub use error::{Result, VigilError};
pub use history::HistoryStore;
pub use observability::{
    health::HealthChecker, init as init_observability, shutdown as shutdown_observability,
};
pub use types::{
    ClientMessage, ClusterData, ClusterStats, HistoryRecord, NextcloudSummary, NodeHistoryRecord,
    ServerMessage, Snapshot, SourceKind, SourceReport,
};
pub use upstream::{MetricsSource, Sources};
