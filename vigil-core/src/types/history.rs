//! History records and the sources they belong to.

use super::cluster::{ClusterData, ClusterStats, NodeSummary};
use super::nextcloud::NextcloudSummary;
use super::snapshot::SourceReport;
use crate::error::VigilError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// The two upstream systems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Nextcloud,
    Proxmox,
}

impl SourceKind {
    pub const ALL: [SourceKind; 2] = [SourceKind::Nextcloud, SourceKind::Proxmox];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nextcloud => "nextcloud",
            Self::Proxmox => "proxmox",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = VigilError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "nextcloud" => Ok(Self::Nextcloud),
            "proxmox" => Ok(Self::Proxmox),
            other => Err(VigilError::UnknownSource(other.to_string())),
        }
    }
}

/// One aggregate row per source per poll cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub source: SourceKind,
    pub timestamp: DateTime<Utc>,
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub memory_used: u64,
    pub memory_total: u64,
    pub nodes_count: u32,
    pub vms_running: u32,
    pub vms_total: u32,
}

impl HistoryRecord {
    pub fn from_cluster(stats: &ClusterStats, timestamp: DateTime<Utc>) -> Self {
        Self {
            source: SourceKind::Proxmox,
            timestamp,
            cpu_percent: stats.cpu_percent,
            memory_percent: stats.memory_percent,
            memory_used: stats.memory_used,
            memory_total: stats.memory_total,
            nodes_count: stats.nodes_online,
            vms_running: stats.vms_running,
            vms_total: stats.vms_total,
        }
    }

    pub fn from_nextcloud(summary: &NextcloudSummary, timestamp: DateTime<Utc>) -> Self {
        Self {
            source: SourceKind::Nextcloud,
            timestamp,
            cpu_percent: summary.cpu_percent(),
            memory_percent: summary.memory_percent(),
            memory_used: summary.memory_used,
            memory_total: summary.memory_total,
            nodes_count: 1,
            vms_running: 0,
            vms_total: 0,
        }
    }

    /// Build the record for one source's part of a snapshot.
    ///
    /// Failed reports and bodies that are not in a recognized shape yield `None`.
    pub fn from_report(
        source: SourceKind,
        report: &SourceReport,
        timestamp: DateTime<Utc>,
    ) -> Option<Self> {
        let value = report.value()?;
        match source {
            SourceKind::Nextcloud => NextcloudSummary::from_value(value)
                .map(|summary| Self::from_nextcloud(&summary, timestamp)),
            SourceKind::Proxmox => match ClusterData::from_value(value) {
                Some(data) => Some(Self::from_cluster(&ClusterStats::from(&data), timestamp)),
                None => {
                    debug!("Proxmox payload is not cluster data, no history row");
                    None
                }
            },
        }
    }
}

/// One Proxmox node's sample in one poll cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeHistoryRecord {
    pub node: String,
    pub timestamp: DateTime<Utc>,
    pub status: String,
    pub cpu_percent: f64,
    pub memory_used: u64,
    pub memory_total: u64,
    pub memory_percent: f64,
}

impl NodeHistoryRecord {
    pub fn from_node(node: &NodeSummary, timestamp: DateTime<Utc>) -> Self {
        Self {
            node: node.name.clone(),
            timestamp,
            status: node.status.clone(),
            cpu_percent: node.cpu,
            memory_used: node.memory_used,
            memory_total: node.memory_total,
            memory_percent: node.memory_percent,
        }
    }

    /// One row per node of a Proxmox report, offline nodes included.
    pub fn from_report(report: &SourceReport, timestamp: DateTime<Utc>) -> Vec<Self> {
        report
            .value()
            .and_then(ClusterData::from_value)
            .map(|data| data.nodes.iter().map(|n| Self::from_node(n, timestamp)).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_source_kind_parse() {
        assert_eq!("proxmox".parse::<SourceKind>().unwrap(), SourceKind::Proxmox);
        assert_eq!(SourceKind::Nextcloud.to_string(), "nextcloud");
        assert!(matches!("vmware".parse::<SourceKind>(), Err(VigilError::UnknownSource(_))));
    }

    #[test]
    fn test_record_from_wrapped_cluster_report() {
        let report = SourceReport::Data(json!({
            "data": {
                "nodes": [
                    {"name": "pve1", "status": "online", "cpu": 50.0, "memory_used": 2,
                     "memory_total": 4, "memory_percent": 50.0, "uptime": 10,
                     "load": [0.0, 0.0, 0.0], "host": "pve1"}
                ],
                "vms": [],
                "storage": [],
                "cluster_status": "online"
            }
        }));

        let record = HistoryRecord::from_report(SourceKind::Proxmox, &report, Utc::now()).unwrap();
        assert_eq!(record.source, SourceKind::Proxmox);
        assert_eq!(record.nodes_count, 1);
        assert_eq!(record.cpu_percent, 50.0);
        assert_eq!(record.memory_total, 4);
    }

    #[test]
    fn test_record_from_relay_report() {
        let report = SourceReport::Data(json!({
            "data": {
                "nodes": [
                    {"node": "pve1", "status": "online", "cpu": 0.4,
                     "memory": {"used": 3, "total": 4, "percentage": 75.0}},
                    {"node": "pve2", "status": "offline", "cpu": null, "memory": null}
                ],
                "vms": [{"vmid": 100, "name": "web", "node": "pve1", "status": "running",
                         "cpu": 0.1, "memory": {"used": 1, "total": 2, "percentage": 50.0}}],
                "containers": [{"vmid": 200, "name": "dns", "node": "pve1", "status": "stopped",
                                "cpu": 0, "memory": null}]
            },
            "last_update": "2024-01-01T12:00:00"
        }));

        let record = HistoryRecord::from_report(SourceKind::Proxmox, &report, Utc::now()).unwrap();
        assert_eq!(record.nodes_count, 1);
        assert!((record.cpu_percent - 40.0).abs() < 1e-9);
        assert_eq!(record.memory_used, 3);
        assert_eq!(record.memory_total, 4);
        assert_eq!(record.vms_running, 1);
        assert_eq!(record.vms_total, 2);
    }

    #[test]
    fn test_node_records_include_offline_nodes() {
        let report = SourceReport::Data(json!({"data": {"nodes": [
            {"node": "pve1", "status": "online", "cpu": 0.5,
             "memory": {"used": 1, "total": 4, "percentage": 25.0}},
            {"node": "pve2", "status": "offline", "cpu": null, "memory": null}
        ]}}));

        let rows = NodeHistoryRecord::from_report(&report, Utc::now());
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].node, "pve1");
        assert_eq!(rows[0].cpu_percent, 50.0);
        assert_eq!(rows[1].status, "offline");

        let failed = SourceReport::failed("down");
        assert!(NodeHistoryRecord::from_report(&failed, Utc::now()).is_empty());
    }

    #[test]
    fn test_no_record_for_failures_or_unknown_shapes() {
        let failed = SourceReport::failed("down");
        assert!(HistoryRecord::from_report(SourceKind::Proxmox, &failed, Utc::now()).is_none());

        let odd = SourceReport::Data(json!({"hello": "world"}));
        assert!(HistoryRecord::from_report(SourceKind::Proxmox, &odd, Utc::now()).is_none());
        assert!(HistoryRecord::from_report(SourceKind::Nextcloud, &odd, Utc::now()).is_none());
    }
}
