//! Proxmox cluster data as collected in direct mode, plus the aggregates
//! derived from it.
//!
//! A relay API reports the same cluster in its own shape
//! (`{nodes: [{node, cpu, memory: {used, total}}], vms: [{vmid, ...}], containers}`);
//! the `from_value` constructors accept both.

use super::unwrap_payload;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

/// Whether any node of the cluster could be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterStatus {
    Online,
    Offline,
}

/// One Proxmox node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSummary {
    pub name: String,
    /// `online`, `offline` or `unknown` as reported by `/nodes`.
    pub status: String,
    /// CPU usage in percent (0-100 per node).
    pub cpu: f64,
    pub memory_used: u64,
    pub memory_total: u64,
    pub memory_percent: f64,
    /// Seconds since boot.
    pub uptime: u64,
    pub load: [f64; 3],
    /// Host the node was collected through.
    pub host: String,
}

impl NodeSummary {
    pub fn is_online(&self) -> bool {
        self.status == "online"
    }

    /// Parse a node entry in either the direct or the relay shape.
    pub fn from_value(value: &Value) -> serde_json::Result<Self> {
        if is_relay_entry(value, "node") {
            serde_json::from_value::<RelayNode>(value.clone()).map(Self::from)
        } else {
            serde_json::from_value(value.clone())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuestKind {
    Vm,
    Container,
}

impl GuestKind {
    /// Path segment of the per-node listing endpoint.
    pub fn endpoint(&self) -> &'static str {
        match self {
            Self::Vm => "qemu",
            Self::Container => "lxc",
        }
    }
}

/// A virtual machine or LXC container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuestSummary {
    pub id: u32,
    pub name: String,
    pub status: String,
    pub node: String,
    pub host: String,
    #[serde(rename = "type")]
    pub kind: GuestKind,
    /// CPU usage in percent.
    pub cpu: f64,
    pub memory: u64,
    pub maxmem: u64,
}

impl GuestSummary {
    pub fn is_running(&self) -> bool {
        self.status == "running"
    }

    /// Cluster-wide identity: vmids are only unique per node.
    pub fn key(&self) -> String {
        format!("{}-{}", self.node, self.id)
    }

    /// Parse a guest entry in either shape. Relay entries carry no type, so
    /// `kind` is taken from the list they were found in.
    pub fn from_value(value: &Value, kind: GuestKind) -> serde_json::Result<Self> {
        if is_relay_entry(value, "vmid") {
            serde_json::from_value::<RelayGuest>(value.clone()).map(|g| g.into_summary(kind))
        } else {
            serde_json::from_value(value.clone())
        }
    }
}

/// One storage pool as seen from one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageSummary {
    pub node: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub total: u64,
    pub used: u64,
    pub available: u64,
    pub host: String,
}

impl StorageSummary {
    /// Parse a storage entry, either ours or a raw `/cluster/resources` one.
    pub fn from_value(value: &Value) -> serde_json::Result<Self> {
        if is_relay_entry(value, "storage") {
            serde_json::from_value::<RelayStorage>(value.clone()).map(Self::from)
        } else {
            serde_json::from_value(value.clone())
        }
    }
}

/// A host that could not be collected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostError {
    pub host: String,
    pub error: String,
}

/// Everything collected from the configured Proxmox hosts in one pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterData {
    pub nodes: Vec<NodeSummary>,
    pub vms: Vec<GuestSummary>,
    pub storage: Vec<StorageSummary>,
    pub cluster_status: ClusterStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<HostError>,
    /// Raw `/nodes/{node}/status` bodies, only filled by detailed fetches.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_details: BTreeMap<String, Value>,
}

impl Default for ClusterData {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            vms: Vec::new(),
            storage: Vec::new(),
            cluster_status: ClusterStatus::Offline,
            errors: Vec::new(),
            node_details: BTreeMap::new(),
        }
    }
}

impl ClusterData {
    /// Merge per-host results into one cluster view.
    ///
    /// Hosts of the same cluster report the same nodes and guests, so nodes are
    /// kept once per name and guests once per `node-vmid`. Storage is per node
    /// already and is kept as reported.
    pub fn merge(parts: impl IntoIterator<Item = ClusterData>) -> Self {
        let mut merged = ClusterData::default();
        let mut seen_nodes = HashSet::new();
        let mut seen_guests = HashSet::new();

        for part in parts {
            for node in part.nodes {
                if seen_nodes.insert(node.name.clone()) {
                    merged.nodes.push(node);
                }
            }
            for guest in part.vms {
                if seen_guests.insert(guest.key()) {
                    merged.vms.push(guest);
                }
            }
            merged.storage.extend(part.storage);
            merged.errors.extend(part.errors);
            for (name, detail) in part.node_details {
                merged.node_details.entry(name).or_insert(detail);
            }
        }

        merged.cluster_status =
            if merged.nodes.is_empty() { ClusterStatus::Offline } else { ClusterStatus::Online };
        merged
    }

    /// Read a Proxmox payload in the direct or the relay shape.
    ///
    /// `None` when the document is neither. A `{"data": ...}` envelope is
    /// stripped first.
    pub fn from_value(value: &Value) -> Option<Self> {
        let value = unwrap_payload(value);
        if let Ok(data) = serde_json::from_value::<ClusterData>(value.clone()) {
            return Some(data);
        }
        serde_json::from_value::<RelayCluster>(value.clone()).ok().map(Self::from)
    }

    pub fn online_nodes(&self) -> impl Iterator<Item = &NodeSummary> {
        self.nodes.iter().filter(|n| n.is_online())
    }

    pub fn running_guests(&self) -> usize {
        self.vms.iter().filter(|g| g.is_running()).count()
    }
}

/// Cluster-wide aggregates over online nodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterStats {
    pub nodes_total: u32,
    pub nodes_online: u32,
    /// Average CPU percent over online nodes.
    pub cpu_percent: f64,
    pub memory_used: u64,
    pub memory_total: u64,
    pub memory_percent: f64,
    pub vms_running: u32,
    pub vms_total: u32,
    pub storage_used: u64,
    pub storage_total: u64,
}

impl From<&ClusterData> for ClusterStats {
    fn from(data: &ClusterData) -> Self {
        let online: Vec<&NodeSummary> = data.online_nodes().collect();
        let cpu_percent = if online.is_empty() {
            0.0
        } else {
            online.iter().map(|n| n.cpu).sum::<f64>() / online.len() as f64
        };
        let memory_used: u64 = online.iter().map(|n| n.memory_used).sum();
        let memory_total: u64 = online.iter().map(|n| n.memory_total).sum();

        Self {
            nodes_total: data.nodes.len() as u32,
            nodes_online: online.len() as u32,
            cpu_percent,
            memory_used,
            memory_total,
            memory_percent: percent(memory_used, memory_total),
            vms_running: data.running_guests() as u32,
            vms_total: data.vms.len() as u32,
            storage_used: data.storage.iter().map(|s| s.used).sum(),
            storage_total: data.storage.iter().map(|s| s.total).sum(),
        }
    }
}

/// Relay entries carry a key ours never do (`node`, `vmid`, `storage`).
fn is_relay_entry(value: &Value, relay_key: &str) -> bool {
    value.get(relay_key).is_some()
}

#[derive(Debug, Deserialize)]
struct RelayMemory {
    #[serde(default)]
    used: u64,
    #[serde(default)]
    total: u64,
}

/// Node as the relay reports it. Detailed bodies carry the raw `/nodes`
/// fields (`mem`, `maxmem`) instead of `memory`.
#[derive(Debug, Deserialize)]
struct RelayNode {
    node: String,
    #[serde(default)]
    status: Option<String>,
    /// Fraction of one, as Proxmox reports it.
    #[serde(default)]
    cpu: Option<f64>,
    #[serde(default)]
    memory: Option<RelayMemory>,
    #[serde(default)]
    mem: Option<u64>,
    #[serde(default)]
    maxmem: Option<u64>,
    #[serde(default)]
    uptime: Option<u64>,
}

impl From<RelayNode> for NodeSummary {
    fn from(node: RelayNode) -> Self {
        let memory = node.memory.unwrap_or(RelayMemory {
            used: node.mem.unwrap_or(0),
            total: node.maxmem.unwrap_or(0),
        });
        Self {
            status: node.status.unwrap_or_else(|| "unknown".to_string()),
            cpu: node.cpu.unwrap_or(0.0) * 100.0,
            memory_used: memory.used,
            memory_total: memory.total,
            memory_percent: percent(memory.used, memory.total),
            uptime: node.uptime.unwrap_or(0),
            load: [0.0; 3],
            host: String::new(),
            name: node.node,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RelayGuest {
    vmid: u32,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    node: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    cpu: Option<f64>,
    #[serde(default)]
    memory: Option<RelayMemory>,
    #[serde(default)]
    mem: Option<u64>,
    #[serde(default)]
    maxmem: Option<u64>,
}

impl RelayGuest {
    fn into_summary(self, kind: GuestKind) -> GuestSummary {
        let memory = self.memory.unwrap_or(RelayMemory {
            used: self.mem.unwrap_or(0),
            total: self.maxmem.unwrap_or(0),
        });
        GuestSummary {
            id: self.vmid,
            name: self.name.unwrap_or_else(|| self.vmid.to_string()),
            status: self.status.unwrap_or_else(|| "unknown".to_string()),
            node: self.node.unwrap_or_default(),
            host: String::new(),
            kind,
            cpu: self.cpu.unwrap_or(0.0) * 100.0,
            memory: memory.used,
            maxmem: memory.total,
        }
    }
}

/// Storage entry of `/cluster/resources`.
#[derive(Debug, Deserialize)]
struct RelayStorage {
    storage: String,
    #[serde(default)]
    node: Option<String>,
    #[serde(default)]
    plugintype: Option<String>,
    #[serde(default)]
    disk: Option<u64>,
    #[serde(default)]
    maxdisk: Option<u64>,
}

impl From<RelayStorage> for StorageSummary {
    fn from(storage: RelayStorage) -> Self {
        let used = storage.disk.unwrap_or(0);
        let total = storage.maxdisk.unwrap_or(0);
        Self {
            node: storage.node.unwrap_or_default(),
            name: storage.storage,
            kind: storage.plugintype.unwrap_or_default(),
            total,
            used,
            available: total.saturating_sub(used),
            host: String::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RelayCluster {
    nodes: Vec<Value>,
    #[serde(default)]
    vms: Vec<Value>,
    #[serde(default)]
    containers: Vec<Value>,
    #[serde(default)]
    storage: Vec<Value>,
}

impl From<RelayCluster> for ClusterData {
    fn from(relay: RelayCluster) -> Self {
        // entries that do not parse are left out of the aggregates
        let nodes: Vec<NodeSummary> =
            relay.nodes.iter().filter_map(|n| NodeSummary::from_value(n).ok()).collect();
        let vms = relay
            .vms
            .iter()
            .map(|g| (g, GuestKind::Vm))
            .chain(relay.containers.iter().map(|g| (g, GuestKind::Container)))
            .filter_map(|(g, kind)| GuestSummary::from_value(g, kind).ok())
            .collect();
        let storage =
            relay.storage.iter().filter_map(|s| StorageSummary::from_value(s).ok()).collect();
        let cluster_status =
            if nodes.is_empty() { ClusterStatus::Offline } else { ClusterStatus::Online };

        Self {
            nodes,
            vms,
            storage,
            cluster_status,
            errors: Vec::new(),
            node_details: BTreeMap::new(),
        }
    }
}

/// `part / whole` in percent, zero when `whole` is zero.
pub(crate) fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}
