//! Terminal views of snapshot reports.
//!
//! Each card renders on its own; a malformed node or guest entry becomes an
//! error row instead of failing the whole view.

use async_trait::async_trait;
use colored::Colorize;
use serde_json::Value;
use std::sync::Arc;
use tabled::{settings::Style, Table, Tabled};
use vigil_core::client::Render;
use vigil_core::format::{format_bytes, format_percent, format_uptime, usage_level, UsageLevel};
use vigil_core::types::{unwrap_payload, GuestKind, GuestSummary, NodeSummary, StorageSummary};
use vigil_core::{ClusterData, ClusterStats, NextcloudSummary, Snapshot, SourceReport};

#[derive(Tabled)]
struct NodeRow {
    #[tabled(rename = "NODE")]
    name: String,
    #[tabled(rename = "STATUS")]
    status: String,
    #[tabled(rename = "CPU")]
    cpu: String,
    #[tabled(rename = "MEMORY")]
    memory: String,
    #[tabled(rename = "UPTIME")]
    uptime: String,
}

#[derive(Tabled)]
struct GuestRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "TYPE")]
    kind: String,
    #[tabled(rename = "NODE")]
    node: String,
    #[tabled(rename = "STATUS")]
    status: String,
    #[tabled(rename = "CPU")]
    cpu: String,
    #[tabled(rename = "MEMORY")]
    memory: String,
}

#[derive(Tabled)]
struct StorageRow {
    #[tabled(rename = "STORAGE")]
    name: String,
    #[tabled(rename = "NODE")]
    node: String,
    #[tabled(rename = "TYPE")]
    kind: String,
    #[tabled(rename = "USED")]
    used: String,
    #[tabled(rename = "TOTAL")]
    total: String,
}

/// Render rows of `items`, turning entries that fail to parse into error rows.
fn rows<I, T, R>(
    items: &[I],
    parse: impl Fn(&I) -> serde_json::Result<T>,
    row: impl Fn(T) -> R,
    error_row: impl Fn(String) -> R,
) -> Vec<R> {
    items
        .iter()
        .map(|item| match parse(item) {
            Ok(parsed) => row(parsed),
            Err(e) => error_row(format!("error: {}", e)),
        })
        .collect()
}

fn colored_percent(value: f64) -> String {
    let text = format_percent(value);
    match usage_level(value) {
        UsageLevel::Ok => text.green().to_string(),
        UsageLevel::Warning => text.yellow().to_string(),
        UsageLevel::Critical => text.red().to_string(),
    }
}

fn table<R: Tabled>(rows: Vec<R>) -> String {
    let mut table = Table::new(rows);
    table.with(Style::modern());
    table.to_string()
}

fn failed_card(title: &str, error: &str) -> String {
    format!("{}\n  {}", title.bold(), error.red())
}

/// The Nextcloud card.
pub fn nextcloud_card(report: &SourceReport) -> String {
    let title = "Nextcloud";
    let value = match report {
        SourceReport::Failed { error } => return failed_card(title, error),
        SourceReport::Data(value) => value,
    };
    let Some(summary) = NextcloudSummary::from_value(value) else {
        return failed_card(title, "error: response has no serverinfo data");
    };

    let mut lines = vec![format!(
        "{} {}",
        title.bold(),
        summary.version.as_deref().map(|v| format!("v{}", v)).unwrap_or_default()
    )];
    lines.push(format!(
        "  CPU     {}  (load {})",
        colored_percent(summary.cpu_percent()),
        summary.load.iter().map(|l| format!("{:.2}", l)).collect::<Vec<_>>().join(" ")
    ));
    lines.push(format!(
        "  Memory  {}  ({} / {})",
        colored_percent(summary.memory_percent()),
        format_bytes(summary.memory_used),
        format_bytes(summary.memory_total)
    ));
    if let Some(free) = summary.free_space {
        lines.push(format!("  Free    {}", format_bytes(free)));
    }
    if let (Some(users), Some(files)) = (summary.users, summary.files) {
        let active =
            summary.active_users_24h.map(|a| format!(", {} active today", a)).unwrap_or_default();
        lines.push(format!("  Users   {}{}, {} files", users, active, files));
    }
    if let Some(database) = &summary.database {
        let size =
            summary.database_size.map(|s| format!(" ({})", format_bytes(s))).unwrap_or_default();
        lines.push(format!("  DB      {}{}", database, size));
    }
    lines.join("\n")
}

/// The Proxmox card: cluster totals, nodes, guests and storage.
///
/// Reads both the direct and the relay payload shape.
pub fn proxmox_card(report: &SourceReport) -> String {
    let title = "Proxmox";
    let value = match report {
        SourceReport::Failed { error } => return failed_card(title, error),
        SourceReport::Data(value) => unwrap_payload(value),
    };

    let list = |key: &str| value.get(key).and_then(Value::as_array).cloned().unwrap_or_default();
    let nodes = list("nodes");
    let guests: Vec<(Value, GuestKind)> = list("vms")
        .into_iter()
        .map(|g| (g, GuestKind::Vm))
        .chain(list("containers").into_iter().map(|g| (g, GuestKind::Container)))
        .collect();
    let storage = list("storage");

    let mut out = vec![title.bold().to_string()];

    if let Some(data) = ClusterData::from_value(value) {
        let stats = ClusterStats::from(&data);
        out.push(format!(
            "  {}/{} nodes online, {}/{} guests running, CPU {}, memory {} ({} / {})",
            stats.nodes_online,
            stats.nodes_total,
            stats.vms_running,
            stats.vms_total,
            colored_percent(stats.cpu_percent),
            colored_percent(stats.memory_percent),
            format_bytes(stats.memory_used),
            format_bytes(stats.memory_total)
        ));
        for error in &data.errors {
            out.push(format!("  {}", format!("{}: {}", error.host, error.error).red()));
        }
    }

    if nodes.is_empty() {
        out.push("  No nodes reported".dimmed().to_string());
        return out.join("\n");
    }

    out.push(table(rows(&nodes, NodeSummary::from_value, node_row, |error| NodeRow {
        name: "-".into(),
        status: error.red().to_string(),
        cpu: String::new(),
        memory: String::new(),
        uptime: String::new(),
    })));

    if !guests.is_empty() {
        let parse = |(value, kind): &(Value, GuestKind)| GuestSummary::from_value(value, *kind);
        out.push(table(rows(&guests, parse, guest_row, |error| GuestRow {
            id: "-".into(),
            name: error.red().to_string(),
            kind: String::new(),
            node: String::new(),
            status: String::new(),
            cpu: String::new(),
            memory: String::new(),
        })));
    }

    if !storage.is_empty() {
        out.push(table(rows(&storage, StorageSummary::from_value, storage_row, |error| {
            StorageRow {
                name: error.red().to_string(),
                node: String::new(),
                kind: String::new(),
                used: String::new(),
                total: String::new(),
            }
        })));
    }

    out.join("\n")
}

fn node_row(n: NodeSummary) -> NodeRow {
    let status =
        if n.is_online() { n.status.green().to_string() } else { n.status.red().to_string() };
    NodeRow {
        status,
        cpu: colored_percent(n.cpu),
        memory: format!("{} ({})", format_bytes(n.memory_used), format_percent(n.memory_percent)),
        uptime: format_uptime(n.uptime),
        name: n.name,
    }
}

fn guest_row(g: GuestSummary) -> GuestRow {
    let status =
        if g.is_running() { g.status.green().to_string() } else { g.status.dimmed().to_string() };
    GuestRow {
        id: g.id.to_string(),
        kind: g.kind.endpoint().to_string(),
        status,
        cpu: format_percent(g.cpu),
        memory: format!("{} / {}", format_bytes(g.memory), format_bytes(g.maxmem)),
        name: g.name,
        node: g.node,
    }
}

fn storage_row(s: StorageSummary) -> StorageRow {
    let used = if s.total == 0 { 0.0 } else { s.used as f64 / s.total as f64 * 100.0 };
    StorageRow {
        used: colored_percent(used),
        total: format_bytes(s.total),
        name: s.name,
        node: s.node,
        kind: s.kind,
    }
}

/// Header line printed above each update.
pub fn snapshot_header(snapshot: &Snapshot) -> String {
    let failed = snapshot.failed_sources();
    let state = if failed == 0 {
        "all sources ok".green().to_string()
    } else {
        format!("{} source(s) failing", failed).yellow().to_string()
    };
    format!(
        "{} cycle {} at {}, {}",
        "==".dimmed(),
        snapshot.cycle,
        snapshot.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
        state
    )
}

/// Prints the Nextcloud card of each snapshot.
pub struct NextcloudView;

/// Prints the Proxmox card of each snapshot.
pub struct ProxmoxView;

#[async_trait]
impl Render<Arc<Snapshot>> for NextcloudView {
    async fn render(&self, snapshot: Arc<Snapshot>) -> vigil_core::Result<()> {
        println!("{}\n{}\n", snapshot_header(&snapshot), nextcloud_card(&snapshot.nextcloud));
        Ok(())
    }
}

#[async_trait]
impl Render<Arc<Snapshot>> for ProxmoxView {
    async fn render(&self, snapshot: Arc<Snapshot>) -> vigil_core::Result<()> {
        println!("{}\n", proxmox_card(&snapshot.proxmox));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn plain() {
        colored::control::set_override(false);
    }

    #[test]
    fn test_failed_reports_render_error_card() {
        plain();
        let card = proxmox_card(&SourceReport::failed("proxmox returned HTTP 502"));
        assert!(card.contains("Proxmox"));
        assert!(card.contains("proxmox returned HTTP 502"));

        let card = nextcloud_card(&SourceReport::Data(json!({"unexpected": true})));
        assert!(card.contains("no serverinfo data"));
    }

    #[test]
    fn test_malformed_node_becomes_error_row() {
        plain();
        let report = SourceReport::Data(json!({
            "nodes": [
                {"name": "pve1", "status": "online", "cpu": 12.5, "memory_used": 1073741824,
                 "memory_total": 4294967296u64, "memory_percent": 25.0, "uptime": 90061,
                 "load": [0.1, 0.2, 0.3], "host": "pve1"},
                {"name": "pve2", "status": 7}
            ],
            "vms": [],
            "storage": [],
            "cluster_status": "online"
        }));

        let card = proxmox_card(&report);
        assert!(card.contains("pve1"));
        assert!(card.contains("1d 1h 1m"));
        assert!(card.contains("1 GB (25.0%)"));
        assert!(card.contains("error:"));
    }

    #[test]
    fn test_nextcloud_card() {
        plain();
        let report = SourceReport::Data(json!({"ocs": {"data": {
            "nextcloud": {
                "system": {"version": "28.0.1", "cpuload": [0.5, 0.4, 0.3], "cpunum": 2,
                           "mem_total": 4194304, "mem_free": 1048576},
                "storage": {"num_users": 3, "num_files": 120}
            },
            "activeUsers": {"last24hours": 2}
        }}}));

        let card = nextcloud_card(&report);
        assert!(card.contains("v28.0.1"));
        assert!(card.contains("CPU     25.0%"));
        assert!(card.contains("3 GB / 4 GB"));
        assert!(card.contains("3, 2 active today, 120 files"));
    }

    #[test]
    fn test_relay_payload_renders_nodes_and_guests() {
        plain();
        let report = SourceReport::Data(json!({
            "data": {
                "nodes": [
                    {"node": "pve1", "status": "online", "cpu": 0.25,
                     "memory": {"used": 1073741824, "total": 4294967296u64, "percentage": 25.0}},
                    {"node": "pve2", "status": "offline", "cpu": null, "memory": null}
                ],
                "vms": [{"vmid": 100, "name": "web", "node": "pve1", "status": "running",
                         "cpu": 0.5, "memory": {"used": 512, "total": 1024, "percentage": 50.0}}],
                "containers": [{"vmid": 200, "name": "dns", "node": "pve1", "status": "stopped",
                                "cpu": 0, "memory": null}]
            },
            "last_update": "2024-01-01T12:00:00"
        }));

        let card = proxmox_card(&report);
        assert!(!card.contains("error:"), "{}", card);
        assert!(card.contains("1/2 nodes online, 1/2 guests running"));
        assert!(card.contains("pve2"));
        assert!(card.contains("1 GB (25.0%)"));
        assert!(card.contains("web"));
        assert!(card.contains("dns"));
        assert!(card.contains("lxc"));
    }

    #[test]
    fn test_relay_payload_without_nodes() {
        plain();
        let card = proxmox_card(&SourceReport::Data(json!({"data": {"something": "else"}})));
        assert!(card.contains("No nodes reported"));
    }
}
