//! `vigil history` command

use crate::client::{History, RelaySample, VigilClient};
use anyhow::{bail, Result};
use tabled::{settings::Style, Table, Tabled};
use vigil_core::format::{format_bytes, format_percent};
use vigil_core::{HistoryRecord, NodeHistoryRecord, SourceKind};

#[derive(Tabled)]
struct HistoryRow {
    #[tabled(rename = "TIME")]
    time: String,
    #[tabled(rename = "CPU")]
    cpu: String,
    #[tabled(rename = "MEMORY")]
    memory: String,
    #[tabled(rename = "NODES")]
    nodes: u32,
    #[tabled(rename = "GUESTS")]
    guests: String,
}

impl From<HistoryRecord> for HistoryRow {
    fn from(r: HistoryRecord) -> Self {
        Self {
            time: r.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            cpu: format_percent(r.cpu_percent),
            memory: format!(
                "{} ({})",
                format_bytes(r.memory_used),
                format_percent(r.memory_percent)
            ),
            nodes: r.nodes_count,
            guests: format!("{}/{}", r.vms_running, r.vms_total),
        }
    }
}

#[derive(Tabled)]
struct NodeRow {
    #[tabled(rename = "TIME")]
    time: String,
    #[tabled(rename = "STATUS")]
    status: String,
    #[tabled(rename = "CPU")]
    cpu: String,
    #[tabled(rename = "MEMORY")]
    memory: String,
}

impl From<NodeHistoryRecord> for NodeRow {
    fn from(r: NodeHistoryRecord) -> Self {
        Self {
            time: r.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            status: r.status,
            cpu: format_percent(r.cpu_percent),
            memory: format!(
                "{} ({})",
                format_bytes(r.memory_used),
                format_percent(r.memory_percent)
            ),
        }
    }
}

#[derive(Tabled)]
struct SampleRow {
    #[tabled(rename = "TIME")]
    time: String,
    #[tabled(rename = "SAMPLE")]
    sample: String,
}

impl From<RelaySample> for SampleRow {
    fn from(s: RelaySample) -> Self {
        Self { time: s.timestamp, sample: s.data.to_string() }
    }
}

/// The last `limit` items, oldest first.
fn newest<T>(items: Vec<T>, limit: usize) -> impl Iterator<Item = T> {
    let skip = items.len().saturating_sub(limit);
    items.into_iter().skip(skip)
}

fn print_table<R: Tabled>(rows: impl IntoIterator<Item = R>) {
    let mut table = Table::new(rows);
    table.with(Style::modern());
    println!("{}", table);
}

/// Print stored history samples of one source, or of one Proxmox node.
pub async fn history(
    client: &VigilClient,
    source: SourceKind,
    node: Option<String>,
    hours: Option<u32>,
    limit: usize,
) -> Result<()> {
    if let Some(node) = node {
        if source != SourceKind::Proxmox {
            bail!("--node only applies to proxmox history");
        }
        let records = client.node_history(&node, hours).await?;
        if records.is_empty() {
            println!("No history for node {} in this window", node);
            return Ok(());
        }
        print_table(newest(records, limit).map(NodeRow::from));
        return Ok(());
    }

    match client.history(source, hours).await? {
        History::Stored(records) if records.is_empty() => {
            println!("No {} history in this window", source);
        }
        History::Stored(records) => print_table(newest(records, limit).map(HistoryRow::from)),
        History::Relay(samples) if samples.is_empty() => {
            println!("Relay has no {} history yet", source);
        }
        History::Relay(samples) => print_table(newest(samples, limit).map(SampleRow::from)),
    }

    Ok(())
}
