//! `vigil health` command

use crate::client::VigilClient;
use anyhow::Result;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};
use vigil_core::format::format_uptime;
use vigil_core::observability::health::HealthStatus;

#[derive(Tabled)]
struct SubsystemRow {
    #[tabled(rename = "SUBSYSTEM")]
    name: String,
    #[tabled(rename = "STATUS")]
    status: String,
    #[tabled(rename = "MESSAGE")]
    message: String,
}

fn colored_status(status: HealthStatus) -> String {
    match status {
        HealthStatus::Healthy => "healthy".green().to_string(),
        HealthStatus::Degraded => "degraded".yellow().to_string(),
        HealthStatus::Unhealthy => "unhealthy".red().to_string(),
    }
}

/// Check daemon health
pub async fn health(client: &VigilClient) -> Result<()> {
    let health = client.health().await?;

    println!(
        "vigild {} is {} (up {})",
        health.version,
        colored_status(health.status),
        format_uptime(health.uptime_secs)
    );

    if health.subsystems.is_empty() {
        return Ok(());
    }

    let rows: Vec<SubsystemRow> = health
        .subsystems
        .into_iter()
        .map(|s| SubsystemRow {
            name: s.name,
            status: colored_status(s.status),
            message: s.message.unwrap_or_else(|| "-".to_string()),
        })
        .collect();

    let mut table = Table::new(rows);
    table.with(Style::modern());

    println!("{}", table);

    Ok(())
}
