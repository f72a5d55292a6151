//! `vigil status` command

use crate::client::VigilClient;
use crate::render::{nextcloud_card, proxmox_card, snapshot_header};
use anyhow::Result;
use colored::Colorize;

/// Print the latest snapshot once.
pub async fn status(client: &VigilClient, json: bool) -> Result<()> {
    let response = client.status().await?;

    let Some(snapshot) = response.data else {
        println!("{}", "No data yet, vigild has not completed a poll cycle".yellow());
        return Ok(());
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    println!("{}", snapshot_header(&snapshot));
    println!("{}\n", nextcloud_card(&snapshot.nextcloud));
    println!("{}", proxmox_card(&snapshot.proxmox));
    println!("\nUpdated every {}s", response.update_interval);
    Ok(())
}
