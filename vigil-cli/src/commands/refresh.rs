//! `vigil refresh` command

use crate::client::VigilClient;
use anyhow::Result;
use colored::Colorize;

/// Trigger an immediate poll cycle.
pub async fn refresh(client: &VigilClient) -> Result<()> {
    let message = client.refresh().await?;
    println!("{} {}", "✓".green(), message);
    Ok(())
}
