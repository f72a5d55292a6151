use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use vigil_core::SourceKind;

mod client;
mod commands;
mod render;

use client::VigilClient;

#[derive(Parser)]
#[command(name = "vigil")]
#[command(about = "Nextcloud and Proxmox monitoring CLI", long_about = None)]
struct Cli {
    /// Base URL of vigild
    #[arg(
        short,
        long,
        global = true,
        env = "VIGIL_SERVER",
        default_value = "http://localhost:3000"
    )]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Follow live updates
    Watch {
        /// Ask for an immediate poll cycle on every (re)connect
        #[arg(short, long)]
        refresh: bool,
    },

    /// Show the latest snapshot
    Status {
        /// Print the raw snapshot as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show stored history of one source
    History {
        /// nextcloud or proxmox
        source: SourceKind,

        /// Samples of one Proxmox node instead of the cluster
        #[arg(long)]
        node: Option<String>,

        /// Window in hours (defaults to the daemon's window)
        #[arg(long)]
        hours: Option<u32>,

        /// Show at most this many of the newest samples
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },

    /// Check daemon health
    Health,

    /// Trigger an immediate poll cycle
    Refresh,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let client = VigilClient::new(&cli.server)?;

    match cli.command {
        Commands::Watch { refresh } => commands::watch(client.ws_url()?, refresh).await,
        Commands::Status { json } => commands::status(&client, json).await,
        Commands::History { source, node, hours, limit } => {
            commands::history(&client, source, node, hours, limit).await
        }
        Commands::Health => commands::health(&client).await,
        Commands::Refresh => commands::refresh(&client).await,
    }
}
