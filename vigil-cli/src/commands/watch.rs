//! `vigil watch` command

use anyhow::{anyhow, Result};
use colored::Colorize;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};
use url::Url;
use vigil_core::client::{Backoff, ReconnectPolicy, Render, ViewWorker};
use vigil_core::{ClientMessage, ServerMessage, Snapshot};

use crate::render::{NextcloudView, ProxmoxView};

/// Message printed when reconnect attempts are exhausted.
pub const CONNECTION_LOST: &str = "connection lost, restart to retry";

/// Views fed from the push channel, one render guard each.
pub struct Views<N, P> {
    pub nextcloud: ViewWorker<Arc<Snapshot>, N>,
    pub proxmox: ViewWorker<Arc<Snapshot>, P>,
}

impl<N, P> Views<N, P>
where
    N: Render<Arc<Snapshot>>,
    P: Render<Arc<Snapshot>>,
{
    async fn submit(&self, snapshot: Arc<Snapshot>) {
        // a busy view keeps only the newest snapshot
        self.nextcloud.submit(Arc::clone(&snapshot)).await;
        self.proxmox.submit(snapshot).await;
    }
}

/// Follow the push channel until interrupted.
pub async fn watch(ws_url: Url, refresh: bool) -> Result<()> {
    let views = Views {
        nextcloud: ViewWorker::new("nextcloud", NextcloudView),
        proxmox: ViewWorker::new("proxmox", ProxmoxView),
    };

    tokio::select! {
        result = follow(&ws_url, ReconnectPolicy::default(), refresh, &views) => {
            if result.is_err() {
                eprintln!("{}", CONNECTION_LOST.red());
            }
            result
        }
        _ = tokio::signal::ctrl_c() => Ok(()),
    }
}

/// Connect, stream updates into `views`, and reconnect with backoff.
///
/// Returns an error once the policy's attempts are used up. A successful
/// connection resets the attempt counter.
pub async fn follow<N, P>(
    ws_url: &Url,
    policy: ReconnectPolicy,
    refresh: bool,
    views: &Views<N, P>,
) -> Result<()>
where
    N: Render<Arc<Snapshot>>,
    P: Render<Arc<Snapshot>>,
{
    let mut backoff = Backoff::new(policy);

    loop {
        match tokio_tungstenite::connect_async(ws_url.as_str()).await {
            Ok((socket, _)) => {
                backoff.reset();
                eprintln!("{} {}", "Connected to".dimmed(), ws_url);
                if let Err(e) = session(socket, refresh, views).await {
                    warn!(error = %e, "Push connection dropped");
                }
            }
            Err(e) => debug!(error = %e, "Connect failed"),
        }

        let Some(delay) = backoff.next_delay() else {
            return Err(anyhow!(CONNECTION_LOST));
        };
        eprintln!(
            "{}",
            format!(
                "Disconnected, retrying in {}ms ({}/{})",
                delay.as_millis(),
                backoff.attempts(),
                backoff.max_attempts()
            )
            .yellow()
        );
        tokio::time::sleep(delay).await;
    }
}

async fn session<S, N, P>(mut socket: S, refresh: bool, views: &Views<N, P>) -> Result<()>
where
    S: StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
        + SinkExt<Message, Error = tokio_tungstenite::tungstenite::Error>
        + Unpin,
    N: Render<Arc<Snapshot>>,
    P: Render<Arc<Snapshot>>,
{
    if refresh {
        socket.send(Message::Text(ClientMessage::RefreshRequest.encode()?)).await?;
    }

    while let Some(frame) = socket.next().await {
        let text = match frame? {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        match serde_json::from_str::<ServerMessage>(&text) {
            Ok(ServerMessage::DataUpdate(snapshot)) => views.submit(Arc::new(snapshot)).await,
            Ok(ServerMessage::Pong) => {}
            Ok(ServerMessage::Error { message }) => warn!(%message, "Server rejected a frame"),
            Err(e) => warn!(error = %e, "Ignoring malformed frame"),
        }
    }

    Ok(())
}
