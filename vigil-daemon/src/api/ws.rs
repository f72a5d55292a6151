//! WebSocket push channel.
//!
//! Each connection gets the latest snapshot (if any) and then every new one as
//! a `data-update` frame. Clients may ask for an immediate refresh.

use super::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::Ordering;
use tracing::{debug, info, warn};
use vigil_core::observability::metrics as telemetry;
use vigil_core::{ClientMessage, ServerMessage};

pub async fn upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle(socket, state))
}

async fn handle(socket: WebSocket, state: AppState) {
    let count = state.push_clients.fetch_add(1, Ordering::SeqCst) + 1;
    telemetry::set_push_clients(count);
    info!(clients = count, "Push client connected");

    let mut sub = state.bus.subscribe().await;
    if state.bus.latest().await.is_none() {
        // nothing to show yet
        state.refresh.notify_one();
    }

    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            snapshot = sub.recv() => {
                let Some(snapshot) = snapshot else { break };
                let text = match ServerMessage::encode_update(&snapshot) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(error = %e, "Failed to encode snapshot");
                        continue;
                    }
                };
                if sink.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            frame = stream.next() => {
                let text = match frame {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        debug!(error = %e, "Push connection error");
                        break;
                    }
                };

                let reply = match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(ClientMessage::RefreshRequest) => {
                        debug!("Refresh requested by push client");
                        state.refresh.notify_one();
                        None
                    }
                    Ok(ClientMessage::Ping) => Some(ServerMessage::Pong),
                    Err(e) => {
                        Some(ServerMessage::Error { message: format!("invalid frame: {}", e) })
                    }
                };

                if let Some(reply) = reply {
                    let Ok(text) = reply.encode() else { continue };
                    if sink.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
            }
        }
    }

    let count = state.push_clients.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
    telemetry::set_push_clients(count);
    info!(clients = count, "Push client disconnected");
}

#[cfg(test)]
mod tests {
    use super::super::{router, AppState};
    use futures_util::{SinkExt, StreamExt};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Notify;
    use tokio_tungstenite::tungstenite::Message;
    use vigil_core::upstream::UnconfiguredSource;
    use vigil_core::{
        HealthChecker, HistoryStore, Snapshot, SnapshotBus, SourceKind, SourceReport, Sources,
    };

    async fn start() -> (AppState, String) {
        let state = AppState {
            sources: Sources {
                nextcloud: Arc::new(UnconfiguredSource::new(SourceKind::Nextcloud)),
                proxmox: Arc::new(UnconfiguredSource::new(SourceKind::Proxmox)),
            },
            bus: SnapshotBus::new(),
            history: HistoryStore::new_in_memory().await.unwrap(),
            health: HealthChecker::new(),
            refresh: Arc::new(Notify::new()),
            poll_interval: Duration::from_secs(10),
            window_hours: 24,
            push_clients: Arc::new(AtomicUsize::new(0)),
        };
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (state, format!("ws://{}/ws", addr))
    }

    async fn next_json<S>(stream: &mut S) -> Value
    where
        S: StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
    {
        let frame = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        serde_json::from_str(frame.to_text().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_first_client_triggers_refresh_and_receives_updates() {
        let (state, url) = start().await;
        let (mut socket, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();

        // no snapshot yet, so connecting asks the poller for one
        tokio::time::timeout(Duration::from_secs(5), state.refresh.notified()).await.unwrap();
        assert_eq!(state.push_clients.load(Ordering::SeqCst), 1);

        state
            .bus
            .publish(Snapshot::new(1, SourceReport::failed("down"), SourceReport::Data(json!({}))))
            .await;

        let frame = next_json(&mut socket).await;
        assert_eq!(frame["event"], "data-update");
        assert_eq!(frame["data"]["cycle"], 1);
        assert_eq!(frame["data"]["nextcloud"]["error"], "down");
    }

    #[tokio::test]
    async fn test_late_client_gets_latest_snapshot() {
        let (state, url) = start().await;
        state
            .bus
            .publish(Snapshot::new(4, SourceReport::Data(json!({})), SourceReport::Data(json!({}))))
            .await;

        let (mut socket, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();
        let frame = next_json(&mut socket).await;
        assert_eq!(frame["data"]["cycle"], 4);
    }

    #[tokio::test]
    async fn test_client_frames() {
        let (state, url) = start().await;
        let (mut socket, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), state.refresh.notified()).await.unwrap();

        socket.send(Message::Text(r#"{"event":"ping"}"#.into())).await.unwrap();
        assert_eq!(next_json(&mut socket).await, json!({"event": "pong"}));

        socket.send(Message::Text("not json".into())).await.unwrap();
        let frame = next_json(&mut socket).await;
        assert_eq!(frame["event"], "error");

        socket.send(Message::Text(r#"{"event":"refresh-request"}"#.into())).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), state.refresh.notified()).await.unwrap();

        socket.close(None).await.unwrap();
        for _ in 0..50 {
            if state.push_clients.load(Ordering::SeqCst) == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("client count not decremented");
    }
}
