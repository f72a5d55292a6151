//! HTTP handlers.

use super::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt::Display;
use std::time::Duration;
use tracing::warn;
use vigil_core::observability::health::HealthStatus;
use vigil_core::observability::metrics as telemetry;
use vigil_core::SourceKind;

use crate::poller::HISTORY_SUBSYSTEM;

const INDEX_HTML: &str = include_str!("../../static/index.html");

pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// Checks the history store on every call; 503 while anything is unhealthy.
pub async fn health(State(state): State<AppState>) -> Response {
    match state.history.ping().await {
        Ok(()) => {
            // only clear what a failed ping set, write failures stay degraded
            let current = state.health.get_health().await;
            let unhealthy = current
                .subsystems
                .iter()
                .any(|s| s.name == HISTORY_SUBSYSTEM && s.status == HealthStatus::Unhealthy);
            if unhealthy {
                state.health.update_subsystem(HISTORY_SUBSYSTEM, HealthStatus::Healthy, None).await;
            }
        }
        Err(e) => {
            warn!(error = %e, "History store unreachable");
            state
                .health
                .update_subsystem(HISTORY_SUBSYSTEM, HealthStatus::Unhealthy, Some(e.to_string()))
                .await;
        }
    }

    let health = state.health.get_health().await;
    let status = if health.status == HealthStatus::Unhealthy {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (status, Json(health)).into_response()
}

pub async fn status(State(state): State<AppState>) -> Response {
    let latest = state.bus.latest().await;
    telemetry::record_api_request("status", 200);
    Json(json!({
        "success": true,
        "data": latest.as_deref(),
        "timestamp": Utc::now(),
        "update_interval": state.poll_interval.as_secs(),
    }))
    .into_response()
}

pub async fn refresh(State(state): State<AppState>) -> Response {
    state.refresh.notify_one();
    telemetry::record_api_request("refresh", 202);
    (
        StatusCode::ACCEPTED,
        Json(json!({ "message": "Refresh triggered", "timestamp": Utc::now() })),
    )
        .into_response()
}

pub async fn nextcloud(State(state): State<AppState>) -> Response {
    upstream_response("nextcloud", state.sources.nextcloud.fetch().await)
}

pub async fn proxmox(State(state): State<AppState>) -> Response {
    upstream_response("proxmox", state.sources.proxmox.fetch().await)
}

pub async fn proxmox_detailed(State(state): State<AppState>) -> Response {
    upstream_response("proxmox_detailed", state.sources.proxmox.fetch_detailed().await)
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    hours: Option<u32>,
    /// Per-node samples instead of cluster aggregates (Proxmox only).
    node: Option<String>,
}

/// Cluster or node history. A relay that keeps its own history answers
/// aggregate queries for its source.
pub async fn history(
    State(state): State<AppState>,
    Path(source): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Response {
    let kind = match source.parse::<SourceKind>() {
        Ok(kind) => kind,
        Err(e) => return error_response(StatusCode::NOT_FOUND, "history", &e),
    };

    let hours = params.hours.unwrap_or(state.window_hours);
    let window = Duration::from_secs(u64::from(hours) * 3600);

    if let Some(node) = params.node {
        if kind != SourceKind::Proxmox {
            let reason = format!("node history is only kept for proxmox, not {}", kind);
            return error_response(StatusCode::BAD_REQUEST, "node_history", &reason);
        }
        return match state.history.query_node(&node, window).await {
            Ok(records) => {
                telemetry::record_api_request("node_history", 200);
                Json(records).into_response()
            }
            Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, "node_history", &e),
        };
    }

    match state.sources.get(kind).history().await {
        Ok(Some(body)) => {
            telemetry::record_api_request("history", 200);
            return Json(body).into_response();
        }
        Ok(None) => {}
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, "history", &e),
    }

    match state.history.query(kind, window).await {
        Ok(records) => {
            telemetry::record_api_request("history", 200);
            Json(records).into_response()
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, "history", &e),
    }
}

fn upstream_response(endpoint: &'static str, result: vigil_core::Result<Value>) -> Response {
    match result {
        Ok(value) => {
            telemetry::record_api_request(endpoint, 200);
            Json(value).into_response()
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, endpoint, &e),
    }
}

fn error_response(status: StatusCode, endpoint: &'static str, error: &dyn Display) -> Response {
    warn!(endpoint, error = %error, "Request failed");
    telemetry::record_api_request(endpoint, status.as_u16());
    (status, Json(json!({ "error": error.to_string() }))).into_response()
}
