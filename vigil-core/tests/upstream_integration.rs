//! Integration tests for the upstream sources.
//!
//! Each test starts a local axum server standing in for Proxmox, Nextcloud or
//! a relay API, and points a real source at it. No external services needed.
//!
//! ```bash
//! cargo test -p vigil-core --test upstream_integration
//! ```

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use vigil_core::config::{NextcloudConfig, ProxmoxHost};
use vigil_core::types::{ClusterData, ClusterStatus, GuestKind};
use vigil_core::upstream::{MetricsSource, NextcloudSource, ProxmoxSource, RelaySource};
use vigil_core::VigilError;

const TIMEOUT: Duration = Duration::from_secs(5);

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Fake Proxmox host. Tickets are numbered; the first ticket is rejected on
/// its first use when `expire_first` is set.
#[derive(Clone, Default)]
struct FakeProxmox {
    logins: Arc<AtomicUsize>,
    rejected: Arc<AtomicUsize>,
    expire_first: bool,
}

impl FakeProxmox {
    fn authorized(&self, headers: &HeaderMap) -> bool {
        let cookie = headers.get("cookie").and_then(|v| v.to_str().ok()).unwrap_or_default();
        if !cookie.starts_with("PVEAuthCookie=ticket-") {
            return false;
        }
        if self.expire_first
            && cookie == "PVEAuthCookie=ticket-1"
            && self.rejected.fetch_add(1, Ordering::SeqCst) == 0
        {
            return false;
        }
        headers.contains_key("csrfpreventiontoken")
    }
}

fn envelope(data: Value) -> Response {
    Json(json!({ "data": data })).into_response()
}

async fn ticket(State(fake): State<FakeProxmox>, body: String) -> Response {
    if !body.contains("password=secret") {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let n = fake.logins.fetch_add(1, Ordering::SeqCst) + 1;
    envelope(json!({
        "ticket": format!("ticket-{}", n),
        "CSRFPreventionToken": "csrf",
        "username": "root@pam"
    }))
}

async fn nodes(State(fake): State<FakeProxmox>, headers: HeaderMap) -> Response {
    if !fake.authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    envelope(json!([
        {"node": "pve1", "status": "online", "cpu": 0.1, "mem": 1, "maxmem": 2},
        {"node": "pve2", "status": "offline"}
    ]))
}

async fn node_status(State(fake): State<FakeProxmox>, headers: HeaderMap) -> Response {
    if !fake.authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    envelope(json!({
        "cpu": 0.25,
        "memory": {"total": 8192, "used": 2048, "free": 6144},
        "uptime": 90061,
        "loadavg": ["0.50", "0.40", "0.30"]
    }))
}

async fn qemu(headers: HeaderMap) -> Response {
    if !headers.contains_key("cookie") {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    envelope(json!([
        {"vmid": 100, "name": "web", "status": "running", "cpu": 0.05, "mem": 512, "maxmem": 1024},
        {"vmid": 101, "name": "db", "status": "stopped"}
    ]))
}

async fn lxc() -> Response {
    envelope(json!([{"vmid": "200", "name": "dns", "status": "running", "cpu": 0.01,
                     "mem": 64, "maxmem": 128}]))
}

async fn storage() -> Response {
    envelope(json!([{"storage": "local-lvm", "type": "lvmthin", "total": 1000, "used": 250,
                     "avail": 750}]))
}

async fn proxmox_app(fake: FakeProxmox) -> String {
    let app = Router::new()
        .route("/api2/json/access/ticket", post(ticket))
        .route("/api2/json/nodes", get(nodes))
        .route("/api2/json/nodes/pve1/status", get(node_status))
        .route("/api2/json/nodes/pve1/qemu", get(qemu))
        .route("/api2/json/nodes/pve1/lxc", get(lxc))
        .route("/api2/json/nodes/pve1/storage", get(storage))
        .with_state(fake);
    serve(app).await
}

fn host(name: &str, base: &str, password: &str) -> ProxmoxHost {
    ProxmoxHost {
        host: name.to_string(),
        port: 8006,
        username: "root@pam".to_string(),
        password: Some(password.to_string()),
        verify_ssl: false,
        api_url: Some(format!("{}/api2/json", base)),
    }
}

/// Validates:
/// - ticket login happens lazily on the first request
/// - node, guest and storage listings are mapped to cluster data
/// - offline nodes are kept but their guests are not queried
#[tokio::test]
async fn test_proxmox_collects_cluster() {
    let fake = FakeProxmox::default();
    let base = proxmox_app(fake.clone()).await;

    let source = ProxmoxSource::new(&[host("pve1", &base, "secret")], TIMEOUT).unwrap();
    let value = source.fetch().await.unwrap();
    let data: ClusterData = serde_json::from_value(value).unwrap();

    assert_eq!(fake.logins.load(Ordering::SeqCst), 1);
    assert_eq!(data.cluster_status, ClusterStatus::Online);
    assert_eq!(data.nodes.len(), 2);

    let pve1 = &data.nodes[0];
    assert_eq!(pve1.cpu, 25.0);
    assert_eq!(pve1.memory_percent, 25.0);
    assert_eq!(pve1.load, [0.5, 0.4, 0.3]);
    assert_eq!(data.nodes[1].status, "offline");

    assert_eq!(data.vms.len(), 3);
    let dns = data.vms.iter().find(|g| g.id == 200).unwrap();
    assert_eq!(dns.kind, GuestKind::Container);
    assert_eq!(data.storage.len(), 1);
    assert_eq!(data.storage[0].available, 750);
    assert!(data.errors.is_empty());
    assert!(data.node_details.is_empty());
}

/// Validates:
/// - an expired ticket (401) triggers exactly one re-login and a retry
#[tokio::test]
async fn test_proxmox_reauthenticates_once_on_401() {
    let fake = FakeProxmox { expire_first: true, ..Default::default() };
    let base = proxmox_app(fake.clone()).await;

    let source = ProxmoxSource::new(&[host("pve1", &base, "secret")], TIMEOUT).unwrap();
    let data: ClusterData = serde_json::from_value(source.fetch().await.unwrap()).unwrap();

    assert_eq!(fake.logins.load(Ordering::SeqCst), 2);
    assert_eq!(data.nodes.len(), 2);
}

/// Validates:
/// - detailed fetches carry the raw node status
/// - two hosts of one cluster are deduplicated
/// - a failing host is reported under `errors` without failing the fetch
#[tokio::test]
async fn test_proxmox_multi_host_partial_failure() {
    let fake = FakeProxmox::default();
    let base = proxmox_app(fake.clone()).await;

    let source = ProxmoxSource::new(
        &[
            host("pve1", &base, "secret"),
            host("pve1-alias", &base, "secret"),
            host("bad", &base, "wrong"),
        ],
        TIMEOUT,
    )
    .unwrap();
    let data: ClusterData = serde_json::from_value(source.fetch_detailed().await.unwrap()).unwrap();

    assert_eq!(data.nodes.len(), 2);
    assert_eq!(data.vms.len(), 3);
    assert_eq!(data.storage.len(), 2);
    assert_eq!(data.errors.len(), 1);
    assert_eq!(data.errors[0].host, "bad");
    assert_eq!(data.node_details["pve1"]["uptime"], 90061);
}

/// Validates:
/// - the fetch fails when every host fails
#[tokio::test]
async fn test_proxmox_all_hosts_failed() {
    let fake = FakeProxmox::default();
    let base = proxmox_app(fake).await;

    let source = ProxmoxSource::new(&[host("bad", &base, "wrong")], TIMEOUT).unwrap();
    let err = source.fetch().await.unwrap_err();
    assert!(err.is_upstream());
    assert!(err.to_string().contains("bad"));
}

/// Validates:
/// - serverinfo is requested with the OCS header and token auth
#[tokio::test]
async fn test_nextcloud_serverinfo() {
    let app = Router::new().route(
        "/ocs/v2.php/apps/serverinfo/api/v1/info",
        get(|headers: HeaderMap| async move {
            let ocs = headers.get("ocs-apirequest").map(|v| v == "true").unwrap_or(false);
            let token = headers.get("nc-token").map(|v| v == "tok").unwrap_or(false);
            if !(ocs && token) {
                return StatusCode::UNAUTHORIZED.into_response();
            }
            Json(json!({"ocs": {"data": {"nextcloud": {"system": {"version": "28.0.1"}}}}}))
                .into_response()
        }),
    );
    let base = serve(app).await;

    let config = NextcloudConfig {
        url: base.clone(),
        username: None,
        password: None,
        token: Some("tok".to_string()),
        verify_ssl: true,
    };
    let source = NextcloudSource::new(&config, TIMEOUT).unwrap();
    let body = source.fetch().await.unwrap();
    assert_eq!(body["ocs"]["data"]["nextcloud"]["system"]["version"], "28.0.1");

    let anonymous =
        NextcloudSource::new(&NextcloudConfig { token: None, ..config }, TIMEOUT).unwrap();
    assert!(matches!(
        anonymous.fetch().await,
        Err(VigilError::UpstreamStatus { status: 401, .. })
    ));
}

/// Validates:
/// - relay bodies pass through verbatim
/// - non-2xx relay responses and connection failures are upstream errors
#[tokio::test]
async fn test_relay_passthrough_and_failures() {
    let app = Router::new()
        .route("/metrics/nextcloud", get(|| async { Json(json!({"data": {"anything": [1, 2]}})) }))
        .route("/metrics/proxmox", get(|| async { StatusCode::SERVICE_UNAVAILABLE }));
    let base = serve(app).await;

    let nextcloud = RelaySource::nextcloud(&base, TIMEOUT).unwrap();
    assert_eq!(nextcloud.fetch().await.unwrap(), json!({"data": {"anything": [1, 2]}}));

    let proxmox = RelaySource::proxmox(&base, TIMEOUT).unwrap();
    let err = proxmox.fetch().await.unwrap_err();
    assert!(matches!(err, VigilError::UpstreamStatus { status: 503, .. }));

    let unreachable = RelaySource::proxmox("http://127.0.0.1:1", TIMEOUT).unwrap();
    assert!(unreachable.fetch().await.unwrap_err().is_upstream());
}

/// Validates:
/// - the relay's own history is fetched from `/metrics/{source}/history`
/// - a relay Proxmox body reads as cluster data, containers included
#[tokio::test]
async fn test_relay_history_and_cluster_shape() {
    let app = Router::new()
        .route(
            "/metrics/proxmox",
            get(|| async {
                Json(json!({
                    "data": {
                        "nodes": [{"node": "pve1", "status": "online", "cpu": 0.12,
                                   "memory": {"used": 1024, "total": 4096, "percentage": 25.0}}],
                        "vms": [{"vmid": 100, "name": "web", "node": "pve1",
                                 "status": "running", "cpu": 0.02, "memory": null}],
                        "containers": [{"vmid": 200, "name": "dns", "node": "pve1",
                                        "status": "running", "cpu": 0.0, "memory": null}]
                    },
                    "last_update": "2024-01-01T12:00:00"
                }))
            }),
        )
        .route(
            "/metrics/proxmox/history",
            get(|| async {
                Json(json!({
                    "data": [{"timestamp": "2024-01-01T11:59:00", "data": {"cpu": 0.1}}],
                    "last_update": "2024-01-01T12:00:00"
                }))
            }),
        )
        .route(
            "/metrics/nextcloud/history",
            get(|| async {
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(json!({"error": "History data not yet available"})),
                )
            }),
        );
    let base = serve(app).await;

    let proxmox = RelaySource::proxmox(&base, TIMEOUT).unwrap();
    let history = proxmox.history().await.unwrap().unwrap();
    assert_eq!(history["data"][0]["data"]["cpu"], 0.1);

    let data = ClusterData::from_value(&proxmox.fetch().await.unwrap()).unwrap();
    assert_eq!(data.cluster_status, ClusterStatus::Online);
    assert_eq!(data.nodes[0].name, "pve1");
    assert_eq!(data.vms.len(), 2);
    assert_eq!(data.vms[1].kind, GuestKind::Container);

    let nextcloud = RelaySource::nextcloud(&base, TIMEOUT).unwrap();
    assert!(matches!(
        nextcloud.history().await,
        Err(VigilError::UpstreamStatus { status: 503, .. })
    ));
}
