//! HTTP client for the vigil daemon.

use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use url::Url;
use vigil_core::observability::health::HealthCheck;
use vigil_core::{HistoryRecord, NodeHistoryRecord, Snapshot, SourceKind};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Body of `GET /api/status`.
#[derive(Debug, Deserialize)]
pub struct StatusResponse {
    pub data: Option<Snapshot>,
    pub update_interval: u64,
}

/// Client for the daemon's HTTP API.
pub struct VigilClient {
    http: reqwest::Client,
    base: Url,
}

impl VigilClient {
    /// `server` is the daemon's base URL, e.g. `http://localhost:3000`.
    pub fn new(server: &str) -> Result<Self> {
        let base = Url::parse(server).with_context(|| format!("Invalid server URL: {}", server))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(anyhow!("Server URL must be http or https: {}", server));
        }
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { http, base })
    }

    fn url(&self, path: &str) -> Result<Url> {
        Ok(self.base.join(path)?)
    }

    /// URL of the push channel.
    pub fn ws_url(&self) -> Result<Url> {
        let mut url = self.url("/ws")?;
        let scheme = if self.base.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme).map_err(|_| anyhow!("Cannot derive push URL from {}", self.base))?;
        Ok(url)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.get_url(self.url(path)?).await
    }

    async fn get_url<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .context("Failed to reach vigild. Is the daemon running?")?;
        decode(response).await
    }

    pub async fn status(&self) -> Result<StatusResponse> {
        self.get("/api/status").await
    }

    fn history_url(
        &self,
        source: SourceKind,
        hours: Option<u32>,
        node: Option<&str>,
    ) -> Result<Url> {
        let mut url = self.url(&format!("/api/{}/history", source))?;
        if let Some(hours) = hours {
            url.query_pairs_mut().append_pair("hours", &hours.to_string());
        }
        if let Some(node) = node {
            url.query_pairs_mut().append_pair("node", node);
        }
        Ok(url)
    }

    /// Cluster history of `source`, from the daemon or its relay.
    pub async fn history(&self, source: SourceKind, hours: Option<u32>) -> Result<History> {
        let body: Value = self.get_url(self.history_url(source, hours, None)?).await?;
        History::from_body(body)
    }

    /// Samples of one Proxmox node.
    pub async fn node_history(
        &self,
        node: &str,
        hours: Option<u32>,
    ) -> Result<Vec<NodeHistoryRecord>> {
        self.get_url(self.history_url(SourceKind::Proxmox, hours, Some(node))?).await
    }

    pub async fn health(&self) -> Result<HealthCheck> {
        self.get("/health").await
    }

    /// Ask the daemon for an immediate poll cycle.
    pub async fn refresh(&self) -> Result<String> {
        let response = self
            .http
            .post(self.url("/api/refresh")?)
            .send()
            .await
            .context("Failed to reach vigild. Is the daemon running?")?;
        let body: Value = decode(response).await?;
        Ok(body["message"].as_str().unwrap_or("Refresh triggered").to_string())
    }
}

/// Body of `GET /api/{source}/history`.
#[derive(Debug)]
pub enum History {
    /// Rows of the daemon's own store.
    Stored(Vec<HistoryRecord>),
    /// `{data: [{timestamp, data}]}` entries a relay keeps.
    Relay(Vec<RelaySample>),
}

#[derive(Debug, Deserialize)]
pub struct RelaySample {
    pub timestamp: String,
    #[serde(default)]
    pub data: Value,
}

impl History {
    fn from_body(body: Value) -> Result<Self> {
        if body.is_array() {
            return Ok(Self::Stored(serde_json::from_value(body)?));
        }
        let samples = body
            .get("data")
            .cloned()
            .ok_or_else(|| anyhow!("Unexpected history body: {}", body))?;
        Ok(Self::Relay(serde_json::from_value(samples)?))
    }
}

/// Decode a JSON body, turning `{"error": ...}` responses into errors.
async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let message = response
            .json::<Value>()
            .await
            .ok()
            .and_then(|body| body["error"].as_str().map(str::to_string))
            .unwrap_or_else(|| status.to_string());
        return Err(anyhow!("vigild returned {}: {}", status.as_u16(), message));
    }
    Ok(response.json().await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ws_url() {
        let client = VigilClient::new("http://localhost:3000").unwrap();
        assert_eq!(client.ws_url().unwrap().as_str(), "ws://localhost:3000/ws");

        let client = VigilClient::new("https://mon.example.com/").unwrap();
        assert_eq!(client.ws_url().unwrap().as_str(), "wss://mon.example.com/ws");
    }

    #[test]
    fn test_history_urls() {
        let client = VigilClient::new("http://localhost:3000").unwrap();
        let url = client.history_url(SourceKind::Nextcloud, None, None).unwrap();
        assert_eq!(url.as_str(), "http://localhost:3000/api/nextcloud/history");

        let url = client.history_url(SourceKind::Proxmox, Some(6), Some("pve 1")).unwrap();
        assert_eq!(url.as_str(), "http://localhost:3000/api/proxmox/history?hours=6&node=pve+1");
    }

    #[test]
    fn test_history_body_shapes() {
        let stored = serde_json::json!([{
            "source": "proxmox", "timestamp": "2024-01-01T12:00:00Z", "cpu_percent": 5.0,
            "memory_percent": 50.0, "memory_used": 1, "memory_total": 2, "nodes_count": 1,
            "vms_running": 0, "vms_total": 0
        }]);
        let stored = History::from_body(stored).unwrap();
        assert!(matches!(stored, History::Stored(rows) if rows.len() == 1));

        let relay = serde_json::json!({
            "data": [{"timestamp": "2024-01-01T12:00:00", "data": {"cpu": 0.1}}],
            "last_update": "2024-01-01T12:00:00"
        });
        match History::from_body(relay).unwrap() {
            History::Relay(samples) => assert_eq!(samples[0].data["cpu"], 0.1),
            other => panic!("unexpected {:?}", other),
        }

        assert!(History::from_body(serde_json::json!({"hello": 1})).is_err());
    }

    #[test]
    fn test_rejects_non_http_urls() {
        assert!(VigilClient::new("ftp://localhost").is_err());
        assert!(VigilClient::new("not a url").is_err());
    }
}
