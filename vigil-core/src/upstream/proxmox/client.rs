//! Ticket-authenticated client for one Proxmox VE host.

use super::models::{ApiEnvelope, GuestListItem, NodeListItem, NodeStatus, StorageItem, Ticket};
use crate::config::ProxmoxHost;
use crate::error::{Result, VigilError};
use crate::types::cluster::percent;
use crate::types::{ClusterData, GuestKind, GuestSummary, NodeSummary, StorageSummary};
use crate::upstream::http_client;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

pub struct ProxmoxClient {
    host: String,
    base: String,
    username: String,
    password: String,
    client: Client,
    ticket: RwLock<Option<Ticket>>,
}

impl ProxmoxClient {
    pub fn new(host: &ProxmoxHost, timeout: Duration) -> Result<Self> {
        Ok(Self {
            host: host.host.clone(),
            base: host.api_base(),
            username: host.username.clone(),
            password: host.password.clone().unwrap_or_default(),
            client: http_client(timeout, host.verify_ssl)?,
            ticket: RwLock::new(None),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Request a new ticket and keep it for subsequent requests.
    #[instrument(skip(self), fields(host = %self.host))]
    pub async fn authenticate(&self) -> Result<Ticket> {
        let response = self
            .client
            .post(format!("{}/access/ticket", self.base))
            .form(&[("username", self.username.as_str()), ("password", self.password.as_str())])
            .send()
            .await
            .map_err(|e| self.auth_error(e))?;

        if !response.status().is_success() {
            return Err(self.auth_error(format!("HTTP {}", response.status().as_u16())));
        }

        let envelope: ApiEnvelope<Ticket> =
            response.json().await.map_err(|e| self.auth_error(e))?;

        info!("Authenticated against Proxmox");
        *self.ticket.write().await = Some(envelope.data.clone());
        Ok(envelope.data)
    }

    async fn current_ticket(&self) -> Result<Ticket> {
        if let Some(ticket) = self.ticket.read().await.clone() {
            return Ok(ticket);
        }
        self.authenticate().await
    }

    /// GET `path` below `/api2/json` and unwrap the `data` envelope.
    ///
    /// Authenticates lazily; an expired ticket (HTTP 401) is renewed once and
    /// the request retried.
    #[instrument(skip(self), fields(host = %self.host))]
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let ticket = self.current_ticket().await?;
        let mut response = self.send(path, &ticket).await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            debug!(path, "Ticket rejected, re-authenticating");
            *self.ticket.write().await = None;
            let ticket = self.authenticate().await?;
            response = self.send(path, &ticket).await?;
        }

        let status = response.status();
        if !status.is_success() {
            return Err(VigilError::UpstreamStatus {
                source_name: self.source_name(),
                status: status.as_u16(),
            });
        }

        let envelope: ApiEnvelope<T> =
            response.json().await.map_err(|e| VigilError::InvalidResponse {
                source_name: self.source_name(),
                reason: format!("{}: {}", path, e),
            })?;
        Ok(envelope.data)
    }

    async fn send(&self, path: &str, ticket: &Ticket) -> Result<reqwest::Response> {
        self.client
            .get(format!("{}{}", self.base, path))
            .header("Cookie", format!("PVEAuthCookie={}", ticket.ticket))
            .header("CSRFPreventionToken", &ticket.csrf_token)
            .send()
            .await
            .map_err(|e| VigilError::upstream(&self.source_name(), e))
    }

    /// Collect nodes, guests and storage visible through this host.
    ///
    /// Fails only when the node list itself cannot be read. Per-node endpoint
    /// failures are logged and that part is left out.
    #[instrument(skip(self), fields(host = %self.host))]
    pub async fn collect(&self, detailed: bool) -> Result<ClusterData> {
        let nodes: Vec<NodeListItem> = self.get("/nodes").await?;
        let mut data = ClusterData::default();

        for node in nodes {
            let online = node.status == "online";

            let status = if online {
                match self.get::<Value>(&format!("/nodes/{}/status", node.node)).await {
                    Ok(raw) => {
                        let parsed = serde_json::from_value::<NodeStatus>(raw.clone()).ok();
                        if detailed {
                            data.node_details.insert(node.node.clone(), raw);
                        }
                        parsed
                    }
                    Err(e) => {
                        warn!(node = %node.node, error = %e, "Failed to read node status");
                        None
                    }
                }
            } else {
                None
            };

            data.nodes.push(self.node_summary(&node, status.as_ref()));

            if !online {
                debug!(
                    node = %node.node,
                    status = %node.status,
                    "Skipping guests and storage of node"
                );
                continue;
            }

            for kind in [GuestKind::Vm, GuestKind::Container] {
                let path = format!("/nodes/{}/{}", node.node, kind.endpoint());
                match self.get::<Vec<GuestListItem>>(&path).await {
                    Ok(guests) => data
                        .vms
                        .extend(
                            guests.into_iter().map(|g| self.guest_summary(&node.node, kind, g)),
                        ),
                    Err(e) => {
                        warn!(node = %node.node, error = %e, "Failed to list {}", kind.endpoint())
                    }
                }
            }

            match self.get::<Vec<StorageItem>>(&format!("/nodes/{}/storage", node.node)).await {
                Ok(items) => data
                    .storage
                    .extend(items.into_iter().map(|s| self.storage_summary(&node.node, s))),
                Err(e) => warn!(node = %node.node, error = %e, "Failed to list storage"),
            }
        }

        Ok(data)
    }

    fn node_summary(&self, node: &NodeListItem, status: Option<&NodeStatus>) -> NodeSummary {
        // fall back to the list entry when the status endpoint gave nothing
        let (cpu, used, total, uptime, load) = match status {
            Some(s) => (s.cpu, s.memory.used, s.memory.total, s.uptime, s.loadavg),
            None => (node.cpu, node.mem, node.maxmem, node.uptime, [0.0; 3]),
        };
        NodeSummary {
            name: node.node.clone(),
            status: node.status.clone(),
            cpu: cpu * 100.0,
            memory_used: used,
            memory_total: total,
            memory_percent: percent(used, total),
            uptime,
            load,
            host: self.host.clone(),
        }
    }

    fn guest_summary(&self, node: &str, kind: GuestKind, guest: GuestListItem) -> GuestSummary {
        GuestSummary {
            id: guest.vmid,
            name: guest.name.unwrap_or_else(|| guest.vmid.to_string()),
            status: guest.status,
            node: node.to_string(),
            host: self.host.clone(),
            kind,
            cpu: guest.cpu * 100.0,
            memory: guest.mem,
            maxmem: guest.maxmem,
        }
    }

    fn storage_summary(&self, node: &str, item: StorageItem) -> StorageSummary {
        StorageSummary {
            node: node.to_string(),
            name: item.storage,
            kind: item.kind,
            total: item.total,
            used: item.used,
            available: item.avail,
            host: self.host.clone(),
        }
    }

    fn source_name(&self) -> String {
        format!("proxmox ({})", self.host)
    }

    fn auth_error(&self, reason: impl std::fmt::Display) -> VigilError {
        VigilError::Auth { host: self.host.clone(), reason: reason.to_string() }
    }
}
