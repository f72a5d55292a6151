//! Direct access to one or more Proxmox VE hosts.

mod client;
pub mod models;

pub use client::ProxmoxClient;

use super::MetricsSource;
use crate::config::ProxmoxHost;
use crate::error::{Result, VigilError};
use crate::types::{ClusterData, HostError};
use async_trait::async_trait;
use futures_util::future::join_all;
use serde_json::Value;
use std::time::Duration;
use tracing::{instrument, warn};

/// Collects every configured host concurrently and merges the results.
///
/// A host that fails is listed under `errors`; the fetch only fails when no
/// host could be collected at all.
pub struct ProxmoxSource {
    clients: Vec<ProxmoxClient>,
}

impl ProxmoxSource {
    pub fn new(hosts: &[ProxmoxHost], timeout: Duration) -> Result<Self> {
        let clients =
            hosts.iter().map(|h| ProxmoxClient::new(h, timeout)).collect::<Result<Vec<_>>>()?;
        Ok(Self { clients })
    }

    #[instrument(skip(self), fields(hosts = self.clients.len()))]
    pub async fn collect(&self, detailed: bool) -> Result<ClusterData> {
        if self.clients.is_empty() {
            return Err(VigilError::NotConfigured { source_name: "proxmox".to_string() });
        }

        let results = join_all(self.clients.iter().map(|c| c.collect(detailed))).await;

        let mut parts = Vec::with_capacity(results.len());
        let mut errors = Vec::new();
        for (client, result) in self.clients.iter().zip(results) {
            match result {
                Ok(part) => parts.push(part),
                Err(e) => {
                    warn!(host = client.host(), error = %e, "Proxmox host failed");
                    errors.push(HostError {
                        host: client.host().to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }

        if parts.is_empty() {
            let reason =
                errors
                    .iter()
                    .map(|e| format!("{}: {}", e.host, e.error))
                    .collect::<Vec<_>>()
                    .join("; ");
            return Err(VigilError::upstream("proxmox", reason));
        }

        let mut data = ClusterData::merge(parts);
        data.errors.extend(errors);
        Ok(data)
    }

    fn to_value(data: ClusterData) -> Result<Value> {
        serde_json::to_value(data).map_err(VigilError::internal)
    }
}

#[async_trait]
impl MetricsSource for ProxmoxSource {
    fn name(&self) -> &str {
        "proxmox"
    }

    async fn fetch(&self) -> Result<Value> {
        Self::to_value(self.collect(false).await?)
    }

    async fn fetch_detailed(&self) -> Result<Value> {
        Self::to_value(self.collect(true).await?)
    }
}
