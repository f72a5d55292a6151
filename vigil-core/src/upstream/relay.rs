//! Pass-through of another metrics API.
//!
//! The relay also serves `/metrics/{source}/history`, which replaces the
//! daemon's own history for that source.

use super::{http_client, json_body, MetricsSource};
use crate::error::{Result, VigilError};
use crate::types::SourceKind;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};

/// Fetches `{api_base}/metrics/{source}` and returns the body verbatim.
pub struct RelaySource {
    kind: SourceKind,
    client: Client,
    base: String,
}

impl RelaySource {
    pub fn new(kind: SourceKind, api_base: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            kind,
            client: http_client(timeout, true)?,
            base: api_base.trim_end_matches('/').to_string(),
        })
    }

    pub fn nextcloud(api_base: &str, timeout: Duration) -> Result<Self> {
        Self::new(SourceKind::Nextcloud, api_base, timeout)
    }

    pub fn proxmox(api_base: &str, timeout: Duration) -> Result<Self> {
        Self::new(SourceKind::Proxmox, api_base, timeout)
    }

    fn url(&self, detailed: bool) -> String {
        if detailed {
            format!("{}/metrics/{}/detailed", self.base, self.kind)
        } else {
            format!("{}/metrics/{}", self.base, self.kind)
        }
    }

    fn history_url(&self) -> String {
        format!("{}/metrics/{}/history", self.base, self.kind)
    }

    #[instrument(skip(self), fields(source = %self.kind))]
    async fn get(&self, url: String) -> Result<Value> {
        debug!(%url, "Relaying metrics request");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| VigilError::upstream(self.kind.as_str(), e))?;
        json_body(self.kind.as_str(), response).await
    }
}

#[async_trait]
impl MetricsSource for RelaySource {
    fn name(&self) -> &str {
        self.kind.as_str()
    }

    async fn fetch(&self) -> Result<Value> {
        self.get(self.url(false)).await
    }

    async fn fetch_detailed(&self) -> Result<Value> {
        let detailed = self.kind == SourceKind::Proxmox;
        self.get(self.url(detailed)).await
    }

    /// The relay keeps its own history; its body is passed on as is.
    async fn history(&self) -> Result<Option<Value>> {
        self.get(self.history_url()).await.map(Some)
    }
}
