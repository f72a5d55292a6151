//! Upstream metric sources.
//!
//! Each upstream is a [`MetricsSource`]. Which implementation backs a source
//! depends on configuration:
//!
//! - direct: credentials configured, the daemon talks to Nextcloud/Proxmox
//! - relay: `api_base` set, JSON from another metrics API is passed through
//! - unconfigured: every fetch fails with a clear message

use crate::config::Config;
use crate::error::{Result, VigilError};
use crate::types::SourceKind;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub mod nextcloud;
pub mod proxmox;
pub mod relay;

pub use nextcloud::NextcloudSource;
pub use proxmox::{ProxmoxClient, ProxmoxSource};
pub use relay::RelaySource;

/// Something that can be polled for a JSON metrics document.
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Short name used in logs and error messages.
    fn name(&self) -> &str;

    async fn fetch(&self) -> Result<Value>;

    /// Fetch with extra per-node detail where the source has any.
    async fn fetch_detailed(&self) -> Result<Value> {
        self.fetch().await
    }

    /// History kept by the upstream itself. `None` when it keeps none and the
    /// daemon answers from its own store.
    async fn history(&self) -> Result<Option<Value>> {
        Ok(None)
    }
}

/// A source nothing was configured for.
pub struct UnconfiguredSource {
    kind: SourceKind,
}

impl UnconfiguredSource {
    pub fn new(kind: SourceKind) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl MetricsSource for UnconfiguredSource {
    fn name(&self) -> &str {
        self.kind.as_str()
    }

    async fn fetch(&self) -> Result<Value> {
        Err(VigilError::NotConfigured { source_name: self.kind.as_str().to_string() })
    }
}

/// The two sources the daemon polls.
#[derive(Clone)]
pub struct Sources {
    pub nextcloud: Arc<dyn MetricsSource>,
    pub proxmox: Arc<dyn MetricsSource>,
}

impl Sources {
    /// Pick an implementation per source: direct, then relay, then unconfigured.
    pub fn from_config(config: &Config) -> Result<Self> {
        let timeout = config.request_timeout();

        let nextcloud: Arc<dyn MetricsSource> = match (&config.nextcloud, &config.api_base) {
            (Some(nc), _) => {
                info!(url = %nc.url, "Nextcloud: direct");
                Arc::new(NextcloudSource::new(nc, timeout)?)
            }
            (None, Some(base)) => {
                info!(api_base = %base, "Nextcloud: relay");
                Arc::new(RelaySource::nextcloud(base, timeout)?)
            }
            (None, None) => Arc::new(UnconfiguredSource::new(SourceKind::Nextcloud)),
        };

        let hosts = config.proxmox_hosts();
        let proxmox: Arc<dyn MetricsSource> = match (hosts.is_empty(), &config.api_base) {
            (false, _) => {
                info!(hosts = hosts.len(), "Proxmox: direct");
                Arc::new(ProxmoxSource::new(&hosts, timeout)?)
            }
            (true, Some(base)) => {
                info!(api_base = %base, "Proxmox: relay");
                Arc::new(RelaySource::proxmox(base, timeout)?)
            }
            (true, None) => Arc::new(UnconfiguredSource::new(SourceKind::Proxmox)),
        };

        Ok(Self { nextcloud, proxmox })
    }

    pub fn get(&self, kind: SourceKind) -> &Arc<dyn MetricsSource> {
        match kind {
            SourceKind::Nextcloud => &self.nextcloud,
            SourceKind::Proxmox => &self.proxmox,
        }
    }
}

/// HTTP client shared by the upstream implementations.
pub(crate) fn http_client(timeout: Duration, verify_ssl: bool) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .danger_accept_invalid_certs(!verify_ssl)
        .build()
        .map_err(|e| VigilError::InvalidConfig {
            reason: format!("Failed to create HTTP client: {}", e),
        })
}

/// Read a JSON body, mapping non-2xx statuses to `UpstreamStatus`.
pub(crate) async fn json_body(source_name: &str, response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    if !status.is_success() {
        return Err(VigilError::UpstreamStatus {
            source_name: source_name.to_string(),
            status: status.as_u16(),
        });
    }
    response.json::<Value>().await.map_err(|e| VigilError::InvalidResponse {
        source_name: source_name.to_string(),
        reason: e.to_string(),
    })
}
