//! Configuration management.
//!
//! Configuration comes from a YAML file and is then overridden by environment
//! variables, so a container can be pointed at different upstreams without
//! rewriting the file.

use crate::error::{Result, VigilError};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Default HTTP listen port.
pub const DEFAULT_PORT: u16 = 3000;

/// Default Proxmox API port.
pub const DEFAULT_PROXMOX_PORT: u16 = 8006;

/// Default poll interval in seconds.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;

/// Runtime configuration for vigil.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address the HTTP/WebSocket server binds to.
    pub listen_addr: String,
    /// Port the HTTP/WebSocket server binds to.
    pub port: u16,
    /// Seconds between poll cycles.
    pub poll_interval_secs: u64,
    /// Per-request timeout for upstream HTTP calls.
    pub request_timeout_secs: u64,
    /// Base URL of an upstream metrics API to relay (e.g. `http://127.0.0.1:5000`).
    pub api_base: Option<String>,
    /// Direct Nextcloud access.
    pub nextcloud: Option<NextcloudConfig>,
    /// Direct Proxmox access.
    pub proxmox: ProxmoxSection,
    /// History store settings.
    pub history: HistoryConfig,
    /// Port for the Prometheus exporter (disabled when unset).
    pub metrics_port: Option<u16>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            request_timeout_secs: 10,
            api_base: None,
            nextcloud: None,
            proxmox: ProxmoxSection::default(),
            history: HistoryConfig::default(),
            metrics_port: None,
        }
    }
}

/// Nextcloud serverinfo credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NextcloudConfig {
    /// Base URL of the Nextcloud instance.
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// serverinfo token, sent as `NC-Token` instead of basic auth.
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_true")]
    pub verify_ssl: bool,
}

/// A Proxmox VE host to authenticate against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxmoxHost {
    pub host: String,
    #[serde(default = "default_proxmox_port")]
    pub port: u16,
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub verify_ssl: bool,
    /// Full API base URL, for hosts behind a reverse proxy.
    #[serde(default)]
    pub api_url: Option<String>,
}

impl ProxmoxHost {
    /// The `/api2/json` base URL for this host.
    pub fn api_base(&self) -> String {
        match &self.api_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("https://{}:{}/api2/json", self.host, self.port),
        }
    }
}

/// The `proxmox` key accepts either a bare list of hosts or `{ hosts: [...] }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProxmoxSection {
    Hosts(Vec<ProxmoxHost>),
    Nested { hosts: Vec<ProxmoxHost> },
}

impl Default for ProxmoxSection {
    fn default() -> Self {
        Self::Hosts(Vec::new())
    }
}

impl ProxmoxSection {
    pub fn hosts(&self) -> &[ProxmoxHost] {
        match self {
            Self::Hosts(hosts) | Self::Nested { hosts } => hosts,
        }
    }

    fn hosts_mut(&mut self) -> &mut Vec<ProxmoxHost> {
        match self {
            Self::Hosts(hosts) | Self::Nested { hosts } => hosts,
        }
    }
}

/// History store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// SQLite database path (defaults to the data directory).
    pub db_path: Option<PathBuf>,
    /// Default trailing window for history queries.
    pub window_hours: u32,
    /// Rows older than this are pruned. Unset keeps everything.
    pub retention_hours: Option<u32>,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { db_path: None, window_hours: 24, retention_hours: None }
    }
}

impl HistoryConfig {
    pub fn db_path(&self) -> PathBuf {
        self.db_path.clone().unwrap_or_else(paths::db_path)
    }
}

fn default_true() -> bool {
    true
}

fn default_proxmox_port() -> u16 {
    DEFAULT_PROXMOX_PORT
}

impl Config {
    /// Load configuration from the default path, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = paths::config_path();
        let mut config = Self::load_from(&path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file. A missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| VigilError::IoError { path: path.to_path_buf(), source: e })?;
        info!(path = %path.display(), "Loaded config file");
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).map_err(|e| VigilError::InvalidConfig {
            reason: format!("Failed to parse config: {}", e),
        })
    }

    /// Apply environment overrides using `lookup` to read variables.
    ///
    /// Recognized: `API_BASE`, `PORT`, `POLL_INTERVAL`, `PROXMOX_HOSTS` (JSON list),
    /// `PROXMOX_PASSWORD_<n>` (1-based host index), `NEXTCLOUD_PASSWORD`, `VIGIL_DB_PATH`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(base) = lookup("API_BASE") {
            self.api_base = Some(base);
        }

        if let Some(port) = lookup("PORT") {
            self.port = port.parse().map_err(|_| VigilError::InvalidConfig {
                reason: format!("PORT is not a valid port number: {}", port),
            })?;
        }

        if let Some(interval) = lookup("POLL_INTERVAL") {
            self.poll_interval_secs = interval.parse().map_err(|_| VigilError::InvalidConfig {
                reason: format!("POLL_INTERVAL is not a number of seconds: {}", interval),
            })?;
        }

        if let Some(hosts) = lookup("PROXMOX_HOSTS") {
            let hosts: Vec<ProxmoxHost> =
                serde_json::from_str(&hosts).map_err(|e| VigilError::InvalidConfig {
                    reason: format!("PROXMOX_HOSTS is not a JSON list of hosts: {}", e),
                })?;
            self.proxmox = ProxmoxSection::Hosts(hosts);
        }

        for (i, host) in self.proxmox.hosts_mut().iter_mut().enumerate() {
            if let Some(password) = lookup(&format!("PROXMOX_PASSWORD_{}", i + 1)) {
                host.password = Some(password);
            }
        }

        if let (Some(nextcloud), Some(password)) =
            (self.nextcloud.as_mut(), lookup("NEXTCLOUD_PASSWORD"))
        {
            nextcloud.password = Some(password);
        }

        if let Some(db_path) = lookup("VIGIL_DB_PATH") {
            self.history.db_path = Some(PathBuf::from(db_path));
        }

        Ok(())
    }

    /// Check the configuration for values the daemon cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_secs == 0 {
            return Err(VigilError::InvalidConfig {
                reason: "poll_interval_secs must be greater than zero".to_string(),
            });
        }
        if self.request_timeout_secs == 0 {
            return Err(VigilError::InvalidConfig {
                reason: "request_timeout_secs must be greater than zero".to_string(),
            });
        }
        if self.port == 0 {
            return Err(VigilError::InvalidConfig { reason: "port must not be zero".to_string() });
        }
        if let Some(base) = &self.api_base {
            url::Url::parse(base).map_err(|e| VigilError::InvalidConfig {
                reason: format!("api_base {:?} is not a valid URL: {}", base, e),
            })?;
        }
        if let Some(nextcloud) = &self.nextcloud {
            url::Url::parse(&nextcloud.url).map_err(|e| VigilError::InvalidConfig {
                reason: format!("nextcloud.url {:?} is not a valid URL: {}", nextcloud.url, e),
            })?;
        }
        self.listen_socket()?;
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// The socket address the server binds to.
    pub fn listen_socket(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.listen_addr, self.port).parse().map_err(|e| {
            VigilError::InvalidConfig {
                reason: format!("invalid listen address {}:{}: {}", self.listen_addr, self.port, e),
            }
        })
    }

    /// Proxmox hosts that have credentials. Hosts without a password are skipped.
    pub fn proxmox_hosts(&self) -> Vec<ProxmoxHost> {
        self.proxmox
            .hosts()
            .iter()
            .enumerate()
            .filter_map(|(i, host)| match &host.password {
                Some(password) if !password.is_empty() => Some(host.clone()),
                _ => {
                    warn!(
                        host = %host.host,
                        env = %format!("PROXMOX_PASSWORD_{}", i + 1),
                        "No password configured for Proxmox host, skipping"
                    );
                    None
                }
            })
            .collect()
    }
}
