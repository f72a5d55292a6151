//! Summary of a Nextcloud serverinfo response.

use super::cluster::percent;
use super::unwrap_payload;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The figures the dashboard shows for Nextcloud, pulled out of the
/// `ocs.data` document of the serverinfo API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NextcloudSummary {
    pub version: Option<String>,
    /// 1, 5 and 15 minute load averages.
    pub load: Vec<f64>,
    pub cpu_count: u32,
    /// Memory in bytes (serverinfo reports KiB).
    pub memory_total: u64,
    pub memory_used: u64,
    pub free_space: Option<u64>,
    pub users: Option<u64>,
    pub files: Option<u64>,
    pub active_users_24h: Option<u64>,
    pub database: Option<String>,
    pub database_size: Option<u64>,
}

impl NextcloudSummary {
    /// Parse a serverinfo body. Returns `None` when `ocs.data` is missing.
    pub fn from_value(value: &Value) -> Option<Self> {
        let data = unwrap_payload(value).get("ocs")?.get("data")?;
        let system = data.pointer("/nextcloud/system").unwrap_or(&Value::Null);
        let storage = data.pointer("/nextcloud/storage").unwrap_or(&Value::Null);

        let memory_total = kib(system.get("mem_total"));
        let memory_free = kib(system.get("mem_free"));

        Some(Self {
            version: system.get("version").and_then(Value::as_str).map(str::to_string),
            load: system
                .get("cpuload")
                .and_then(Value::as_array)
                .map(|loads| loads.iter().filter_map(Value::as_f64).collect())
                .unwrap_or_default(),
            cpu_count: system.get("cpunum").and_then(Value::as_u64).unwrap_or(1).max(1) as u32,
            memory_total,
            memory_used: memory_total.saturating_sub(memory_free),
            free_space: system.get("freespace").and_then(Value::as_u64),
            users: storage.get("num_users").and_then(Value::as_u64),
            files: storage.get("num_files").and_then(Value::as_u64),
            active_users_24h: data.pointer("/activeUsers/last24hours").and_then(Value::as_u64),
            database: data.pointer("/server/database/type").and_then(Value::as_str).map(|db| {
                match data.pointer("/server/database/version").and_then(Value::as_str) {
                    Some(version) => format!("{} {}", db, version),
                    None => db.to_string(),
                }
            }),
            database_size: data.pointer("/server/database/size").and_then(Value::as_u64),
        })
    }

    /// One-minute load relative to the CPU count, capped at 100.
    pub fn cpu_percent(&self) -> f64 {
        let load1 = self.load.first().copied().unwrap_or(0.0);
        (load1 / self.cpu_count.max(1) as f64 * 100.0).min(100.0)
    }

    pub fn memory_percent(&self) -> f64 {
        percent(self.memory_used, self.memory_total)
    }
}

/// serverinfo memory figures are KiB, sometimes as strings.
fn kib(value: Option<&Value>) -> u64 {
    let kib = match value {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
        Some(Value::String(s)) => s.parse().unwrap_or(0),
        _ => 0,
    };
    kib.saturating_mul(1024)
}
