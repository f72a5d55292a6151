//! Proxmox VE API response bodies.
//!
//! Only the fields vigil reads are modeled. Proxmox is loose with number
//! encoding (`loadavg` comes as strings, `vmid` sometimes too), so numeric
//! fields accept either form.

use serde::de::{self, Deserializer};
use serde::Deserialize;

/// Every Proxmox response wraps its payload in `{ "data": ... }`.
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope<T> {
    pub data: T,
}

/// `POST /access/ticket`.
#[derive(Debug, Clone, Deserialize)]
pub struct Ticket {
    pub ticket: String,
    #[serde(rename = "CSRFPreventionToken")]
    pub csrf_token: String,
}

/// An entry of `GET /nodes`.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeListItem {
    pub node: String,
    #[serde(default = "unknown")]
    pub status: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub cpu: f64,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub mem: u64,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub maxmem: u64,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub uptime: u64,
}

/// `GET /nodes/{node}/status`.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeStatus {
    /// Fraction, 0.0 to 1.0.
    #[serde(default, deserialize_with = "lenient_f64")]
    pub cpu: f64,
    #[serde(default)]
    pub memory: MemoryInfo,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub uptime: u64,
    #[serde(default, deserialize_with = "lenient_loadavg")]
    pub loadavg: [f64; 3],
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MemoryInfo {
    #[serde(default, deserialize_with = "lenient_u64")]
    pub total: u64,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub used: u64,
}

/// An entry of `GET /nodes/{node}/qemu` or `/lxc`.
#[derive(Debug, Clone, Deserialize)]
pub struct GuestListItem {
    #[serde(deserialize_with = "lenient_u32")]
    pub vmid: u32,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "unknown")]
    pub status: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub cpu: f64,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub mem: u64,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub maxmem: u64,
}

/// An entry of `GET /nodes/{node}/storage`.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageItem {
    pub storage: String,
    #[serde(rename = "type", default = "unknown")]
    pub kind: String,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub total: u64,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub used: u64,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub avail: u64,
}

fn unknown() -> String {
    "unknown".to_string()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Number {
    Float(f64),
    Text(String),
}

impl Number {
    fn to_f64<E: de::Error>(self) -> Result<f64, E> {
        match self {
            Number::Float(n) => Ok(n),
            Number::Text(s) => s.trim().parse().map_err(E::custom),
        }
    }
}

fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    match Option::<Number>::deserialize(deserializer)? {
        Some(n) => n.to_f64(),
        None => Ok(0.0),
    }
}

fn lenient_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    let value = lenient_f64(deserializer)?;
    Ok(if value.is_finite() && value > 0.0 { value as u64 } else { 0 })
}

fn lenient_u32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let value = Number::deserialize(deserializer)?.to_f64::<D::Error>()?;
    if value.is_finite() && value >= 0.0 && value <= u32::MAX as f64 {
        Ok(value as u32)
    } else {
        Err(de::Error::custom(format!("invalid vmid {}", value)))
    }
}

fn lenient_loadavg<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[f64; 3], D::Error> {
    let values = Option::<Vec<Number>>::deserialize(deserializer)?.unwrap_or_default();
    let mut load = [0.0; 3];
    for (slot, value) in load.iter_mut().zip(values) {
        *slot = value.to_f64()?;
    }
    Ok(load)
}
