//! Poll-cycle snapshot.

use super::history::SourceKind;
use crate::error::VigilError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One full poll cycle's combined metrics payload.
///
/// Has no identity beyond its cycle number and timestamp; the next snapshot
/// supersedes it entirely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Poll cycle counter, strictly increasing for the lifetime of the daemon.
    pub cycle: u64,
    /// When the cycle finished.
    pub timestamp: DateTime<Utc>,
    pub nextcloud: SourceReport,
    pub proxmox: SourceReport,
}

impl Snapshot {
    pub fn new(cycle: u64, nextcloud: SourceReport, proxmox: SourceReport) -> Self {
        Self { cycle, timestamp: Utc::now(), nextcloud, proxmox }
    }

    pub fn report(&self, kind: SourceKind) -> &SourceReport {
        match kind {
            SourceKind::Nextcloud => &self.nextcloud,
            SourceKind::Proxmox => &self.proxmox,
        }
    }

    /// Number of sources that failed in this cycle.
    pub fn failed_sources(&self) -> usize {
        [&self.nextcloud, &self.proxmox].iter().filter(|r| !r.is_ok()).count()
    }
}

/// What one upstream produced during a cycle.
///
/// Serializes as the upstream body verbatim, or as `{"error": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourceReport {
    Failed { error: String },
    Data(Value),
}

impl SourceReport {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed { error: message.into() }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Data(_))
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Data(value) => Some(value),
            Self::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Failed { error } => Some(error),
            Self::Data(_) => None,
        }
    }
}

impl From<Result<Value, VigilError>> for SourceReport {
    fn from(result: Result<Value, VigilError>) -> Self {
        match result {
            Ok(value) => Self::Data(value),
            Err(e) => Self::failed(e.to_string()),
        }
    }
}
