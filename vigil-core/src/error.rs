//! Error types for vigil.
//!
//! All errors use `thiserror` for ergonomic error handling and proper error chains.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for vigil operations.
pub type Result<T> = std::result::Result<T, VigilError>;

/// Main error type for vigil.
#[derive(Error, Debug)]
pub enum VigilError {
    // Upstream errors
    #[error("{source_name} upstream request failed: {reason}")]
    Upstream { source_name: String, reason: String },

    #[error("{source_name} returned HTTP {status}")]
    UpstreamStatus { source_name: String, status: u16 },

    #[error("Invalid response from {source_name}: {reason}")]
    InvalidResponse { source_name: String, reason: String },

    #[error("Authentication against {host} failed: {reason}")]
    Auth { host: String, reason: String },

    #[error("{source_name} is not configured")]
    NotConfigured { source_name: String },

    #[error("Unknown source: {0}")]
    UnknownSource(String),

    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Database migration failed: {reason}")]
    MigrationFailed { reason: String },

    // Configuration errors
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("I/O error at {path:?}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl VigilError {
    /// Create an Internal error from any error type.
    pub fn internal(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Internal(err.to_string())
    }

    /// Create an Upstream error for a named source.
    pub fn upstream(source_name: &str, reason: impl std::fmt::Display) -> Self {
        Self::Upstream { source_name: source_name.to_string(), reason: reason.to_string() }
    }

    /// Whether this error came from talking to an upstream system.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            Self::Upstream { .. }
                | Self::UpstreamStatus { .. }
                | Self::InvalidResponse { .. }
                | Self::Auth { .. }
                | Self::NotConfigured { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_classification() {
        assert!(VigilError::upstream("proxmox", "connection refused").is_upstream());
        assert!(VigilError::UpstreamStatus { source_name: "nextcloud".into(), status: 502 }
            .is_upstream());
        assert!(!VigilError::DatabaseError("locked".into()).is_upstream());
    }

    #[test]
    fn test_messages() {
        let err = VigilError::UpstreamStatus { source_name: "nextcloud".into(), status: 503 };
        assert_eq!(err.to_string(), "nextcloud returned HTTP 503");

        let err = VigilError::upstream("proxmox", "timed out");
        assert_eq!(err.to_string(), "proxmox upstream request failed: timed out");
    }
}
