//! Centralized path configuration for vigil.
//!
//! Daemon and CLI resolve their files through this module so both agree on
//! where the config file and history database live.

use std::path::PathBuf;

/// Get the vigil data directory.
///
/// Resolution order:
/// 1. `VIGIL_DATA_DIR` environment variable
/// 2. `/var/lib/vigil` if it exists (system install)
/// 3. `~/.local/share/vigil` (or the platform equivalent)
pub fn data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("VIGIL_DATA_DIR") {
        return PathBuf::from(dir);
    }

    let system_dir = PathBuf::from("/var/lib/vigil");
    if system_dir.exists() {
        return system_dir;
    }

    dirs::data_dir().map(|d| d.join("vigil")).unwrap_or(system_dir)
}

/// Get the configuration directory.
pub fn config_dir() -> PathBuf {
    dirs::config_dir().map(|d| d.join("vigil")).unwrap_or_else(|| PathBuf::from("/etc/vigil"))
}

/// Default path of the YAML configuration file.
///
/// `VIGIL_CONFIG` overrides it.
pub fn config_path() -> PathBuf {
    std::env::var("VIGIL_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| config_dir().join("config.yaml"))
}

/// Get the history database path.
pub fn db_path() -> PathBuf {
    data_dir().join("history.db")
}
