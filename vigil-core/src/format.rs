//! Human-readable formatting of metric values.

use serde::{Deserialize, Serialize};

const BYTE_UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];

/// Format a byte count with a 1024 base, e.g. `1.5 KB`.
///
/// Up to two decimals, trailing zeros dropped. Values past a petabyte stay
/// in PB.
pub fn format_bytes(bytes: u64) -> String {
    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < BYTE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    format!("{} {}", trim_decimals(value), BYTE_UNITS[unit])
}

/// Format seconds of uptime as `Xd Yh Zm`, omitting zero parts.
pub fn format_uptime(seconds: u64) -> String {
    if seconds == 0 {
        return "0m".to_string();
    }

    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3_600;
    let minutes = (seconds % 3_600) / 60;

    let mut parts = Vec::new();
    if days > 0 {
        parts.push(format!("{}d", days));
    }
    if hours > 0 {
        parts.push(format!("{}h", hours));
    }
    if minutes > 0 {
        parts.push(format!("{}m", minutes));
    }

    if parts.is_empty() {
        "<1m".to_string()
    } else {
        parts.join(" ")
    }
}

/// Format a percentage with one decimal.
pub fn format_percent(value: f64) -> String {
    let value = if value.is_finite() { value } else { 0.0 };
    format!("{:.1}%", value)
}

/// Severity band of a usage percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageLevel {
    Ok,
    Warning,
    Critical,
}

/// Below 50 is ok, below 80 a warning, anything else critical.
pub fn usage_level(percent: f64) -> UsageLevel {
    if percent < 50.0 {
        UsageLevel::Ok
    } else if percent < 80.0 {
        UsageLevel::Warning
    } else {
        UsageLevel::Critical
    }
}

fn trim_decimals(value: f64) -> String {
    let text = format!("{:.2}", value);
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}
