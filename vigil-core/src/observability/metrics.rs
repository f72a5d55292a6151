//! Core metrics definitions.
//!
//! Names follow Prometheus conventions: `_total` for counters, `_seconds` for
//! durations.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

/// Register all core metrics with descriptions.
pub fn register_core_metrics() {
    // Poll loop
    describe_counter!("vigil_poll_cycles_total", "Total number of completed poll cycles");
    describe_histogram!("vigil_poll_duration_seconds", "Duration of one poll cycle");
    describe_counter!(
        "vigil_upstream_failures_total",
        "Total number of failed upstream fetches (by source)"
    );

    // Push channel
    describe_gauge!("vigil_push_clients", "Currently connected push channel clients");

    // API
    describe_counter!(
        "vigil_api_requests_total",
        "Total number of API requests (by endpoint, status)"
    );

    // History store
    describe_counter!("vigil_history_writes_total", "Total history rows written (by source)");
    describe_counter!("vigil_db_errors_total", "Total database failures (by operation)");
}

pub fn record_poll_cycle(duration_secs: f64) {
    counter!("vigil_poll_cycles_total").increment(1);
    histogram!("vigil_poll_duration_seconds").record(duration_secs);
}

pub fn record_upstream_failure(source: &str) {
    counter!("vigil_upstream_failures_total", "source" => source.to_string()).increment(1);
}

pub fn record_api_request(endpoint: &'static str, status: u16) {
    counter!("vigil_api_requests_total", "endpoint" => endpoint, "status" => status.to_string())
        .increment(1);
}

pub fn set_push_clients(count: usize) {
    gauge!("vigil_push_clients").set(count as f64);
}
