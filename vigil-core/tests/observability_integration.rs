//! Integration tests for the observability helpers.
//!
//! Metrics are recorded into a local Prometheus recorder and checked through
//! its text rendering; no scrape endpoint or collector is needed.
//!
//! ```bash
//! cargo test -p vigil-core --test observability_integration
//! ```

use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use vigil_core::observability::health::{HealthChecker, HealthStatus};
use vigil_core::observability::metrics::*;

/// Validates:
/// - every helper records under its documented name
/// - labels carry source, endpoint and status
#[test]
fn test_metric_helpers_render() {
    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();

    metrics::with_local_recorder(&recorder, || {
        register_core_metrics();
        record_poll_cycle(0.25);
        record_poll_cycle(0.5);
        record_upstream_failure("proxmox");
        record_api_request("history", 404);
        set_push_clients(3);
    });

    let text = handle.render();
    assert!(text.contains("vigil_poll_cycles_total 2"));
    assert!(text.contains("vigil_poll_duration_seconds"));
    assert!(text.contains(r#"vigil_upstream_failures_total{source="proxmox"} 1"#));
    assert!(text.contains(r#"endpoint="history""#));
    assert!(text.contains(r#"status="404""#));
    assert!(text.contains("vigil_push_clients 3"));
}

/// Validates:
/// - concurrent updates from several tasks leave a consistent view
/// - the worst subsystem decides the overall status
#[tokio::test]
async fn test_health_checker_concurrent_updates() {
    let checker = Arc::new(HealthChecker::new());
    for name in ["nextcloud", "proxmox", "history"] {
        checker.register_subsystem(name).await;
    }

    let mut handles = Vec::new();
    for i in 0..20 {
        let checker = Arc::clone(&checker);
        handles.push(tokio::spawn(async move {
            let name = if i % 2 == 0 { "nextcloud" } else { "proxmox" };
            checker
                .update_subsystem(name, HealthStatus::Degraded, Some(format!("failure {}", i)))
                .await;
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let health = checker.get_health().await;
    assert_eq!(health.status, HealthStatus::Degraded);
    assert_eq!(health.subsystems.len(), 3);
    let history = health.subsystems.iter().find(|s| s.name == "history").unwrap();
    assert_eq!(history.status, HealthStatus::Healthy);

    checker.update_subsystem("history", HealthStatus::Unhealthy, Some("disk full".into())).await;
    assert_eq!(checker.get_health().await.status, HealthStatus::Unhealthy);

    for name in ["nextcloud", "proxmox", "history"] {
        checker.update_subsystem(name, HealthStatus::Healthy, None).await;
    }
    assert!(checker.is_ready().await);
}
