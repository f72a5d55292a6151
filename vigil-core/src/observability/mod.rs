//! Logging, trace export, Prometheus metrics and health state for vigild.
//!
//! Logs go to stdout through `tracing`. Spans are exported over OTLP only when
//! a collector is configured, and `/metrics` is served only when the config
//! names a metrics port.

use metrics_exporter_prometheus::PrometheusBuilder;
use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::{self, RandomIdGenerator, Sampler};
use opentelemetry_sdk::Resource;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod health;
pub mod metrics;

const DEFAULT_OTLP_ENDPOINT: &str = "http://localhost:4317";

/// Collector endpoint, if span export is wanted.
///
/// An explicit `OTEL_EXPORTER_OTLP_ENDPOINT` wins; `VIGIL_OTLP_ENABLED` alone
/// exports to a local collector.
fn otlp_target(lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
    match (lookup("OTEL_EXPORTER_OTLP_ENDPOINT"), lookup("VIGIL_OTLP_ENABLED")) {
        (Some(endpoint), _) => Some(endpoint),
        (None, Some(_)) => Some(DEFAULT_OTLP_ENDPOINT.to_string()),
        (None, None) => None,
    }
}

/// Set up logging for `service_name` and, with `metrics_port`, the Prometheus
/// listener. The global subscriber can only be installed once per process.
pub fn init(
    service_name: &'static str,
    metrics_port: Option<u16>,
) -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let logs = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true).with_level(true));

    match otlp_target(|name| std::env::var(name).ok()) {
        Some(endpoint) => {
            let resource = Resource::new(vec![
                KeyValue::new("service.name", service_name),
                KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
            ]);
            let tracer = opentelemetry_otlp::new_pipeline()
                .tracing()
                .with_exporter(opentelemetry_otlp::new_exporter().tonic().with_endpoint(&endpoint))
                .with_trace_config(
                    trace::config()
                        .with_sampler(Sampler::AlwaysOn)
                        .with_id_generator(RandomIdGenerator::default())
                        .with_resource(resource),
                )
                .install_batch(opentelemetry_sdk::runtime::Tokio)?;

            logs.with(tracing_opentelemetry::layer().with_tracer(tracer)).init();
            tracing::info!(service = service_name, %endpoint, "Exporting spans over OTLP");
        }
        None => {
            logs.init();
            tracing::debug!(service = service_name, "No OTLP collector configured");
        }
    }

    if let Some(port) = metrics_port {
        PrometheusBuilder::new().with_http_listener(([0, 0, 0, 0], port)).install()?;
        metrics::register_core_metrics();
        tracing::info!(port, "Serving Prometheus metrics");
    }

    Ok(())
}

/// Flush spans still queued for export.
pub fn shutdown() {
    opentelemetry::global::shutdown_tracer_provider();
}
