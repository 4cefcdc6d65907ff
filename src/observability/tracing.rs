//! OpenTelemetry tracing setup.
//!
//! Configures structured logging with:
//! - `RUST_LOG` filtering, falling back to the configured level
//! - Human-readable or JSON line output
//! - W3C Trace Context and Baggage propagation
//! - OTLP span export when a collector endpoint is configured

use opentelemetry::propagation::TextMapCompositePropagator;
use opentelemetry::trace::{TraceError, TracerProvider as _};
use opentelemetry::{global, KeyValue};
use opentelemetry_sdk::propagation::{BaggagePropagator, TraceContextPropagator};
use opentelemetry_sdk::trace::{Config as TraceConfig, Tracer};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::Resource;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogFormat;

/// Where spans go, if anywhere.
#[derive(Debug, Clone, Copy)]
pub struct TraceExport<'a> {
    pub endpoint: Option<&'a str>,
    pub service_name: &'a str,
}

/// Initialize tracing for the server process.
///
/// # Arguments
///
/// * `log_level` - Default level when `RUST_LOG` is unset or invalid
/// * `format` - Text or JSON output
/// * `export` - OTLP collector and service name for span export
///
/// # Panics
///
/// Panics if tracing has already been initialized.
pub fn init_tracing(log_level: &str, format: LogFormat, export: TraceExport<'_>) {
    install_propagator();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{log_level},roomcast=debug")));

    let mut export_error = None;
    let otel_layer = export.endpoint.and_then(|endpoint| {
        match otlp_tracer(endpoint, export.service_name) {
            Ok(tracer) => Some(tracing_opentelemetry::layer().with_tracer(tracer)),
            Err(e) => {
                export_error = Some(e);
                None
            }
        }
    });

    match format {
        LogFormat::Text => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true);

            tracing_subscriber::registry()
                .with(otel_layer)
                .with(filter)
                .with(fmt_layer)
                .init();
        }
        LogFormat::Json => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_target(true);

            tracing_subscriber::registry()
                .with(otel_layer)
                .with(filter)
                .with(fmt_layer)
                .init();
        }
    }

    if let Some(e) = export_error {
        tracing::warn!(error = %e, "Failed to create OTLP span exporter, spans stay local");
    } else if let Some(endpoint) = export.endpoint {
        tracing::info!(endpoint, "OTLP span exporter configured");
    }
    tracing::info!(level = log_level, ?format, "Tracing initialized");
}

/// Register the W3C Trace Context + Baggage propagator globally.
pub fn install_propagator() {
    global::set_text_map_propagator(TextMapCompositePropagator::new(vec![
        Box::new(TraceContextPropagator::new()),
        Box::new(BaggagePropagator::new()),
    ]));
}

/// Flush and stop span export. No-op when nothing was exported.
pub fn shutdown_tracing() {
    global::shutdown_tracer_provider();
}

fn otlp_tracer(endpoint: &str, service_name: &str) -> Result<Tracer, TraceError> {
    let provider = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(collector_url(endpoint)),
        )
        .with_trace_config(TraceConfig::default().with_resource(Resource::new(vec![
            KeyValue::new("service.name", service_name.to_string()),
        ])))
        .install_batch(opentelemetry_sdk::runtime::Tokio)?;

    global::set_tracer_provider(provider.clone());
    Ok(provider.tracer("roomcast"))
}

/// The gRPC exporter needs a scheme; bare `host:port` is treated as plaintext.
fn collector_url(endpoint: &str) -> String {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!("http://{endpoint}")
    }
}

/// Initialize tracing for tests (only logs errors).
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("error")
        .with_test_writer()
        .try_init();
}
