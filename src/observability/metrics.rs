//! OpenTelemetry metrics.
//!
//! Key metrics:
//! - roomcast_notifications_created_total: Counter of persisted notifications
//! - roomcast_create_latency_seconds: Histogram of validate + write + broadcast
//! - roomcast_broadcast_dropped_total: Counter of live deliveries dropped on full buffers
//! - roomcast_active_subscribers: Gauge of registered stream clients
//! - roomcast_queue_messages_total: Counter of consumed messages by outcome
//! - roomcast_queue_publish_total: Counter of publish attempts by outcome

use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter};
use opentelemetry::{global, KeyValue};
use opentelemetry_sdk::metrics::{ManualReader, SdkMeterProvider};
use std::sync::OnceLock;

/// Global metrics instance.
static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Roomcast metrics registry.
#[derive(Debug)]
pub struct Metrics {
    pub notifications_created: Counter<u64>,
    pub create_latency: Histogram<f64>,
    pub broadcast_dropped: Counter<u64>,
    pub active_subscribers: Gauge<i64>,
    pub queue_messages: Counter<u64>,
    pub queue_publish: Counter<u64>,
}

impl Metrics {
    fn new(meter: &Meter) -> Self {
        Self {
            notifications_created: meter
                .u64_counter("roomcast_notifications_created_total")
                .with_description("Notifications persisted and handed to the hub")
                .with_unit("1")
                .init(),
            create_latency: meter
                .f64_histogram("roomcast_create_latency_seconds")
                .with_description("Create latency from validation to broadcast hand-off")
                .with_unit("s")
                .init(),
            broadcast_dropped: meter
                .u64_counter("roomcast_broadcast_dropped_total")
                .with_description("Live deliveries dropped because a subscriber buffer was full")
                .with_unit("1")
                .init(),
            active_subscribers: meter
                .i64_gauge("roomcast_active_subscribers")
                .with_description("Stream clients currently registered with the hub")
                .with_unit("1")
                .init(),
            queue_messages: meter
                .u64_counter("roomcast_queue_messages_total")
                .with_description("Consumed queue messages by outcome (ack, reject, requeue)")
                .with_unit("1")
                .init(),
            queue_publish: meter
                .u64_counter("roomcast_queue_publish_total")
                .with_description("Queue publish attempts by outcome (ok, error)")
                .with_unit("1")
                .init(),
        }
    }
}

/// Initialize the metrics system.
///
/// This should be called once at startup. Subsequent calls are ignored.
///
/// # Arguments
///
/// * `otel_endpoint` - Optional OTLP endpoint for metrics export
pub fn init_metrics_with_endpoint(otel_endpoint: Option<&str>) {
    METRICS.get_or_init(|| {
        if let Some(endpoint) = otel_endpoint {
            use opentelemetry_otlp::{Protocol, WithExportConfig};

            let exporter = opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint)
                .with_protocol(Protocol::Grpc);

            match opentelemetry_otlp::new_pipeline()
                .metrics(opentelemetry_sdk::runtime::Tokio)
                .with_exporter(exporter)
                .with_period(std::time::Duration::from_secs(10))
                .build()
            {
                Ok(provider) => {
                    global::set_meter_provider(provider);
                    tracing::info!(endpoint, "OTLP metrics exporter configured");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to create OTLP exporter, using no-op metrics");
                    set_manual_provider();
                }
            }
        } else {
            // Recorded but never exported
            set_manual_provider();
        }

        let meter = global::meter("roomcast");
        Metrics::new(&meter)
    });
}

fn set_manual_provider() {
    let reader = ManualReader::builder().build();
    let provider = SdkMeterProvider::builder().with_reader(reader).build();
    global::set_meter_provider(provider);
}

/// Initialize the metrics system without OTLP export.
pub fn init_metrics() {
    init_metrics_with_endpoint(None);
}

/// Record a successful create.
pub fn record_notification_created(kind: &str, latency_seconds: f64) {
    if let Some(m) = METRICS.get() {
        let attrs = [KeyValue::new("type", kind.to_string())];
        m.notifications_created.add(1, &attrs);
        m.create_latency.record(latency_seconds, &attrs);
    }
}

/// Record a live delivery dropped for a slow subscriber.
pub fn record_broadcast_dropped(room: &str) {
    if let Some(m) = METRICS.get() {
        m.broadcast_dropped
            .add(1, &[KeyValue::new("room", room.to_string())]);
    }
}

/// Record the number of registered stream clients.
pub fn record_active_subscribers(count: usize) {
    if let Some(m) = METRICS.get() {
        m.active_subscribers
            .record(i64::try_from(count).unwrap_or(i64::MAX), &[]);
    }
}

/// Record how a consumed queue message was settled.
pub fn record_queue_message(outcome: &'static str) {
    if let Some(m) = METRICS.get() {
        m.queue_messages.add(1, &[KeyValue::new("outcome", outcome)]);
    }
}

/// Record the outcome of a queue publish.
pub fn record_queue_publish(outcome: &'static str) {
    if let Some(m) = METRICS.get() {
        m.queue_publish.add(1, &[KeyValue::new("outcome", outcome)]);
    }
}
