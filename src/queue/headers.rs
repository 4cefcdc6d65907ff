//! Trace context carried in AMQP message headers.
//!
//! The publisher injects the current span's context into the header table
//! and the consumer extracts it as the parent of the message span, so one
//! trace spans both sides of the queue.

use lapin::types::{AMQPValue, FieldTable, ShortString};
use opentelemetry::propagation::{Extractor, Injector};
use opentelemetry::trace::TraceContextExt;
use opentelemetry::{global, Context};
use tracing_opentelemetry::OpenTelemetrySpanExt;

/// Writes propagation fields as long-string headers.
pub struct HeaderInjector<'a>(pub &'a mut FieldTable);

impl Injector for HeaderInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        self.0
            .insert(ShortString::from(key), AMQPValue::LongString(value.into()));
    }
}

/// Reads propagation fields from string-valued headers. Other value types
/// are treated as absent.
pub struct HeaderExtractor<'a>(pub &'a FieldTable);

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        let (_, value) = self.0.inner().iter().find(|(name, _)| name.as_str() == key)?;
        match value {
            AMQPValue::LongString(s) => std::str::from_utf8(s.as_bytes()).ok(),
            AMQPValue::ShortString(s) => Some(s.as_str()),
            _ => None,
        }
    }

    fn keys(&self) -> Vec<&str> {
        self.0.inner().keys().map(ShortString::as_str).collect()
    }
}

/// Inject `cx` into `headers` with the global propagator.
pub fn inject(cx: &Context, headers: &mut FieldTable) {
    global::get_text_map_propagator(|propagator| {
        propagator.inject_context(cx, &mut HeaderInjector(headers));
    });
}

/// Inject the current tracing span's context.
pub fn inject_current(headers: &mut FieldTable) {
    inject(&tracing::Span::current().context(), headers);
}

/// Extract a remote context from `headers` with the global propagator.
pub fn extract(headers: &FieldTable) -> Context {
    global::get_text_map_propagator(|propagator| propagator.extract(&HeaderExtractor(headers)))
}

/// Make `span` a child of the trace carried in `headers`, if there is one.
pub fn link_parent(span: &tracing::Span, headers: Option<&FieldTable>) {
    let Some(headers) = headers else {
        return;
    };
    let parent = extract(headers);
    if parent.span().span_context().is_valid() {
        span.set_parent(parent);
    }
}
