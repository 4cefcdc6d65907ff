//! Observability infrastructure.
//!
//! Provides:
//! - Structured tracing (text or JSON) with env-based filtering
//! - OpenTelemetry metrics for creation, fan-out and queue outcomes

pub mod metrics;
pub mod tracing;
