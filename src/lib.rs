//! Roomcast: a room-scoped real-time notification hub.
//!
//! Notifications arrive over HTTP or from an AMQP queue, are persisted through a
//! repository, and are fanned out live to Server-Sent Events subscribers grouped
//! by room. New subscribers receive a bounded slice of history before live
//! delivery starts.
//!
//! # Architecture
//!
//! - **Single-owner hub**: one control loop owns room membership and delivery
//! - **Best-effort live delivery**: slow subscribers lose events, producers never block
//! - **At-least-once ingestion**: queue messages are acked or requeued by outcome
//! - **Observable**: structured tracing and OpenTelemetry metrics
//!
//! # Modules
//!
//! - [`client`]: HTTP/SSE client used by `roomcastctl` and the integration tests
//! - [`config`]: CLI and environment configuration
//! - [`flow`]: Room hub and subscriber registrations
//! - [`model`]: Notification types and request validation
//! - [`notify`]: Notification service and the stream hand-off
//! - [`observability`]: Metrics and tracing setup
//! - [`queue`]: AMQP consumer and publisher
//! - [`server`]: Process wiring and lifecycle
//! - [`service`]: HTTP handlers (create, publish, stream)
//! - [`storage`]: Repository contract with memory and SQLite backends

// Lint configuration
#![warn(clippy::all)]
#![allow(
    clippy::module_name_repetitions,    // queue::QueueError is fine
    clippy::must_use_candidate,         // Not all functions need #[must_use]
    clippy::missing_errors_doc,         // Error docs can be verbose
    clippy::missing_panics_doc,         // Panic docs can be verbose
    clippy::needless_raw_string_hashes, // r#""# is fine for SQL
    clippy::struct_excessive_bools,     // Config structs may have flags
    clippy::too_many_lines              // Some functions are inherently long
)]

pub mod client;
pub mod config;
pub mod flow;
pub mod model;
pub mod notify;
pub mod observability;
pub mod queue;
pub mod server;
pub mod service;
pub mod storage;

pub use model::{Notification, NotificationKind, NotificationPayload, ValidationError};
