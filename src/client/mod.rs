//! Shared HTTP client library for Roomcast.
//!
//! This module provides a reusable client for talking to a Roomcast server,
//! used by the `roomcastctl` CLI and the integration tests.

mod connection;
mod sse;
mod subscription;

pub use connection::RoomcastClient;
pub use sse::{FrameDecoder, SseFrame};
pub use subscription::{StreamEvent, Subscription};
