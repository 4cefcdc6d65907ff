//! Live fan-out infrastructure.
//!
//! Provides:
//! - The room hub: a single control loop owning room membership
//! - Client registrations with bounded, drop-on-full delivery buffers

pub mod hub;

pub use hub::{Client, ClientId, Hub, HubLoop, HubStats, CLIENT_BUFFER};
