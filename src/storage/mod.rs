//! Notification storage.
//!
//! Provides:
//! - The [`NotificationRepository`] contract used by the notification service
//! - An in-memory store for single-process deployments and tests
//! - A SQLite store with pooled connections
//!
//! Both stores assign ids that are strictly increasing and never reused, and
//! return room history newest first.

pub mod memory;
pub mod schema;
pub mod sqlite;

#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::config::Config;
use crate::model::{NewNotification, Notification};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Error type for storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to get pooled connection: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("corrupt notification row {id}: {reason}")]
    Corrupt { id: i64, reason: String },

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Durable notification store.
///
/// Implementations must be safe for concurrent use without external locking.
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    /// Append a notification, assigning its id and, when absent, its
    /// creation time.
    async fn create(&self, notification: NewNotification) -> Result<Notification, StoreError>;

    /// List a room's notifications newest first. A `limit` of 0 means no limit.
    async fn list(&self, room: &str, limit: usize) -> Result<Vec<Notification>, StoreError>;
}

/// Open the store selected by configuration: SQLite when a database path is
/// set, memory otherwise.
pub fn open_store(config: &Config) -> Result<Arc<dyn NotificationRepository>, StoreError> {
    match &config.database {
        Some(path) => {
            tracing::info!(path = %path.display(), "Opening SQLite notification store");
            Ok(Arc::new(SqliteStore::open(path, config.pool_size)?))
        }
        None => {
            tracing::info!("No database configured, using in-memory notification store");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}
