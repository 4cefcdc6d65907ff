//! Test doubles for the repository contract.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use super::{MemoryStore, NotificationRepository, StoreError};
use crate::model::{NewNotification, Notification};

/// Memory store that counts calls and can be told to fail or stall writes.
#[derive(Debug, Default)]
pub struct RecordingStore {
    inner: MemoryStore,
    creates: AtomicUsize,
    lists: AtomicUsize,
    fail_writes: AtomicBool,
    write_delay: Option<Duration>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let store = Self::default();
        store.fail_writes.store(true, Ordering::SeqCst);
        store
    }

    pub fn stalling(delay: Duration) -> Self {
        Self {
            write_delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn create_calls(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.lists.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NotificationRepository for RecordingStore {
    async fn create(&self, notification: NewNotification) -> Result<Notification, StoreError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.write_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store failed".into()));
        }
        self.inner.create(notification).await
    }

    async fn list(&self, room: &str, limit: usize) -> Result<Vec<Notification>, StoreError> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        self.inner.list(room, limit).await
    }
}
