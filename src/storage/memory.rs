//! In-memory notification store.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::{Mutex, PoisonError};

use super::{NotificationRepository, StoreError};
use crate::model::{stored_precision, NewNotification, Notification};

/// Append-only vector guarded by a mutex. Ids start at 1.
#[derive(Debug)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Debug)]
struct Inner {
    next_id: i64,
    records: Vec<Notification>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_id: 1,
                records: Vec::new(),
            }),
        }
    }

    /// Number of stored notifications across all rooms.
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .records
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationRepository for MemoryStore {
    async fn create(&self, notification: NewNotification) -> Result<Notification, StoreError> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let created = Notification {
            id: inner.next_id,
            room: notification.room,
            kind: notification.kind,
            title: notification.title,
            body: notification.body,
            created_at: stored_precision(notification.created_at.unwrap_or_else(Utc::now)),
        };
        inner.next_id += 1;
        inner.records.push(created.clone());
        Ok(created)
    }

    async fn list(&self, room: &str, limit: usize) -> Result<Vec<Notification>, StoreError> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let matching = inner.records.iter().rev().filter(|n| n.room == room);
        let history = if limit > 0 {
            matching.take(limit).cloned().collect()
        } else {
            matching.cloned().collect()
        };
        Ok(history)
    }
}
