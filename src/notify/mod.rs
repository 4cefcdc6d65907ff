//! Notification service: the only path that writes notifications.
//!
//! A create validates the request, writes it through the repository and only
//! then hands the persisted record to the hub. History reads go straight to
//! the repository.

pub mod stream;

use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

use crate::flow::Hub;
use crate::model::{Notification, NotificationPayload, ValidationError};
use crate::observability::metrics::record_notification_created;
use crate::storage::{NotificationRepository, StoreError};

/// Error type for notification service operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The request can never succeed as sent.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The repository failed; the same request may succeed later.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Validates, persists and broadcasts notifications.
#[derive(Clone)]
pub struct NotificationService {
    store: Arc<dyn NotificationRepository>,
    hub: Hub,
}

impl NotificationService {
    pub fn new(store: Arc<dyn NotificationRepository>, hub: Hub) -> Self {
        Self { store, hub }
    }

    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    /// Create a notification and broadcast it to the room's live clients.
    ///
    /// Validation failures return before the repository is touched. Store
    /// failures are returned unchanged and nothing is broadcast.
    #[tracing::instrument(skip(self, payload), fields(room = %payload.room, kind = %payload.kind))]
    pub async fn create(&self, payload: NotificationPayload) -> Result<Notification, ServiceError> {
        let start = Instant::now();
        let request = payload.validate()?;
        let title = request.title.clone();

        let created = self.store.create(request).await.map_err(|e| {
            tracing::error!(title = %title, error = %e, "Store create notification failed");
            e
        })?;

        record_notification_created(created.kind.as_str(), start.elapsed().as_secs_f64());
        tracing::debug!(id = created.id, "Notification created");

        self.hub.broadcast(created.clone());
        Ok(created)
    }

    /// Room history newest first, at most `limit` entries (0 = all).
    pub async fn list_history(
        &self,
        room: &str,
        limit: usize,
    ) -> Result<Vec<Notification>, ServiceError> {
        self.store.list(room, limit).await.map_err(|e| {
            tracing::error!(room, limit, error = %e, "Store list notifications failed");
            ServiceError::Store(e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::{Client, HubStats};
    use crate::model::NotificationKind;
    use crate::storage::testing::RecordingStore;
    use crate::storage::MemoryStore;
    use tokio::sync::mpsc::error::TryRecvError;
    use tokio_util::sync::CancellationToken;

    fn service_with(store: Arc<dyn NotificationRepository>) -> (NotificationService, CancellationToken) {
        let (hub, hub_loop) = Hub::new();
        let cancel = CancellationToken::new();
        tokio::spawn(hub_loop.run(cancel.clone()));
        (NotificationService::new(store, hub), cancel)
    }

    #[tokio::test]
    async fn test_create_persists_then_broadcasts() {
        let (service, _cancel) = service_with(Arc::new(MemoryStore::new()));
        let (client, mut rx) = Client::new("room-1");
        service.hub().register(client);

        let created = service
            .create(NotificationPayload::new("room-1", "info", "hello", "world"))
            .await
            .unwrap();
        assert_eq!(created.id, 1);
        assert_eq!(created.kind, NotificationKind::Info);

        let delivered = rx.recv().await.unwrap();
        assert_eq!(delivered, created);
    }

    #[tokio::test]
    async fn test_invalid_type_skips_store_and_hub() {
        let store = Arc::new(RecordingStore::new());
        let (service, _cancel) = service_with(store.clone());
        let (client, mut rx) = Client::new("room-1");
        service.hub().register(client);

        let err = service
            .create(NotificationPayload::new("room-1", "bad", "t", "b"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ServiceError::Validation(ValidationError::InvalidType(ref t)) if t == "bad"
        ));
        assert_eq!(store.create_calls(), 0);
        assert_eq!(
            service.hub().stats().await,
            Some(HubStats { rooms: 1, clients: 1 })
        );
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
    }

    #[tokio::test]
    async fn test_store_failure_propagates_without_broadcast() {
        let store = Arc::new(RecordingStore::failing());
        let (service, _cancel) = service_with(store.clone());
        let (client, mut rx) = Client::new("room-1");
        service.hub().register(client);

        let err = service
            .create(NotificationPayload::new("room-1", "warning", "t", "b"))
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::Store(StoreError::Unavailable(_))));
        assert_eq!(store.create_calls(), 1);
        service.hub().stats().await.unwrap();
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
    }

    #[tokio::test]
    async fn test_ids_strictly_increase() {
        let (service, _cancel) = service_with(Arc::new(MemoryStore::new()));
        let mut last = 0;
        for i in 0..5 {
            let created = service
                .create(NotificationPayload::new(
                    format!("room-{}", i % 2),
                    "system",
                    "t",
                    "b",
                ))
                .await
                .unwrap();
            assert!(created.id > last);
            last = created.id;
        }
    }

    #[tokio::test]
    async fn test_list_history_limit_semantics() {
        let (service, _cancel) = service_with(Arc::new(MemoryStore::new()));
        for title in ["a", "b", "c"] {
            service
                .create(NotificationPayload::new("room-1", "info", title, "b"))
                .await
                .unwrap();
        }

        let limited = service.list_history("room-1", 2).await.unwrap();
        let titles: Vec<_> = limited.iter().map(|n| n.title.as_str()).collect();
        assert_eq!(titles, ["c", "b"]);

        let all = service.list_history("room-1", 0).await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].id > w[1].id));
    }
}
