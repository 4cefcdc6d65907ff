//! Backfill-then-subscribe hand-off for live room streams.
//!
//! [`open`] reads the room's recent history and then registers a client with
//! the hub. [`StreamSession::run`] emits that history oldest first, then
//! forwards live notifications and idle heartbeats until the sink closes or
//! the stream is cancelled.
//!
//! History is read before the client is registered. A notification created
//! between the read and the registration reaching the hub is in neither the
//! backfill nor the live feed of this stream. Nothing deduplicates across
//! the boundary, so a notification is never emitted twice.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::NotificationService;
use crate::flow::{Client, ClientId, Hub};
use crate::model::Notification;

/// One unit of stream output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFrame {
    Notification(Notification),
    Heartbeat,
}

/// Keeps a client registered for as long as it lives.
#[derive(Debug)]
struct Registration {
    hub: Hub,
    client: Client,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.hub.unregister(&self.client);
    }
}

/// An opened stream: backfill slice plus a live registration.
#[derive(Debug)]
pub struct StreamSession {
    backfill: Vec<Notification>,
    receiver: mpsc::Receiver<Notification>,
    registration: Registration,
    heartbeat: Duration,
}

/// Read history for `room` and register a live client.
///
/// `limit` caps the backfill (0 = whole room). A failed history read is
/// logged and the stream continues live-only.
#[tracing::instrument(skip(service, heartbeat))]
pub async fn open(
    service: &NotificationService,
    room: &str,
    limit: usize,
    heartbeat: Duration,
) -> StreamSession {
    let backfill = match service.list_history(room, limit).await {
        Ok(history) => history,
        Err(e) => {
            tracing::warn!(error = %e, "History read failed, streaming live only");
            Vec::new()
        }
    };

    let (client, receiver) = Client::new(room);
    service.hub().register(client.clone());
    tracing::debug!(client = %client.id(), backfill = backfill.len(), "Stream opened");

    StreamSession {
        backfill,
        receiver,
        registration: Registration {
            hub: service.hub().clone(),
            client,
        },
        heartbeat,
    }
}

impl StreamSession {
    pub fn client_id(&self) -> ClientId {
        self.registration.client.id()
    }

    pub fn room(&self) -> &str {
        self.registration.client.room()
    }

    /// Number of history entries that will be emitted before live traffic.
    pub fn backfill_len(&self) -> usize {
        self.backfill.len()
    }

    /// Drive the stream into `sink`.
    ///
    /// Returns when `cancel` fires or the sink's receiver is dropped. The
    /// client is unregistered on return.
    pub async fn run(self, sink: mpsc::Sender<StreamFrame>, cancel: CancellationToken) {
        let StreamSession {
            backfill,
            mut receiver,
            registration,
            heartbeat,
        } = self;
        let client = registration.client.id();

        // Store order is newest first.
        for notification in backfill.into_iter().rev() {
            if !emit(&sink, StreamFrame::Notification(notification), &cancel).await {
                tracing::debug!(%client, "Stream ended during backfill");
                return;
            }
        }

        let mut ticker = interval_at(Instant::now() + heartbeat, heartbeat);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let frame = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = sink.closed() => break,
                notification = receiver.recv() => match notification {
                    Some(notification) => StreamFrame::Notification(notification),
                    None => break,
                },
                _ = ticker.tick() => StreamFrame::Heartbeat,
            };
            if !emit(&sink, frame, &cancel).await {
                break;
            }
        }

        tracing::debug!(%client, "Stream closed");
        drop(registration);
    }
}

/// Send one frame, giving up if the stream is cancelled while waiting.
async fn emit(
    sink: &mpsc::Sender<StreamFrame>,
    frame: StreamFrame,
    cancel: &CancellationToken,
) -> bool {
    tokio::select! {
        biased;
        () = cancel.cancelled() => false,
        sent = sink.send(frame) => sent.is_ok(),
    }
}
