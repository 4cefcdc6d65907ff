//! Room stream handler (GET /sse/{room}).
//!
//! The handler opens the stream session itself, so history has been read
//! and the client registered before response headers go out. The session
//! then runs on the server's task tracker and feeds SSE frames through a
//! bounded channel. Dropping the response body closes that channel and
//! ends the session; server shutdown cancels it.

use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, Sse};
use axum::response::IntoResponse;
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use crate::flow::CLIENT_BUFFER;
use crate::model::Notification;
use crate::notify::stream::{self, StreamFrame};
use crate::server::ServerState;

/// SSE event name for notification frames.
pub const EVENT_NAME: &str = "notification";

#[derive(Debug, Default, Deserialize)]
pub struct StreamQuery {
    pub limit: Option<String>,
}

/// Backfill size for a request. Anything that is not a non-negative
/// integer falls back to `default`. Zero means the whole room.
pub fn resolve_limit(raw: Option<&str>, default: usize) -> usize {
    raw.and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(default)
}

/// Handle GET /sse/{room}.
#[tracing::instrument(skip(state, query))]
pub async fn stream_room(
    State(state): State<Arc<ServerState>>,
    Path(room): Path<String>,
    Query(query): Query<StreamQuery>,
) -> impl IntoResponse {
    let limit = resolve_limit(query.limit.as_deref(), state.history_limit);
    let session = stream::open(&state.service, &room, limit, state.heartbeat).await;
    tracing::debug!(
        client = %session.client_id(),
        backfill = session.backfill_len(),
        "Stream opened"
    );

    let (frames, receiver) = mpsc::channel(CLIENT_BUFFER);
    state
        .tasks
        .spawn(session.run(frames, state.shutdown.child_token()));

    let events = ReceiverStream::new(receiver)
        .filter_map(frame_to_event)
        .map(Ok::<_, Infallible>);

    (
        [("cache-control", "no-cache"), ("x-accel-buffering", "no")],
        Sse::new(events),
    )
}

/// Render a frame as an SSE event: `id`, `event`, `data` for notifications
/// and a `: ping` comment for heartbeats.
pub fn frame_to_event(frame: StreamFrame) -> Option<Event> {
    match frame {
        StreamFrame::Heartbeat => Some(Event::default().comment("ping")),
        StreamFrame::Notification(notification) => notification_event(&notification),
    }
}

fn notification_event(notification: &Notification) -> Option<Event> {
    match serde_json::to_string(notification) {
        Ok(data) => Some(
            Event::default()
                .id(notification.id.to_string())
                .event(EVENT_NAME)
                .data(data),
        ),
        Err(e) => {
            tracing::error!(id = notification.id, error = %e, "Notification encode failed, skipping frame");
            None
        }
    }
}
