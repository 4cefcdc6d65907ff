//! Subscription handling for Roomcast client.

use anyhow::{Context, Result};
use std::collections::VecDeque;

use super::sse::{FrameDecoder, SseFrame};
use crate::model::Notification;
use crate::service::subscribe::EVENT_NAME;

/// An item read from a room stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Notification(Notification),
    Heartbeat,
}

/// An open room stream.
///
/// Frames are decoded as body chunks arrive. Unknown event names and
/// unrecognized comments are skipped.
pub struct Subscription {
    response: reqwest::Response,
    decoder: FrameDecoder,
    pending: VecDeque<SseFrame>,
}

impl Subscription {
    pub(crate) fn new(response: reqwest::Response) -> Self {
        Self {
            response,
            decoder: FrameDecoder::new(),
            pending: VecDeque::new(),
        }
    }

    /// Get the next stream event, returning None if the stream ends.
    pub async fn next_event(&mut self) -> Result<Option<StreamEvent>> {
        loop {
            while let Some(frame) = self.pending.pop_front() {
                if let Some(event) = convert(frame)? {
                    return Ok(Some(event));
                }
            }

            match self.response.chunk().await.context("stream read failed")? {
                Some(chunk) => self.pending.extend(self.decoder.push(&chunk)),
                None => return Ok(None),
            }
        }
    }

    /// Get the next notification, skipping heartbeats.
    pub async fn next_notification(&mut self) -> Result<Option<Notification>> {
        while let Some(event) = self.next_event().await? {
            if let StreamEvent::Notification(notification) = event {
                return Ok(Some(notification));
            }
        }
        Ok(None)
    }
}

fn convert(frame: SseFrame) -> Result<Option<StreamEvent>> {
    match frame {
        SseFrame::Comment(text) if text == "ping" => Ok(Some(StreamEvent::Heartbeat)),
        SseFrame::Comment(_) => Ok(None),
        SseFrame::Event { event, data, .. } if event.as_deref() == Some(EVENT_NAME) => {
            let notification = serde_json::from_str(&data).context("invalid notification frame")?;
            Ok(Some(StreamEvent::Notification(notification)))
        }
        SseFrame::Event { event, .. } => {
            tracing::debug!(?event, "Skipping unknown stream event");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_ping_and_unknown() {
        assert_eq!(
            convert(SseFrame::Comment("ping".into())).unwrap(),
            Some(StreamEvent::Heartbeat)
        );
        assert_eq!(convert(SseFrame::Comment("hello".into())).unwrap(), None);
        assert_eq!(
            convert(SseFrame::Event {
                id: None,
                event: Some("presence".into()),
                data: "{}".into(),
            })
            .unwrap(),
            None
        );
    }

    #[test]
    fn test_convert_bad_notification_is_error() {
        let result = convert(SseFrame::Event {
            id: Some("1".into()),
            event: Some("notification".into()),
            data: "{not json".into(),
        });
        assert!(result.is_err());
    }
}
