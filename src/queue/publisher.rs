//! AMQP publisher for asynchronous notification submission.
//!
//! One connection and confirm-mode channel are opened on first use and
//! shared by concurrent publishes. A publish that fails for any reason
//! discards them; the next publish reconnects. Each publish is bounded by a
//! timeout and nothing is retried or buffered within a call. The current
//! trace context travels in the message headers.

use lapin::options::{BasicPublishOptions, ConfirmSelectOptions};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::{declare_exchange, headers, QueueError, SetupStage};
use crate::config::Config;
use crate::model::{NewNotification, NotificationKind};
use crate::observability::metrics::record_queue_publish;

/// Routing key prefix used when none is configured.
pub const DEFAULT_PREFIX: &str = "notification";

/// AMQP persistent delivery mode.
const PERSISTENT: u8 = 2;

/// Upper bound on one publish, from connecting through the broker confirm.
pub const PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

/// Routing key for a notification type: `<prefix>.<type>`.
pub fn routing_key(prefix: &str, kind: NotificationKind) -> String {
    let prefix = if prefix.is_empty() { DEFAULT_PREFIX } else { prefix };
    format!("{prefix}.{kind}")
}

#[derive(Serialize)]
struct WirePayload<'a> {
    room: &'a str,
    #[serde(rename = "type")]
    kind: NotificationKind,
    title: &'a str,
    body: &'a str,
}

/// Encode the queue wire body: room, type, title and body only.
pub fn encode_payload(request: &NewNotification) -> Result<Vec<u8>, QueueError> {
    let payload = WirePayload {
        room: &request.room,
        kind: request.kind,
        title: &request.title,
        body: &request.body,
    };
    Ok(serde_json::to_vec(&payload)?)
}

/// Broker settings for the publishing side.
#[derive(Debug, Clone)]
pub struct PublisherSettings {
    pub url: String,
    pub exchange: String,
    pub prefix: String,
}

impl PublisherSettings {
    /// `None` when no broker URL is configured.
    pub fn from_config(config: &Config) -> Option<Self> {
        let url = config.amqp_url.as_deref().filter(|url| !url.is_empty())?;
        Some(Self {
            url: url.to_string(),
            exchange: config.exchange.clone(),
            prefix: config.publish_prefix.clone(),
        })
    }
}

/// Outbound publishing, either connected to a broker or switched off.
pub enum QueuePublisher {
    /// No broker configured. Every publish reports success.
    Disabled,
    Active(AmqpPublisher),
}

impl QueuePublisher {
    pub fn from_config(config: &Config) -> Self {
        match PublisherSettings::from_config(config) {
            Some(settings) => Self::Active(AmqpPublisher::new(settings)),
            None => Self::Disabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Active(_))
    }

    /// Publish a creation request under `<prefix>.<type>`.
    pub async fn publish(&self, request: &NewNotification) -> Result<(), QueueError> {
        match self {
            Self::Disabled => {
                tracing::debug!(room = %request.room, "No broker configured, publish skipped");
                Ok(())
            }
            Self::Active(publisher) => publisher.publish(request).await,
        }
    }
}

/// Publisher holding a lazily opened broker link.
pub struct AmqpPublisher {
    settings: PublisherSettings,
    publish_timeout: Duration,
    link: Mutex<Option<Link>>,
    opened: AtomicU64,
}

impl AmqpPublisher {
    pub fn new(settings: PublisherSettings) -> Self {
        Self {
            settings,
            publish_timeout: PUBLISH_TIMEOUT,
            link: Mutex::new(None),
            opened: AtomicU64::new(0),
        }
    }

    pub fn with_publish_timeout(mut self, publish_timeout: Duration) -> Self {
        self.publish_timeout = publish_timeout;
        self
    }

    #[tracing::instrument(
        name = "rabbitmq.publish",
        skip_all,
        fields(
            messaging.system = "rabbitmq",
            messaging.destination = %self.settings.exchange,
            messaging.destination_kind = "exchange",
            messaging.rabbitmq.routing_key,
        )
    )]
    async fn publish(&self, request: &NewNotification) -> Result<(), QueueError> {
        let routing_key = routing_key(&self.settings.prefix, request.kind);
        tracing::Span::current().record("messaging.rabbitmq.routing_key", routing_key.as_str());

        let payload = encode_payload(request)?;
        let result = tokio::time::timeout(self.publish_timeout, self.send(&routing_key, &payload))
            .await
            .unwrap_or_else(|_| {
                Err(QueueError::PublishTimeout {
                    routing_key: routing_key.clone(),
                    after: self.publish_timeout,
                })
            });

        match &result {
            Ok(()) => {
                record_queue_publish("ok");
                tracing::debug!(room = %request.room, "Notification published");
            }
            Err(e) => {
                record_queue_publish("error");
                tracing::error!(room = %request.room, title = %request.title, error = %e, "Publish failed");
            }
        }
        result
    }

    async fn send(&self, routing_key: &str, payload: &[u8]) -> Result<(), QueueError> {
        let lease = self.lease().await?;
        let result = publish_on(&lease.channel, &self.settings.exchange, routing_key, payload).await;
        if result.is_err() {
            self.discard(lease.generation).await;
        }
        result
    }

    /// A channel to publish on: the cached one when usable, otherwise a
    /// freshly opened link. The lock is never held across a broker round
    /// trip, so concurrent publishes proceed independently.
    async fn lease(&self) -> Result<Lease, QueueError> {
        if let Some(lease) = self.cached() {
            return Ok(lease);
        }

        let generation = self.opened.fetch_add(1, Ordering::Relaxed) + 1;
        let link = Link::open(&self.settings, generation).await?;

        // Another publish may have installed a link while this one opened.
        let (lease, surplus) = {
            let mut slot = self.slot();
            match slot.as_ref().filter(|cached| cached.is_usable()).map(Link::lease) {
                Some(lease) => (lease, Some(link)),
                None => (link.lease(), slot.replace(link)),
            }
        };
        if let Some(surplus) = surplus {
            surplus.close().await;
        }
        Ok(lease)
    }

    fn cached(&self) -> Option<Lease> {
        self.slot()
            .as_ref()
            .filter(|cached| cached.is_usable())
            .map(Link::lease)
    }

    /// Drop the cached link if it is the one that just failed.
    async fn discard(&self, generation: u64) {
        let stale = {
            let mut slot = self.slot();
            if slot.as_ref().is_some_and(|cached| cached.generation == generation) {
                slot.take()
            } else {
                None
            }
        };
        if let Some(stale) = stale {
            stale.close().await;
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<Link>> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A channel borrowed from a link, tagged with the link it came from.
struct Lease {
    channel: Channel,
    generation: u64,
}

/// A connection plus a confirm-mode channel with the exchange declared.
struct Link {
    connection: Connection,
    channel: Channel,
    generation: u64,
}

impl Link {
    async fn open(settings: &PublisherSettings, generation: u64) -> Result<Self, QueueError> {
        let connection = Connection::connect(&settings.url, ConnectionProperties::default())
            .await
            .map_err(QueueError::setup(SetupStage::Connect))?;
        let channel = connection
            .create_channel()
            .await
            .map_err(QueueError::setup(SetupStage::Channel))?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(QueueError::setup(SetupStage::ConfirmSelect))?;
        declare_exchange(&channel, &settings.exchange).await?;

        tracing::debug!(exchange = %settings.exchange, generation, "Publisher link opened");
        Ok(Self {
            connection,
            channel,
            generation,
        })
    }

    fn is_usable(&self) -> bool {
        self.connection.status().connected() && self.channel.status().connected()
    }

    fn lease(&self) -> Lease {
        Lease {
            channel: self.channel.clone(),
            generation: self.generation,
        }
    }

    async fn close(self) {
        if let Err(e) = self.connection.close(200, "publisher reset").await {
            tracing::debug!(error = %e, "Closing publisher connection failed");
        }
    }
}

/// Publish one persistent JSON message carrying the current trace context,
/// and wait for the broker's confirm.
async fn publish_on(
    channel: &Channel,
    exchange: &str,
    routing_key: &str,
    payload: &[u8],
) -> Result<(), QueueError> {
    let mut trace_headers = FieldTable::default();
    headers::inject_current(&mut trace_headers);

    let properties = BasicProperties::default()
        .with_content_type("application/json".into())
        .with_delivery_mode(PERSISTENT)
        .with_headers(trace_headers);

    let confirmation = channel
        .basic_publish(
            exchange,
            routing_key,
            BasicPublishOptions::default(),
            payload,
            properties,
        )
        .await
        .map_err(QueueError::Publish)?
        .await
        .map_err(QueueError::Publish)?;

    if confirmation.is_nack() {
        return Err(QueueError::Nacked {
            routing_key: routing_key.to_string(),
        });
    }
    Ok(())
}
