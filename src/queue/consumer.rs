//! AMQP consumer feeding the notification service.
//!
//! Settlement rules:
//! - Undecodable body, missing fields or an unknown type: acknowledged and
//!   dropped. Redelivering them would fail the same way forever.
//! - Store failure or create timeout: negatively acknowledged with requeue.
//! - Success: acknowledged.
//!
//! A failed ack ends the consume loop. A failed nack is logged and the loop
//! keeps going; the broker redelivers unsettled messages when the channel
//! closes anyway.
//!
//! Each delivery is handled inside a `rabbitmq.handle_message` span whose
//! parent is the trace context found in the message headers.

use futures::{Stream, StreamExt};
use lapin::acker::Acker;
use lapin::message::Delivery;
use lapin::options::{
    BasicConsumeOptions, BasicQosOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{Connection, ConnectionProperties};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::{declare_exchange, headers, Acknowledger, Disposition, QueueError, SetupStage};
use crate::config::Config;
use crate::model::NotificationPayload;
use crate::notify::{NotificationService, ServiceError};
use crate::observability::metrics::record_queue_message;

/// Upper bound on a single create call made on behalf of a delivery.
pub const CREATE_TIMEOUT: Duration = Duration::from_secs(5);

/// Unacknowledged deliveries the broker may push ahead of processing.
pub const PREFETCH: u16 = 10;

/// Broker topology for the consuming side.
#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    pub url: String,
    pub exchange: String,
    pub queue: String,
    pub routing_key: String,
    pub consumer_tag: String,
}

impl ConsumerSettings {
    /// `None` when no broker URL is configured.
    pub fn from_config(config: &Config) -> Option<Self> {
        let url = config.amqp_url.as_deref().filter(|url| !url.is_empty())?;
        Some(Self {
            url: url.to_string(),
            exchange: config.exchange.clone(),
            queue: config.queue.clone(),
            routing_key: config.routing_key.clone(),
            consumer_tag: config.consumer_tag.clone(),
        })
    }
}

/// Sink for settlement outcomes (`ack`, `reject`, `requeue`).
pub type OutcomeRecorder = fn(&'static str);

/// Turns one delivery body into a create call and a settlement decision.
#[derive(Clone)]
pub struct MessageHandler {
    service: NotificationService,
    create_timeout: Duration,
    record_outcome: OutcomeRecorder,
}

impl MessageHandler {
    pub fn new(service: NotificationService) -> Self {
        Self {
            service,
            create_timeout: CREATE_TIMEOUT,
            record_outcome: record_queue_message,
        }
    }

    pub fn with_create_timeout(mut self, create_timeout: Duration) -> Self {
        self.create_timeout = create_timeout;
        self
    }

    pub fn with_outcome_recorder(mut self, record_outcome: OutcomeRecorder) -> Self {
        self.record_outcome = record_outcome;
        self
    }

    /// Decide how a delivery body should be settled.
    ///
    /// Returns `None` when `cancel` fires before the outcome is known; the
    /// delivery is then left unsettled.
    pub async fn process(&self, body: &[u8], cancel: &CancellationToken) -> Option<Disposition> {
        let payload: NotificationPayload = match serde_json::from_slice(body) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(error = %e, "Queue message is not valid JSON, discarding");
                return Some(Disposition::Reject);
            }
        };

        if payload.check_required().is_err() {
            tracing::warn!(
                room = %payload.room,
                kind = %payload.kind,
                title = %payload.title,
                "Queue message missing required fields, discarding"
            );
            return Some(Disposition::Reject);
        }

        let create = tokio::time::timeout(self.create_timeout, self.service.create(payload));
        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => return None,
            outcome = create => outcome,
        };

        let disposition = match outcome {
            Ok(Ok(created)) => {
                tracing::debug!(id = created.id, room = %created.room, "Queue message stored");
                Disposition::Ack
            }
            Ok(Err(ServiceError::Validation(e))) => {
                tracing::warn!(error = %e, "Queue message rejected, discarding");
                Disposition::Reject
            }
            Ok(Err(ServiceError::Store(e))) => {
                tracing::error!(error = %e, "Queue message create failed, requeueing");
                Disposition::Requeue
            }
            Err(_) => {
                tracing::error!(
                    timeout_ms = self.create_timeout.as_millis() as u64,
                    "Queue message create timed out, requeueing"
                );
                Disposition::Requeue
            }
        };
        Some(disposition)
    }

    /// Process a delivery and settle it through `acker`.
    ///
    /// The outcome is counted before settling, so a failed ack is still
    /// recorded.
    pub async fn handle_delivery(
        &self,
        body: &[u8],
        acker: &dyn Acknowledger,
        cancel: &CancellationToken,
    ) -> Result<(), QueueError> {
        let Some(disposition) = self.process(body, cancel).await else {
            tracing::debug!("Consumer cancelled mid-message, leaving delivery unsettled");
            return Ok(());
        };
        (self.record_outcome)(disposition.as_str());

        match disposition {
            Disposition::Ack | Disposition::Reject => {
                acker.ack().await.map_err(QueueError::Settle)?;
            }
            Disposition::Requeue => {
                if let Err(e) = acker.nack(true).await {
                    tracing::error!(error = %e, "Nack failed");
                }
            }
        }
        Ok(())
    }
}

/// A delivery reduced to what the handler needs.
#[derive(Debug)]
pub struct InboundMessage<A> {
    pub body: Vec<u8>,
    pub routing_key: String,
    pub headers: Option<FieldTable>,
    pub acker: A,
}

impl From<Delivery> for InboundMessage<Acker> {
    fn from(delivery: Delivery) -> Self {
        let headers = delivery.properties.headers().clone();
        let routing_key = delivery.routing_key.as_str().to_string();
        Self {
            body: delivery.data,
            routing_key,
            headers,
            acker: delivery.acker,
        }
    }
}

/// Feed `messages` to `handler` one at a time.
///
/// Returns `Ok` when `cancel` fires. A delivery error, the end of the stream
/// or a failed ack is returned as an error and ends consumption.
pub async fn consume<S, A>(
    handler: &MessageHandler,
    exchange: &str,
    mut messages: S,
    cancel: &CancellationToken,
) -> Result<(), QueueError>
where
    S: Stream<Item = Result<InboundMessage<A>, lapin::Error>> + Unpin,
    A: Acknowledger,
{
    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(()),
            next = messages.next() => next,
        };
        let message = match next {
            Some(Ok(message)) => message,
            Some(Err(e)) => return Err(QueueError::Delivery(e)),
            None => return Err(QueueError::DeliveriesClosed),
        };

        let span = tracing::info_span!(
            "rabbitmq.handle_message",
            messaging.system = "rabbitmq",
            messaging.destination = %exchange,
            messaging.destination_kind = "exchange",
            messaging.rabbitmq.routing_key = %message.routing_key,
        );
        headers::link_parent(&span, message.headers.as_ref());

        handler
            .handle_delivery(&message.body, &message.acker, cancel)
            .instrument(span)
            .await?;
    }
}

/// Queue ingestion, either connected to a broker or switched off.
pub enum QueueConsumer {
    /// No broker configured. Waits for cancellation and returns.
    Disabled,
    Active(AmqpConsumer),
}

impl QueueConsumer {
    pub fn from_config(config: &Config, service: NotificationService) -> Self {
        match ConsumerSettings::from_config(config) {
            Some(settings) => Self::Active(AmqpConsumer::new(settings, MessageHandler::new(service))),
            None => Self::Disabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Active(_))
    }

    /// Run until `cancel` fires. Setup failures and a lost delivery stream
    /// are returned as errors.
    pub async fn start(self, cancel: CancellationToken) -> Result<(), QueueError> {
        match self {
            Self::Disabled => {
                tracing::info!("No broker configured, queue consumer disabled");
                cancel.cancelled().await;
                Ok(())
            }
            Self::Active(consumer) => consumer.run(cancel).await,
        }
    }
}

/// Consumer bound to a live broker connection.
pub struct AmqpConsumer {
    settings: ConsumerSettings,
    handler: MessageHandler,
}

impl AmqpConsumer {
    pub fn new(settings: ConsumerSettings, handler: MessageHandler) -> Self {
        Self { settings, handler }
    }

    #[tracing::instrument(
        name = "rabbitmq.consume_loop",
        skip_all,
        fields(
            messaging.system = "rabbitmq",
            messaging.destination = %self.settings.exchange,
            messaging.destination_kind = "exchange",
            messaging.rabbitmq.routing_key = %self.settings.routing_key,
            queue = %self.settings.queue,
        )
    )]
    async fn run(self, cancel: CancellationToken) -> Result<(), QueueError> {
        let (connection, deliveries) = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(()),
            setup = self.connect() => setup?,
        };

        tracing::info!(prefetch = PREFETCH, "Queue consumer started");

        let messages = deliveries.map(|delivery| delivery.map(InboundMessage::<Acker>::from));
        let result = consume(&self.handler, &self.settings.exchange, messages, &cancel).await;

        if let Err(e) = connection.close(200, "consumer stopped").await {
            tracing::debug!(error = %e, "Closing consumer connection failed");
        }
        tracing::info!("Queue consumer stopped");
        result
    }

    /// Connect and set up the topology, returning the delivery stream.
    async fn connect(&self) -> Result<(Connection, lapin::Consumer), QueueError> {
        let settings = &self.settings;
        let connection = Connection::connect(&settings.url, ConnectionProperties::default())
            .await
            .map_err(QueueError::setup(SetupStage::Connect))?;
        let channel = connection
            .create_channel()
            .await
            .map_err(QueueError::setup(SetupStage::Channel))?;

        channel
            .basic_qos(PREFETCH, BasicQosOptions::default())
            .await
            .map_err(QueueError::setup(SetupStage::Qos))?;

        declare_exchange(&channel, &settings.exchange).await?;

        let queue = channel
            .queue_declare(
                &settings.queue,
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(QueueError::setup(SetupStage::QueueDeclare))?;

        channel
            .queue_bind(
                queue.name().as_str(),
                &settings.exchange,
                &settings.routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(QueueError::setup(SetupStage::QueueBind))?;

        let deliveries = channel
            .basic_consume(
                queue.name().as_str(),
                &settings.consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(QueueError::setup(SetupStage::Consume))?;

        Ok((connection, deliveries))
    }
}
