//! AMQP ingestion and publishing.
//!
//! The consumer feeds queued creation requests into the notification
//! service and settles each delivery according to the outcome. The
//! publisher puts creation requests onto the exchange for a consumer
//! (possibly in another process) to pick up. Both have a disabled variant
//! used when no broker URL is configured.

pub mod consumer;
pub mod headers;
pub mod publisher;

pub use consumer::{MessageHandler, QueueConsumer};
pub use publisher::QueuePublisher;

use async_trait::async_trait;
use lapin::acker::Acker;
use lapin::options::{BasicAckOptions, BasicNackOptions, ExchangeDeclareOptions};
use lapin::types::FieldTable;
use lapin::{Channel, ExchangeKind};
use std::fmt;
use thiserror::Error;

/// Broker setup step, for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupStage {
    Connect,
    Channel,
    Qos,
    ExchangeDeclare,
    QueueDeclare,
    QueueBind,
    Consume,
    ConfirmSelect,
}

impl fmt::Display for SetupStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            Self::Connect => "connect",
            Self::Channel => "channel",
            Self::Qos => "qos",
            Self::ExchangeDeclare => "exchange declare",
            Self::QueueDeclare => "queue declare",
            Self::QueueBind => "queue bind",
            Self::Consume => "consume",
            Self::ConfirmSelect => "confirm select",
        };
        f.write_str(stage)
    }
}

/// Error type for queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("amqp {stage}: {source}")]
    Setup {
        stage: SetupStage,
        #[source]
        source: lapin::Error,
    },

    #[error("amqp publish: {0}")]
    Publish(#[source] lapin::Error),

    #[error("broker rejected message for routing key {routing_key}")]
    Nacked { routing_key: String },

    #[error("publish to {routing_key} timed out after {after:?}")]
    PublishTimeout {
        routing_key: String,
        after: std::time::Duration,
    },

    #[error("encode payload: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("settle delivery: {0}")]
    Settle(#[source] lapin::Error),

    #[error("receive delivery: {0}")]
    Delivery(#[source] lapin::Error),

    #[error("amqp deliveries closed")]
    DeliveriesClosed,
}

impl QueueError {
    pub(crate) fn setup(stage: SetupStage) -> impl FnOnce(lapin::Error) -> Self {
        move |source| Self::Setup { stage, source }
    }
}

/// Declare the durable topic exchange both sides agree on.
pub(crate) async fn declare_exchange(channel: &Channel, exchange: &str) -> Result<(), QueueError> {
    channel
        .exchange_declare(
            exchange,
            ExchangeKind::Topic,
            ExchangeDeclareOptions {
                durable: true,
                ..ExchangeDeclareOptions::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(QueueError::setup(SetupStage::ExchangeDeclare))
}

/// How a delivery is settled with the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Processed; remove from the queue.
    Ack,
    /// Can never be processed; remove from the queue without retry.
    Reject,
    /// Transient failure; return to the queue for redelivery.
    Requeue,
}

impl Disposition {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ack => "ack",
            Self::Reject => "reject",
            Self::Requeue => "requeue",
        }
    }
}

/// Settlement handle for one delivery.
#[async_trait]
pub trait Acknowledger: Send + Sync {
    async fn ack(&self) -> Result<(), lapin::Error>;
    async fn nack(&self, requeue: bool) -> Result<(), lapin::Error>;
}

#[async_trait]
impl Acknowledger for Acker {
    async fn ack(&self) -> Result<(), lapin::Error> {
        Acker::ack(self, BasicAckOptions::default()).await
    }

    async fn nack(&self, requeue: bool) -> Result<(), lapin::Error> {
        Acker::nack(
            self,
            BasicNackOptions {
                requeue,
                ..BasicNackOptions::default()
            },
        )
        .await
    }
}
