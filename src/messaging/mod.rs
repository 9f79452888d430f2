//! Publish/subscribe plumbing for the reservation write path.
//!
//! The gateway sends reservation names to a named destination and the
//! backing service subscribes to the same destination. Delivery is
//! at-least-once: a subscriber can see the same payload more than once and
//! nothing here deduplicates. A broker only forgets a payload once the
//! subscriber acknowledged its [`Delivery`].

use std::sync::Arc;
use anyhow::bail;
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc::Receiver;
use tokio::sync::oneshot;
use crate::config::{BrokerConfig, BrokerKind};

pub mod memory;
#[cfg(feature = "kafka")]
pub mod kafka;

/// Destination shared by the gateway output and the service input.
pub const RESERVATIONS_DESTINATION: &str = "reservations";

/// Dead-letter destination for payloads the service could not persist.
pub fn dead_letter_destination(destination: &str) -> String {
    format!("{}.dlq", destination)
}

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Destination {destination} is closed")]
    Closed { destination: String },
    #[error("Destination {destination} is full")]
    Full { destination: String },
    #[error("Failed to publish to {destination}: {reason}")]
    PublishFailed { destination: String, reason: String },
    #[error("Failed to subscribe to {destination}: {reason}")]
    SubscriptionFailed { destination: String, reason: String },
}

/// A payload handed to a subscriber.
#[derive(Debug)]
pub struct Delivery {
    pub payload: String,
    ack: Option<oneshot::Sender<()>>,
}

impl Delivery {
    /// A delivery the broker does not track after hand-off.
    pub fn new(payload: impl Into<String>) -> Self {
        Self { payload: payload.into(), ack: None }
    }

    /// A delivery the broker keeps pending until [`Delivery::ack`] fires.
    /// Dropping it unacknowledged leaves the payload for redelivery.
    pub fn with_ack(payload: impl Into<String>, ack: oneshot::Sender<()>) -> Self {
        Self { payload: payload.into(), ack: Some(ack) }
    }

    pub fn ack(self) {
        if let Some(ack) = self.ack {
            let _ = ack.send(());
        }
    }
}

#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// Hands `payload` to the broker. Returns once the broker accepted it;
    /// it does not wait for any consumer.
    async fn send(&self, destination: &str, payload: String) -> Result<(), ChannelError>;

    async fn subscribe(&self, destination: &str) -> Result<Receiver<Delivery>, ChannelError>;
}

/// Builds the channel selected by `config` for a service running in its own
/// process. The in-memory broker cannot reach another process, so it is
/// refused here; `standalone` wires it up directly.
pub fn connect(config: &BrokerConfig, consumer_group: &str) -> anyhow::Result<Arc<dyn MessageChannel>> {
    match config.broker {
        BrokerKind::Memory => bail!(
            "The in-memory broker only connects services inside one process, use `standalone` or `--broker kafka`"
        ),
        BrokerKind::Kafka => connect_kafka(config, consumer_group),
    }
}

#[cfg(feature = "kafka")]
fn connect_kafka(config: &BrokerConfig, consumer_group: &str) -> anyhow::Result<Arc<dyn MessageChannel>> {
    Ok(Arc::new(kafka::KafkaChannel::new(
        &config.kafka_brokers,
        consumer_group,
        config.send_timeout(),
        config.channel_capacity,
    )?))
}

#[cfg(not(feature = "kafka"))]
fn connect_kafka(_config: &BrokerConfig, _consumer_group: &str) -> anyhow::Result<Arc<dyn MessageChannel>> {
    Err(anyhow::anyhow!(
        "Kafka broker requested but this binary was built without the `kafka` feature"
    ))
}
