//! Kafka-compatible broker client (Kafka, Redpanda, MSK, ...).
//!
//! Offsets are committed manually, in consumption order, once the subscriber
//! acknowledged every delivery up to that offset. Anything not acknowledged
//! when the process stops is redelivered to the consumer group.

use std::time::Duration;
use async_trait::async_trait;
use futures::stream::FuturesOrdered;
use futures::StreamExt;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use rdkafka::{Offset, TopicPartitionList};
use tokio::sync::mpsc::{self, Receiver};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};
use crate::messaging::{ChannelError, Delivery, MessageChannel};

pub struct KafkaChannel {
    producer: FutureProducer,
    brokers: String,
    consumer_group: String,
    send_timeout: Duration,
    buffer_size: usize,
}

impl KafkaChannel {
    pub fn new(
        brokers: &str,
        consumer_group: &str,
        send_timeout: Duration,
        buffer_size: usize,
    ) -> Result<Self, ChannelError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", send_timeout.as_millis().to_string())
            .set("acks", "1")
            .create()
            .map_err(|e| ChannelError::PublishFailed {
                destination: brokers.to_string(),
                reason: format!("Failed to create producer: {}", e),
            })?;

        info!("Kafka channel created for brokers: {}, consumer group: {}", brokers, consumer_group);

        Ok(Self {
            producer,
            brokers: brokers.to_string(),
            consumer_group: consumer_group.to_string(),
            send_timeout,
            buffer_size: buffer_size.max(1),
        })
    }
}

#[async_trait]
impl MessageChannel for KafkaChannel {
    async fn send(&self, destination: &str, payload: String) -> Result<(), ChannelError> {
        let record: FutureRecord<'_, (), str> = FutureRecord::to(destination).payload(payload.as_str());

        match self.producer.send(record, Timeout::After(self.send_timeout)).await {
            Ok((partition, offset)) => {
                debug!("Published to {} at partition: {}, offset: {}", destination, partition, offset);
                Ok(())
            }
            Err((e, _)) => {
                warn!("Failed to publish to {} due to: {}", destination, e);
                Err(ChannelError::PublishFailed {
                    destination: destination.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn subscribe(&self, destination: &str) -> Result<Receiver<Delivery>, ChannelError> {
        let subscription_error = |reason: String| ChannelError::SubscriptionFailed {
            destination: destination.to_string(),
            reason,
        };

        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", &self.consumer_group)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "6000")
            .set("enable.partition.eof", "false")
            .create()
            .map_err(|e| subscription_error(format!("Failed to create consumer: {}", e)))?;

        consumer
            .subscribe(&[destination])
            .map_err(|e| subscription_error(e.to_string()))?;

        info!("Subscribed to {} as consumer group: {}", destination, self.consumer_group);

        let (sender, receiver) = mpsc::channel(self.buffer_size);
        let destination = destination.to_string();
        tokio::spawn(async move {
            let mut stream = consumer.stream();
            // Acks resolve in consumption order, so committing as they come
            // never moves an offset past an unacknowledged delivery.
            let mut pending = FuturesOrdered::new();
            let mut accepting = true;

            while accepting || !pending.is_empty() {
                tokio::select! {
                    next = stream.next(), if accepting => {
                        let message = match next {
                            Some(Ok(message)) => message,
                            Some(Err(e)) => {
                                warn!("Failed to receive from {} due to: {}", destination, e);
                                continue;
                            }
                            None => {
                                accepting = false;
                                continue;
                            }
                        };

                        let (ack, acked) = oneshot::channel();
                        match message.payload_view::<str>() {
                            Some(Ok(payload)) => {
                                if sender.send(Delivery::with_ack(payload, ack)).await.is_err() {
                                    debug!("Subscriber for {} closed, stopping consumer", destination);
                                    accepting = false;
                                    continue;
                                }
                            }
                            Some(Err(e)) => {
                                error!("Discarding non UTF-8 payload on {} due to: {}", destination, e);
                                let _ = ack.send(());
                            }
                            None => {
                                warn!("Discarding empty message on {}", destination);
                                let _ = ack.send(());
                            }
                        }

                        let (partition, offset) = (message.partition(), message.offset());
                        pending.push_back(async move { (partition, offset, acked.await.is_ok()) });
                    }
                    Some((partition, offset, acked)) = pending.next(), if !pending.is_empty() => {
                        if !acked {
                            warn!(
                                "Delivery at partition: {}, offset: {} on {} was never acknowledged, \
                                 leaving it and everything after it for redelivery",
                                partition, offset, destination
                            );
                            break;
                        }

                        let mut offsets = TopicPartitionList::new();
                        let committed = offsets
                            .add_partition_offset(&destination, partition, Offset::Offset(offset + 1))
                            .and_then(|_| consumer.commit(&offsets, CommitMode::Async));
                        if let Err(e) = committed {
                            warn!(
                                "Failed to commit offset {} on {}, message may be redelivered: {}",
                                offset, destination, e
                            );
                        }
                    }
                }
            }
            debug!("Consumer for {} stopped", destination);
        });

        Ok(receiver)
    }
}
