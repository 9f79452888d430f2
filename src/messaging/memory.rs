use std::collections::HashMap;
use std::sync::Mutex;
use async_trait::async_trait;
use tokio::sync::mpsc::{self, error::TrySendError, Receiver, Sender};
use tracing::debug;
use crate::messaging::{ChannelError, Delivery, MessageChannel};

pub const DEFAULT_CAPACITY: usize = 1024;

struct Queue {
    sender: Sender<Delivery>,
    receiver: Option<Receiver<Delivery>>,
}

/// Process-local broker with queue semantics: each destination is a bounded
/// queue with a single subscriber. Payloads sent before anyone subscribes are
/// buffered up to the capacity. Nothing is tracked after hand-off, so
/// deliveries carry no acknowledgement.
pub struct InMemoryBroker {
    capacity: usize,
    queues: Mutex<HashMap<String, Queue>>,
}

impl InMemoryBroker {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            queues: Mutex::new(HashMap::new()),
        }
    }

    fn with_queue<T>(&self, destination: &str, f: impl FnOnce(&mut Queue) -> T) -> T {
        let mut queues = self.queues.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let queue = queues.entry(destination.to_string()).or_insert_with(|| {
            let (sender, receiver) = mpsc::channel(self.capacity);
            Queue { sender, receiver: Some(receiver) }
        });
        f(queue)
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[async_trait]
impl MessageChannel for InMemoryBroker {
    async fn send(&self, destination: &str, payload: String) -> Result<(), ChannelError> {
        let sender = self.with_queue(destination, |queue| queue.sender.clone());

        match sender.try_send(Delivery::new(payload)) {
            Ok(()) => {
                debug!("Queued message on destination: {}", destination);
                Ok(())
            }
            Err(TrySendError::Full(_)) => Err(ChannelError::Full {
                destination: destination.to_string(),
            }),
            Err(TrySendError::Closed(_)) => Err(ChannelError::Closed {
                destination: destination.to_string(),
            }),
        }
    }

    async fn subscribe(&self, destination: &str) -> Result<Receiver<Delivery>, ChannelError> {
        self.with_queue(destination, |queue| queue.receiver.take())
            .ok_or_else(|| ChannelError::SubscriptionFailed {
                destination: destination.to_string(),
                reason: "destination already has a subscriber".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn next_payload(inbound: &mut Receiver<Delivery>) -> Option<String> {
        inbound.recv().await.map(|delivery| delivery.payload)
    }

    #[tokio::test]
    async fn buffers_messages_sent_before_subscription() {
        let broker = InMemoryBroker::default();
        broker.send("reservations", "Josh".into()).await.unwrap();
        broker.send("reservations", "Ritesh".into()).await.unwrap();

        let mut inbound = broker.subscribe("reservations").await.unwrap();
        assert_eq!(next_payload(&mut inbound).await.as_deref(), Some("Josh"));
        assert_eq!(next_payload(&mut inbound).await.as_deref(), Some("Ritesh"));
    }

    #[tokio::test]
    async fn destinations_are_isolated() {
        let broker = InMemoryBroker::default();
        broker.send("reservations.dlq", "Boris".into()).await.unwrap();

        let mut inbound = broker.subscribe("reservations").await.unwrap();
        assert!(inbound.try_recv().is_err());
    }

    #[tokio::test]
    async fn full_queue_rejects_without_blocking() {
        let broker = InMemoryBroker::new(1);
        broker.send("reservations", "Josh".into()).await.unwrap();

        let err = broker.send("reservations", "Yoram".into()).await.unwrap_err();
        assert!(matches!(err, ChannelError::Full { .. }));
    }

    #[tokio::test]
    async fn dropped_subscriber_closes_destination() {
        let broker = InMemoryBroker::default();
        drop(broker.subscribe("reservations").await.unwrap());

        let err = broker.send("reservations", "Tony".into()).await.unwrap_err();
        assert!(matches!(err, ChannelError::Closed { .. }));
    }

    #[tokio::test]
    async fn second_subscription_is_refused() {
        let broker = InMemoryBroker::default();
        let _first = broker.subscribe("reservations").await.unwrap();

        let err = broker.subscribe("reservations").await.unwrap_err();
        assert!(matches!(err, ChannelError::SubscriptionFailed { .. }));
    }
}
