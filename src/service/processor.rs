use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::Receiver;
use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn};
use crate::helpers::shutdown::wait_for_shutdown;
use crate::messaging::{Delivery, MessageChannel};
use crate::models::reservation::Reservation;
use crate::repositories::ReservationRepository;

/// What happens to a message whose reservation cannot be saved.
#[derive(Clone, Debug)]
pub struct DeliveryPolicy {
    pub max_attempts: usize,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Where payloads go once every attempt failed. `None` drops them.
    pub dead_letter_destination: Option<String>,
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
            dead_letter_destination: None,
        }
    }
}

impl DeliveryPolicy {
    fn backoff(&self, attempt: usize) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1) as u32).unwrap_or(u32::MAX);
        self.initial_backoff.saturating_mul(factor).min(self.max_backoff)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum ProcessOutcome {
    Persisted(Reservation),
    DeadLettered,
    Dropped,
}

/// Consumes reservation names from the inbound destination and persists one
/// reservation per message.
pub struct ReservationProcessor {
    repository: Arc<dyn ReservationRepository>,
    channel: Arc<dyn MessageChannel>,
    policy: DeliveryPolicy,
    workers: usize,
}

impl ReservationProcessor {
    pub fn new(
        repository: Arc<dyn ReservationRepository>,
        channel: Arc<dyn MessageChannel>,
        policy: DeliveryPolicy,
    ) -> Self {
        Self {
            repository,
            channel,
            policy,
            workers: num_cpus::get(),
        }
    }

    /// Caps how many messages are persisted at the same time.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub async fn accept_new_reservation(&self, reservation_name: &str) -> anyhow::Result<Reservation> {
        self.repository
            .save(Reservation::new(reservation_name))
            .await
    }

    /// Persists `payload`, retrying with backoff and dead-lettering once the
    /// policy is exhausted. Never fails: the outcome says where the message went.
    pub async fn process(&self, payload: &str) -> ProcessOutcome {
        let mut attempt = 0;
        let last_error = loop {
            attempt += 1;
            match self.accept_new_reservation(payload).await {
                Ok(reservation) => {
                    debug!("Persisted {}", reservation);
                    return ProcessOutcome::Persisted(reservation);
                }
                Err(e) if attempt < self.policy.max_attempts => {
                    let backoff = self.policy.backoff(attempt);
                    warn!(
                        "Failed to persist reservation: {} (attempt {}/{}) due to: {:#}, retrying in {:?}",
                        payload, attempt, self.policy.max_attempts, e, backoff
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => break e,
            }
        };

        match &self.policy.dead_letter_destination {
            Some(destination) => match self.channel.send(destination, payload.to_string()).await {
                Ok(()) => {
                    warn!(
                        "Dead-lettered reservation: {} to {} after {} attempts, last error: {:#}",
                        payload, destination, attempt, last_error
                    );
                    ProcessOutcome::DeadLettered
                }
                Err(e) => {
                    error!(
                        "Dropping reservation: {}, dead-lettering failed due to: {}, last error: {:#}",
                        payload, e, last_error
                    );
                    ProcessOutcome::Dropped
                }
            },
            None => {
                error!(
                    "Dropping reservation: {} after {} attempts due to: {:#}",
                    payload, attempt, last_error
                );
                ProcessOutcome::Dropped
            }
        }
    }

    /// Processes `inbound` until it closes. Once `shutdown` flips to true the
    /// queue stops taking new deliveries, but everything already buffered is
    /// still processed and acknowledged before this returns.
    pub async fn run(self: Arc<Self>, mut inbound: Receiver<Delivery>, shutdown: watch::Receiver<bool>) {
        let permits = Arc::new(Semaphore::new(self.workers));
        info!("Reservation processor started with {} workers", self.workers);

        let mut draining = false;
        loop {
            let delivery = if draining {
                inbound.recv().await
            } else {
                tokio::select! {
                    delivery = inbound.recv() => delivery,
                    _ = wait_for_shutdown(shutdown.clone()) => {
                        info!("Reservation processor draining buffered messages");
                        inbound.close();
                        draining = true;
                        continue;
                    }
                }
            };
            let Some(delivery) = delivery else {
                break;
            };

            let permit = match permits.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let processor = self.clone();
            tokio::spawn(async move {
                processor.process(&delivery.payload).await;
                delivery.ack();
                drop(permit);
            });
        }

        // Every worker holds a permit, so owning all of them means they finished.
        let _ = permits.acquire_many(self.workers as u32).await;
        info!("Reservation processor stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use anyhow::anyhow;
    use async_trait::async_trait;
    use super::*;
    use crate::messaging::memory::InMemoryBroker;
    use crate::repositories::memory_repo::InMemoryReservationRepo;

    /// Fails the first `failures` saves, then delegates to an in-memory store.
    struct FlakyRepo {
        failures: usize,
        calls: AtomicUsize,
        inner: InMemoryReservationRepo,
    }

    impl FlakyRepo {
        fn new(failures: usize) -> Self {
            Self { failures, calls: AtomicUsize::new(0), inner: InMemoryReservationRepo::new() }
        }
    }

    #[async_trait]
    impl ReservationRepository for FlakyRepo {
        async fn save(&self, reservation: Reservation) -> anyhow::Result<Reservation> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                return Err(anyhow!("connection refused"));
            }
            self.inner.save(reservation).await
        }

        async fn find_all(&self) -> anyhow::Result<Vec<Reservation>> {
            self.inner.find_all().await
        }

        async fn find_by_reservation_name(&self, reservation_name: &str) -> anyhow::Result<Vec<Reservation>> {
            self.inner.find_by_reservation_name(reservation_name).await
        }
    }

    /// Takes `delay` for every save.
    struct SlowRepo {
        delay: Duration,
        inner: InMemoryReservationRepo,
    }

    #[async_trait]
    impl ReservationRepository for SlowRepo {
        async fn save(&self, reservation: Reservation) -> anyhow::Result<Reservation> {
            tokio::time::sleep(self.delay).await;
            self.inner.save(reservation).await
        }

        async fn find_all(&self) -> anyhow::Result<Vec<Reservation>> {
            self.inner.find_all().await
        }

        async fn find_by_reservation_name(&self, reservation_name: &str) -> anyhow::Result<Vec<Reservation>> {
            self.inner.find_by_reservation_name(reservation_name).await
        }
    }

    fn fast_policy(dead_letter_destination: Option<&str>) -> DeliveryPolicy {
        DeliveryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
            dead_letter_destination: dead_letter_destination.map(str::to_string),
        }
    }

    #[test]
    fn backoff_doubles_up_to_cap() {
        let policy = DeliveryPolicy {
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(350),
            ..DeliveryPolicy::default()
        };

        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(350));
        assert_eq!(policy.backoff(64), Duration::from_millis(350));
    }

    #[tokio::test]
    async fn persists_one_reservation_per_message() {
        let repo = Arc::new(InMemoryReservationRepo::new());
        let processor = ReservationProcessor::new(repo.clone(), Arc::new(InMemoryBroker::default()), fast_policy(None));

        let outcome = processor.process("Josh").await;

        let ProcessOutcome::Persisted(reservation) = outcome else {
            panic!("expected reservation to be persisted");
        };
        assert_eq!(reservation.reservation_name, "Josh");
        assert!(reservation.is_persisted());
        assert_eq!(repo.find_all().await.unwrap(), vec![reservation]);
    }

    #[tokio::test]
    async fn retries_transient_store_failures() {
        let repo = Arc::new(FlakyRepo::new(2));
        let processor = ReservationProcessor::new(repo.clone(), Arc::new(InMemoryBroker::default()), fast_policy(None));

        let outcome = processor.process("Yoram").await;

        assert!(matches!(outcome, ProcessOutcome::Persisted(_)));
        assert_eq!(repo.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_go_to_dead_letter_destination() {
        let broker = Arc::new(InMemoryBroker::default());
        let mut dead_letters = broker.subscribe("reservations.dlq").await.unwrap();
        let repo = Arc::new(FlakyRepo::new(usize::MAX));
        let processor = ReservationProcessor::new(repo.clone(), broker, fast_policy(Some("reservations.dlq")));

        let outcome = processor.process("Boris").await;

        assert_eq!(outcome, ProcessOutcome::DeadLettered);
        assert_eq!(repo.calls.load(Ordering::SeqCst), 3);
        assert_eq!(dead_letters.recv().await.map(|delivery| delivery.payload).as_deref(), Some("Boris"));
    }

    #[tokio::test]
    async fn exhausted_retries_without_dead_letters_drop_the_message() {
        let repo = Arc::new(FlakyRepo::new(usize::MAX));
        let processor = ReservationProcessor::new(repo, Arc::new(InMemoryBroker::default()), fast_policy(None));

        assert_eq!(processor.process("Tony").await, ProcessOutcome::Dropped);
    }

    #[tokio::test]
    async fn run_drains_inbound_until_closed() {
        let broker = Arc::new(InMemoryBroker::default());
        let repo = Arc::new(InMemoryReservationRepo::new());
        let inbound = broker.subscribe("reservations").await.unwrap();
        for name in ["Josh", "Ritesh", "Yoram"] {
            broker.send("reservations", name.to_string()).await.unwrap();
        }
        // Closing the queue lets `run` finish once the buffered messages are done.
        drop(broker);

        let processor = Arc::new(
            ReservationProcessor::new(repo.clone(), Arc::new(InMemoryBroker::default()), fast_policy(None))
                .with_workers(2),
        );
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        processor.run(inbound, shutdown_rx).await;

        let mut names: Vec<_> = repo
            .find_all()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.reservation_name)
            .collect();
        names.sort();
        assert_eq!(names, vec!["Josh", "Ritesh", "Yoram"]);
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let broker = InMemoryBroker::default();
        let inbound = broker.subscribe("reservations").await.unwrap();
        let processor = Arc::new(ReservationProcessor::new(
            Arc::new(InMemoryReservationRepo::new()),
            Arc::new(InMemoryBroker::default()),
            fast_policy(None),
        ));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(processor.run(inbound, shutdown_rx));
        shutdown_tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("processor should stop after shutdown")
            .unwrap();
    }

    #[tokio::test]
    async fn shutdown_still_persists_buffered_messages() {
        let broker = Arc::new(InMemoryBroker::default());
        let inbound = broker.subscribe("reservations").await.unwrap();
        for i in 0..10 {
            broker.send("reservations", format!("guest-{}", i)).await.unwrap();
        }
        let repo = Arc::new(SlowRepo { delay: Duration::from_millis(50), inner: InMemoryReservationRepo::new() });
        let processor = Arc::new(
            ReservationProcessor::new(repo.clone(), broker.clone(), fast_policy(None)).with_workers(1),
        );
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(processor.run(inbound, shutdown_rx));
        tokio::time::sleep(Duration::from_millis(10)).await;
        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();

        assert_eq!(repo.find_all().await.unwrap().len(), 10);
        let err = broker.send("reservations", "late".to_string()).await.unwrap_err();
        assert!(matches!(err, crate::messaging::ChannelError::Closed { .. }));
    }

    #[tokio::test]
    async fn deliveries_are_acknowledged_after_persisting() {
        let repo = Arc::new(InMemoryReservationRepo::new());
        let (sender, inbound) = tokio::sync::mpsc::channel(4);
        let (ack, acked) = tokio::sync::oneshot::channel();
        sender.send(Delivery::with_ack("Josh", ack)).await.unwrap();
        drop(sender);

        let observed = {
            let repo = repo.clone();
            tokio::spawn(async move {
                acked.await.unwrap();
                repo.find_all().await.unwrap().len()
            })
        };
        let processor = Arc::new(ReservationProcessor::new(
            repo,
            Arc::new(InMemoryBroker::default()),
            fast_policy(None),
        ));
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        processor.run(inbound, shutdown_rx).await;

        assert_eq!(observed.await.unwrap(), 1);
    }
}
