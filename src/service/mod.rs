use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;
use crate::config::{DeliveryConfig, MessageConfig, SeedConfig, ServiceConfig};
use crate::controller::{self, AppState};
use crate::helpers::shutdown::{shutdown_signal, wait_for_shutdown};
use crate::messaging::{self, dead_letter_destination, MessageChannel};
use crate::repositories::postgres_repo::{self, PostgresConnectionRepo};
use crate::repositories::ReservationRepository;
use crate::service::message::RefreshableMessage;
use crate::service::processor::ReservationProcessor;
use crate::service::seed::{seed_reservations, DEFAULT_SEED_NAMES};

pub mod message;
pub mod processor;
pub mod seed;

pub fn app_state(repository: Arc<dyn ReservationRepository>, message: &MessageConfig) -> AppState {
    AppState {
        repository,
        message: Arc::new(RefreshableMessage::new(message.message.clone(), message.env_file.clone())),
        health_status: Arc::from(message.health_status.as_str()),
    }
}

pub async fn seed(repository: &dyn ReservationRepository, seed: &SeedConfig) -> anyhow::Result<()> {
    if seed.skip_seed {
        info!("Skipping reservation seeding");
        return Ok(());
    }

    match &seed.seed_names {
        Some(names) => seed_reservations(repository, names.as_slice()).await?,
        None => seed_reservations(repository, &DEFAULT_SEED_NAMES[..]).await?,
    };
    Ok(())
}

/// Subscribes to `destination` and runs the processor until shutdown.
pub async fn spawn_processor(
    repository: Arc<dyn ReservationRepository>,
    channel: Arc<dyn MessageChannel>,
    destination: &str,
    delivery: &DeliveryConfig,
    shutdown: watch::Receiver<bool>,
) -> anyhow::Result<JoinHandle<()>> {
    let inbound = channel.subscribe(destination).await?;
    let policy = delivery.policy(dead_letter_destination(destination));
    let processor = Arc::new(ReservationProcessor::new(repository, channel, policy));

    info!("Consuming reservations from: {}", destination);
    Ok(tokio::spawn(processor.run(inbound, shutdown)))
}

pub async fn run(config: ServiceConfig) -> anyhow::Result<()> {
    let pool = postgres_repo::connect(&config.database_url, config.database_pool_size).await?;
    let store = PostgresConnectionRepo::new(pool);
    store.ensure_schema().await?;
    let repository: Arc<dyn ReservationRepository> = Arc::new(store);

    seed(repository.as_ref(), &config.seed).await?;

    let channel = messaging::connect(&config.broker, &config.consumer_group)?;
    let shutdown = shutdown_signal();
    let processor = spawn_processor(
        repository.clone(),
        channel,
        &config.broker.destination,
        &config.delivery,
        shutdown.clone(),
    )
    .await?;

    controller::serve(
        controller::router_endpoints(app_state(repository, &config.message)),
        config.http.socket_addr(config.port),
        &config.http.origin_urls,
        wait_for_shutdown(shutdown),
    )
    .await?;

    processor.await?;
    info!("Reservation service stopped");
    Ok(())
}
