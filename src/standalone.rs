//! Both services in one process, sharing an in-memory store and broker.

use std::sync::Arc;
use tracing::info;
use crate::config::StandaloneConfig;
use crate::controller;
use crate::gateway;
use crate::helpers::shutdown::{shutdown_signal, wait_for_shutdown};
use crate::messaging::memory::InMemoryBroker;
use crate::messaging::MessageChannel;
use crate::repositories::memory_repo::InMemoryReservationRepo;
use crate::repositories::ReservationRepository;
use crate::service;

pub async fn run(config: StandaloneConfig) -> anyhow::Result<()> {
    let repository: Arc<dyn ReservationRepository> = Arc::new(InMemoryReservationRepo::new());
    let channel: Arc<dyn MessageChannel> = Arc::new(InMemoryBroker::new(config.channel_capacity));
    service::seed(repository.as_ref(), &config.seed).await?;

    let shutdown = shutdown_signal();
    let processor = service::spawn_processor(
        repository.clone(),
        channel.clone(),
        &config.destination,
        &config.delivery,
        shutdown.clone(),
    )
    .await?;

    let service_url = format!("http://127.0.0.1:{}", config.service_port);
    let gateway_state = gateway::gateway_state(
        channel,
        &config.destination,
        &[service_url],
        &config.breaker,
    )?;

    futures::try_join!(
        controller::serve(
            controller::router_endpoints(service::app_state(repository, &config.message)),
            config.http.socket_addr(config.service_port),
            &config.http.origin_urls,
            wait_for_shutdown(shutdown.clone()),
        ),
        controller::serve(
            controller::gateway_endpoints(gateway_state),
            config.http.socket_addr(config.gateway_port),
            &config.http.origin_urls,
            wait_for_shutdown(shutdown),
        ),
    )?;

    processor.await?;
    info!("Standalone reservations stopped");
    Ok(())
}
