use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use crate::config::{BreakerConfig, GatewayConfig};
use crate::controller::{self, GatewayState};
use crate::gateway::aggregator::ReservationNames;
use crate::gateway::circuit_breaker::CircuitBreaker;
use crate::gateway::publisher::ReservationWriter;
use crate::gateway::reader::HttpReservationReader;
use crate::gateway::registry::{ServiceRegistry, RESERVATION_SERVICE};
use crate::helpers::shutdown::{shutdown_signal, wait_for_shutdown};
use crate::messaging::{self, MessageChannel};

pub mod aggregator;
pub mod circuit_breaker;
pub mod publisher;
pub mod reader;
pub mod registry;

pub const CONSUMER_GROUP: &str = "reservation-client";

pub fn gateway_state(
    channel: Arc<dyn MessageChannel>,
    destination: &str,
    reservation_service_urls: &[String],
    breaker: &BreakerConfig,
) -> anyhow::Result<GatewayState> {
    let registry = Arc::new(
        ServiceRegistry::new().register(RESERVATION_SERVICE, reservation_service_urls.iter().cloned()),
    );
    // The aggregator enforces the overall deadline, the client timeout only
    // keeps abandoned connections from lingering.
    let reader = HttpReservationReader::new(registry, breaker.read_timeout() + Duration::from_secs(1))?;

    Ok(GatewayState {
        writer: Arc::new(ReservationWriter::new(channel, destination)),
        names: Arc::new(ReservationNames::new(
            Arc::new(reader),
            CircuitBreaker::new(breaker.circuit_breaker()),
            breaker.read_timeout(),
        )),
    })
}

pub async fn run(config: GatewayConfig) -> anyhow::Result<()> {
    let channel = messaging::connect(&config.broker, CONSUMER_GROUP)?;
    let state = gateway_state(
        channel,
        &config.broker.destination,
        &config.reservation_service_urls,
        &config.breaker,
    )?;
    info!("Routing {} to: {:?}", RESERVATION_SERVICE, config.reservation_service_urls);

    controller::serve(
        controller::gateway_endpoints(state),
        config.http.socket_addr(config.port),
        &config.http.origin_urls,
        wait_for_shutdown(shutdown_signal()),
    )
    .await?;

    info!("Gateway stopped");
    Ok(())
}
