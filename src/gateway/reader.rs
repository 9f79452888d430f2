use std::sync::Arc;
use std::time::Duration;
use anyhow::Context;
use async_trait::async_trait;
use tracing::debug;
use crate::gateway::registry::{ServiceRegistry, RESERVATION_SERVICE};
use crate::models::reservation::Reservation;
use crate::models::resources::Resources;

/// Client side of the backing service's list endpoint.
#[async_trait]
pub trait ReservationReader: Send + Sync {
    async fn read(&self) -> anyhow::Result<Resources<Reservation>>;
}

pub struct HttpReservationReader {
    client: reqwest::Client,
    registry: Arc<ServiceRegistry>,
}

impl HttpReservationReader {
    pub fn new(registry: Arc<ServiceRegistry>, request_timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .context("Failed to build reservation service client")?;

        Ok(Self { client, registry })
    }
}

#[async_trait]
impl ReservationReader for HttpReservationReader {
    async fn read(&self) -> anyhow::Result<Resources<Reservation>> {
        let url = format!("{}/reservations", self.registry.choose(RESERVATION_SERVICE)?);
        debug!("Reading reservations from {}", url);

        self.client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", url))?
            .error_for_status()
            .with_context(|| format!("Unexpected status from {}", url))?
            .json::<Resources<Reservation>>()
            .await
            .with_context(|| format!("Failed to decode reservations from {}", url))
    }
}
