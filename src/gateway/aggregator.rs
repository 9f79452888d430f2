use std::sync::Arc;
use std::time::Duration;
use anyhow::anyhow;
use crate::gateway::circuit_breaker::{CircuitBreaker, State};
use crate::gateway::reader::ReservationReader;

/// Reads reservations from the backing service and keeps only their names.
/// Failures, timeouts and an open circuit all degrade to an empty list.
pub struct ReservationNames {
    reader: Arc<dyn ReservationReader>,
    breaker: CircuitBreaker,
    read_timeout: Duration,
}

impl ReservationNames {
    pub fn new(reader: Arc<dyn ReservationReader>, breaker: CircuitBreaker, read_timeout: Duration) -> Self {
        Self {
            reader,
            breaker,
            read_timeout,
        }
    }

    pub async fn names(&self) -> Vec<String> {
        self.breaker
            .call_with_fallback(
                || async {
                    let resources = tokio::time::timeout(self.read_timeout, self.reader.read())
                        .await
                        .map_err(|_| anyhow!("Reading reservations timed out after {:?}", self.read_timeout))??;

                    Ok::<_, anyhow::Error>(
                        resources
                            .into_content()
                            .into_iter()
                            .map(|reservation| reservation.reservation_name)
                            .collect::<Vec<_>>(),
                    )
                },
                Vec::new,
            )
            .await
    }

    pub fn breaker_state(&self) -> State {
        self.breaker.state()
    }
}
