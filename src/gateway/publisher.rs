use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use crate::messaging::{ChannelError, MessageChannel};
use crate::models::reservation::Reservation;

#[derive(Error, Debug)]
pub enum WriteError {
    #[error("Reservation name must not be empty")]
    EmptyName,
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

/// Publishes reservation names to the output destination. Fire-and-forget:
/// success means the broker took the message, not that it was persisted.
pub struct ReservationWriter {
    channel: Arc<dyn MessageChannel>,
    destination: String,
}

impl ReservationWriter {
    pub fn new(channel: Arc<dyn MessageChannel>, destination: impl Into<String>) -> Self {
        Self {
            channel,
            destination: destination.into(),
        }
    }

    pub async fn write(&self, reservation: &Reservation) -> Result<(), WriteError> {
        if reservation.reservation_name.trim().is_empty() {
            return Err(WriteError::EmptyName);
        }

        self.channel
            .send(&self.destination, reservation.reservation_name.clone())
            .await?;

        debug!("Published reservation: {} to {}", reservation.reservation_name, self.destination);
        Ok(())
    }
}
