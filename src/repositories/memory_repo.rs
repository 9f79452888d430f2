use std::sync::atomic::{AtomicI64, Ordering};
use async_trait::async_trait;
use tokio::sync::RwLock;
use crate::models::reservation::Reservation;
use crate::repositories::ReservationRepository;

pub struct InMemoryReservationRepo {
    reservations: RwLock<Vec<Reservation>>,
    sequence: AtomicI64,
}

impl InMemoryReservationRepo {
    pub fn new() -> Self {
        Self {
            reservations: RwLock::new(Vec::new()),
            sequence: AtomicI64::new(1),
        }
    }
}

impl Default for InMemoryReservationRepo {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReservationRepository for InMemoryReservationRepo {
    async fn save(&self, mut reservation: Reservation) -> anyhow::Result<Reservation> {
        // Every save is a new row, a caller supplied id is replaced.
        reservation.id = Some(self.sequence.fetch_add(1, Ordering::SeqCst));

        let mut reservations = self.reservations.write().await;
        // Keep ascending id order even when concurrent saves race for the lock.
        let position = reservations
            .partition_point(|existing| existing.id < reservation.id);
        reservations.insert(position, reservation.clone());

        Ok(reservation)
    }

    async fn find_all(&self) -> anyhow::Result<Vec<Reservation>> {
        Ok(self.reservations.read().await.clone())
    }

    async fn find_by_reservation_name(&self, reservation_name: &str) -> anyhow::Result<Vec<Reservation>> {
        Ok(self
            .reservations
            .read()
            .await
            .iter()
            .filter(|reservation| reservation.reservation_name == reservation_name)
            .cloned()
            .collect())
    }
}
