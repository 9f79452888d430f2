use async_trait::async_trait;
use crate::models::reservation::Reservation;

pub mod memory_repo;
pub mod postgres_repo;

/// Data access for persisted reservations. Implementations assign ids on
/// `save` and never modify a reservation afterwards.
#[async_trait]
pub trait ReservationRepository: Send + Sync {
    async fn save(&self, reservation: Reservation) -> anyhow::Result<Reservation>;

    /// All reservations in store order (ascending id).
    async fn find_all(&self) -> anyhow::Result<Vec<Reservation>>;

    /// Exact, case-sensitive match on the reservation name.
    async fn find_by_reservation_name(&self, reservation_name: &str) -> anyhow::Result<Vec<Reservation>>;
}
