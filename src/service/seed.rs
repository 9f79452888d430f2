use tracing::info;
use crate::models::reservation::Reservation;
use crate::repositories::ReservationRepository;

pub const DEFAULT_SEED_NAMES: [&str; 8] = [
    "Josh", "Ritesh", "Yoram", "Boris", "Tony", "Joe", "Gsaravanan", "Ian",
];

/// Saves one reservation per name into an empty store, then logs the full
/// store contents. A store that already holds reservations is left as is, so
/// restarting against a persistent store does not duplicate the seed.
pub async fn seed_reservations<S: AsRef<str>>(
    repository: &dyn ReservationRepository,
    names: &[S],
) -> anyhow::Result<Vec<Reservation>> {
    let existing = repository.find_all().await?;
    if !existing.is_empty() {
        info!("Store already holds {} reservations, skipping seed", existing.len());
        return Ok(Vec::new());
    }

    let mut seeded = Vec::with_capacity(names.len());
    for name in names {
        seeded.push(repository.save(Reservation::new(name.as_ref())).await?);
    }

    for reservation in repository.find_all().await? {
        info!("{}", reservation);
    }

    Ok(seeded)
}
