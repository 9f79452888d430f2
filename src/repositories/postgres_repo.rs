use anyhow::{anyhow, Context};
use async_trait::async_trait;
use bb8_postgres::bb8::{Pool, PooledConnection};
use bb8_postgres::PostgresConnectionManager;
use bb8_postgres::tokio_postgres::{NoTls, Row};
use tracing::{info, warn};
use crate::models::reservation::Reservation;
use crate::repositories::ReservationRepository;

pub const RETRY_LIMIT: usize = 5;

pub type PostgresPool = Pool<PostgresConnectionManager<NoTls>>;

const CREATE_SCHEMA: &str = "\
    CREATE TABLE IF NOT EXISTS reservation (\
        id BIGSERIAL PRIMARY KEY, \
        reservation_name TEXT NOT NULL\
    ); \
    CREATE INDEX IF NOT EXISTS reservation_name_idx ON reservation (reservation_name);";

pub struct PostgresConnectionRepo {
    postgres_connection: PostgresPool,
}

/// Builds the connection pool for `database_url`. Connections are opened
/// lazily, so an unreachable database only shows up on first checkout.
pub async fn connect(database_url: &str, max_size: u32) -> anyhow::Result<PostgresPool> {
    let manager = PostgresConnectionManager::new_from_stringlike(database_url, NoTls)
        .context("Invalid postgres connection string")?;

    Pool::builder()
        .max_size(max_size)
        .build(manager)
        .await
        .context("Failed to build postgres connection pool")
}

impl PostgresConnectionRepo {
    pub fn new(
        postgres_connection: PostgresPool,
    ) -> Self {
        Self {
            postgres_connection
        }
    }

    async fn get_postgres_connection(
        &self,
    ) -> anyhow::Result<PooledConnection<'_, PostgresConnectionManager<NoTls>>> {
        for _ in 0..RETRY_LIMIT {
            match self.postgres_connection.get().await {
                Ok(conn) => return Ok(conn),
                Err(e) => {
                    warn!("Failed to retrieve postgres connection due to: {}, retrying in 3s", e);
                    tokio::time::sleep(tokio::time::Duration::from_secs(3)).await;
                    continue;
                }
            }
        }

        Err(anyhow!("Failed to retrieve a valid connection from postgres pool, BAILING"))
    }

    pub async fn ensure_schema(&self) -> anyhow::Result<()> {
        let conn = self.get_postgres_connection().await?;
        conn.batch_execute(CREATE_SCHEMA)
            .await
            .context("Failed to create reservation table")?;

        info!("Reservation table is ready");
        Ok(())
    }
}

#[async_trait]
impl ReservationRepository for PostgresConnectionRepo {
    async fn save(&self, reservation: Reservation) -> anyhow::Result<Reservation> {
        let conn = self.get_postgres_connection().await?;
        let row = conn
            .query_one(
                "INSERT INTO reservation (reservation_name) VALUES ($1) RETURNING id, reservation_name;",
                &[&reservation.reservation_name],
            )
            .await
            .map_err(|e| {
                warn!("Failed to insert reservation: {}, due to: {}", reservation.reservation_name, e);
                e
            })
            .context("Failed to insert reservation")?;

        Ok(parse_row_into_reservation(row))
    }

    async fn find_all(&self) -> anyhow::Result<Vec<Reservation>> {
        let conn = self.get_postgres_connection().await?;
        let rows = conn
            .query("SELECT id, reservation_name FROM reservation ORDER BY id;", &[])
            .await
            .context("Failed to retrieve reservations")?;

        Ok(rows.into_iter().map(parse_row_into_reservation).collect())
    }

    async fn find_by_reservation_name(&self, reservation_name: &str) -> anyhow::Result<Vec<Reservation>> {
        let conn = self.get_postgres_connection().await?;
        let rows = conn
            .query(
                "SELECT id, reservation_name FROM reservation WHERE reservation_name = $1 ORDER BY id;",
                &[&reservation_name],
            )
            .await
            .with_context(|| format!("Failed to retrieve reservations named: {}", reservation_name))?;

        Ok(rows.into_iter().map(parse_row_into_reservation).collect())
    }
}

fn parse_row_into_reservation(
    row: Row,
) -> Reservation {
    Reservation {
        id: Some(row.get::<&str, i64>("id")),
        reservation_name: row.get("reservation_name"),
    }
}
