pub mod reservation;
pub mod resources;
