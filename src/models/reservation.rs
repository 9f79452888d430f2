use std::fmt;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

#[skip_serializing_none]
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    /// Assigned by the store, absent until the reservation is persisted.
    #[serde(default)]
    pub id: Option<i64>,
    pub reservation_name: String,
}

impl Reservation {
    pub fn new(reservation_name: impl Into<String>) -> Self {
        Self {
            id: None,
            reservation_name: reservation_name.into(),
        }
    }

    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }
}

impl fmt::Display for Reservation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id {
            Some(id) => write!(
                f,
                "Reservation{{id={}, reservationName='{}'}}",
                id, self.reservation_name
            ),
            None => write!(
                f,
                "Reservation{{id=null, reservationName='{}'}}",
                self.reservation_name
            ),
        }
    }
}
