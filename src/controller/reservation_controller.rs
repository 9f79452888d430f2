use std::sync::Arc;
use axum::{Extension, Json, Router};
use axum::extract::Query;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use serde::{Deserialize, Serialize};
use tracing::warn;
use crate::controller::AppState;
use crate::models::resources::Resources;
use crate::repositories::ReservationRepository;

pub fn router(app_state: AppState) -> Router {
    Router::new()
        .route("/reservations", get(get_all_reservations))
        .route("/reservations/search/by-name", get(find_reservations_by_name))
        .route_layer(Extension(app_state.repository))
}

pub async fn get_all_reservations(
    Extension(repository): Extension<Arc<dyn ReservationRepository>>,
) -> impl IntoResponse {
    return match repository.find_all().await {
        Ok(reservations) => {
            (StatusCode::OK, Json(Resources::new(reservations, "/reservations"))).into_response()
        }
        Err(e) => {
            warn!("Something went wrong retrieving reservations due to: {:#}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to retrieve reservations, please try again.").into_response()
        }
    };
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ReservationNameQuery {
    pub rn: String,
}

pub async fn find_reservations_by_name(
    Extension(repository): Extension<Arc<dyn ReservationRepository>>,
    Query(query): Query<ReservationNameQuery>,
) -> impl IntoResponse {
    let self_href = match serde_urlencoded::to_string(&query) {
        Ok(encoded) => format!("/reservations/search/by-name?{}", encoded),
        Err(e) => {
            warn!("Failed to encode reservation name query: {} due to: {}", query.rn, e);
            return (StatusCode::BAD_REQUEST, "Invalid reservation name.").into_response();
        }
    };

    return match repository.find_by_reservation_name(&query.rn).await {
        Ok(reservations) => {
            (StatusCode::OK, Json(Resources::new(reservations, self_href))).into_response()
        }
        Err(e) => {
            warn!("Something went wrong retrieving reservations named: {} due to: {:#}", query.rn, e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to retrieve reservations, please try again.").into_response()
        }
    };
}
