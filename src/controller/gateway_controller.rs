use std::sync::Arc;
use axum::{Extension, Json, Router};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use serde_json::json;
use tracing::warn;
use crate::controller::GatewayState;
use crate::gateway::aggregator::ReservationNames;
use crate::gateway::publisher::{ReservationWriter, WriteError};
use crate::models::reservation::Reservation;

pub fn router(gateway_state: GatewayState) -> Router {
    Router::new()
        .route("/reservations", post(write_reservation))
        .route("/reservations/names", get(get_reservation_names))
        .route("/health", get(get_gateway_health))
        .route_layer(Extension(gateway_state.writer))
        .route_layer(Extension(gateway_state.names))
}

pub async fn write_reservation(
    Extension(writer): Extension<Arc<ReservationWriter>>,
    Json(body): Json<Reservation>,
) -> impl IntoResponse {
    return match writer.write(&body).await {
        Ok(_) => StatusCode::OK.into_response(),
        Err(WriteError::EmptyName) => {
            (StatusCode::BAD_REQUEST, "Reservation name must not be empty.").into_response()
        }
        Err(e) => {
            warn!("Something went wrong publishing reservation: {} due to: {}", body.reservation_name, e);
            (StatusCode::SERVICE_UNAVAILABLE, "Failed to accept reservation, please try again.").into_response()
        }
    };
}

/// Never fails: an unreachable reservation service reads as no names.
pub async fn get_reservation_names(
    Extension(names): Extension<Arc<ReservationNames>>,
) -> impl IntoResponse {
    Json(names.names().await)
}

pub async fn get_gateway_health(
    Extension(names): Extension<Arc<ReservationNames>>,
) -> impl IntoResponse {
    let breaker = names.breaker_state();
    Json(json!({ "status": "UP", "breaker": breaker.to_string() }))
}
