use std::sync::Arc;
use axum::{Extension, Json, Router};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use tracing::warn;
use crate::service::message::RefreshableMessage;

pub fn router(message: Arc<RefreshableMessage>) -> Router {
    Router::new()
        .route("/message", get(get_message))
        .route("/refresh", post(refresh_message))
        .route_layer(Extension(message))
}

pub async fn get_message(
    Extension(message): Extension<Arc<RefreshableMessage>>,
) -> impl IntoResponse {
    message.current()
}

/// Re-reads the env file and answers with the keys that changed.
pub async fn refresh_message(
    Extension(message): Extension<Arc<RefreshableMessage>>,
) -> impl IntoResponse {
    return match message.refresh() {
        Ok(true) => (StatusCode::OK, Json(vec!["message"])).into_response(),
        Ok(false) => (StatusCode::OK, Json(Vec::<&str>::new())).into_response(),
        Err(e) => {
            warn!("Something went wrong refreshing the message due to: {:#}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to refresh configuration.").into_response()
        }
    };
}
