use std::sync::Arc;
use axum::{Extension, Json, Router};
use axum::response::IntoResponse;
use axum::routing::get;
use serde_json::json;

#[derive(Clone)]
struct HealthStatus(Arc<str>);

pub fn router(status: Arc<str>) -> Router {
    Router::new()
        .route("/health", get(get_health_check))
        .route_layer(Extension(HealthStatus(status)))
}

/// Static status, the service reports the same value for as long as it runs.
async fn get_health_check(
    Extension(HealthStatus(status)): Extension<HealthStatus>,
) -> impl IntoResponse {
    Json(json!({ "status": &*status }))
}
