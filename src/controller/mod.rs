use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use anyhow::Context;
use axum::http::HeaderValue;
use axum::Router;
use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use crate::gateway::aggregator::ReservationNames;
use crate::gateway::publisher::ReservationWriter;
use crate::helpers::handler_404::page_not_found_handler;
use crate::repositories::ReservationRepository;
use crate::service::message::RefreshableMessage;

pub mod gateway_controller;
pub mod health_check;
pub mod message_controller;
pub mod reservation_controller;

/// Shared handles of the backing service's HTTP API.
#[derive(Clone)]
pub struct AppState {
    pub repository: Arc<dyn ReservationRepository>,
    pub message: Arc<RefreshableMessage>,
    pub health_status: Arc<str>,
}

#[derive(Clone)]
pub struct GatewayState {
    pub writer: Arc<ReservationWriter>,
    pub names: Arc<ReservationNames>,
}

pub async fn serve(
    application: Router,
    address: SocketAddr,
    origin_urls: &str,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let origins: Vec<HeaderValue> = origin_urls
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .filter_map(|origin| match origin.parse() {
            Ok(origin) => Some(origin),
            Err(e) => {
                warn!("Ignoring invalid CORS origin: {} due to: {}", origin, e);
                None
            }
        })
        .collect();

    let application = application
        .layer(
            ServiceBuilder::new()
                .layer(
                    CorsLayer::new()
                        .allow_methods([
                            Method::GET,
                            Method::POST,
                            Method::OPTIONS
                        ])
                        .allow_origin(origins)
                        .allow_headers([CONTENT_TYPE])
                )
        );

    info!("API server listening on: {}", address);
    axum::Server::try_bind(&address)
        .with_context(|| format!("Failed to bind API server to {}", address))?
        .serve(application.into_make_service())
        .with_graceful_shutdown(shutdown)
        .await
        .context("Error spinning up the API server")
}

pub fn router_endpoints(app_state: AppState) -> Router {
    health_check::router(app_state.health_status.clone())
        .merge(message_controller::router(app_state.message.clone()))
        .merge(reservation_controller::router(app_state))
        .fallback(page_not_found_handler)
}

pub fn gateway_endpoints(gateway_state: GatewayState) -> Router {
    gateway_controller::router(gateway_state)
        .fallback(page_not_found_handler)
}
