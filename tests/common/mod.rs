#![allow(dead_code)]

use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tokio::sync::watch;
use tower::ServiceExt;
use reservations::config::{BreakerConfig, DeliveryConfig, MessageConfig, DEFAULT_HEALTH_STATUS};
use reservations::controller;
use reservations::gateway;
use reservations::messaging::memory::InMemoryBroker;
use reservations::messaging::MessageChannel;
use reservations::repositories::memory_repo::InMemoryReservationRepo;
use reservations::service;
use reservations::service::seed::seed_reservations;

pub const DESTINATION: &str = "reservations";

pub fn message_config() -> MessageConfig {
    MessageConfig {
        message: "Hello".to_string(),
        env_file: None,
        health_status: DEFAULT_HEALTH_STATUS.to_string(),
    }
}

pub fn delivery_config() -> DeliveryConfig {
    DeliveryConfig {
        max_attempts: 3,
        initial_backoff_ms: 1,
        max_backoff_ms: 10,
        disable_dead_letters: false,
    }
}

pub fn breaker_config(failure_threshold: usize) -> BreakerConfig {
    BreakerConfig {
        read_timeout_ms: 500,
        failure_threshold,
        open_timeout_secs: 60,
        success_threshold: 1,
    }
}

/// Serves `router` on an ephemeral loopback port.
pub fn spawn_server(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::Server::from_tcp(listener)
            .unwrap()
            .serve(router.into_make_service())
            .await
            .unwrap();
    });
    address
}

/// An address nothing listens on.
pub fn closed_address() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

pub fn backing_router(repository: Arc<InMemoryReservationRepo>) -> Router {
    controller::router_endpoints(service::app_state(repository, &message_config()))
}

pub fn gateway_router(channel: Arc<dyn MessageChannel>, service_url: String, failure_threshold: usize) -> Router {
    let state = gateway::gateway_state(
        channel,
        DESTINATION,
        &[service_url],
        &breaker_config(failure_threshold),
    )
    .unwrap();
    controller::gateway_endpoints(state)
}

/// Gateway, broker, processor and backing service wired together in-process.
pub struct Stack {
    pub gateway: Router,
    pub repository: Arc<InMemoryReservationRepo>,
    _shutdown: watch::Sender<bool>,
}

pub async fn stack(seed: &[&str]) -> Stack {
    let repository = Arc::new(InMemoryReservationRepo::new());
    seed_reservations(repository.as_ref(), seed).await.unwrap();

    let channel: Arc<dyn MessageChannel> = Arc::new(InMemoryBroker::default());
    let (shutdown, shutdown_rx) = watch::channel(false);
    service::spawn_processor(
        repository.clone(),
        channel.clone(),
        DESTINATION,
        &delivery_config(),
        shutdown_rx,
    )
    .await
    .unwrap();

    let address = spawn_server(backing_router(repository.clone()));
    let gateway = gateway_router(channel, format!("http://{}", address), 5);

    Stack { gateway, repository, _shutdown: shutdown }
}

pub async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    send_owned(router.clone(), request).await
}

// `Router` is not `Sync`, so futures that must be `Send` (e.g. spawned ones)
// clone it up front instead of holding a `&Router` across an await.
async fn send_owned(router: Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
    (status, body.to_vec())
}

pub async fn get(router: &Router, uri: &str) -> (StatusCode, Vec<u8>) {
    send(router, Request::builder().uri(uri).body(Body::empty()).unwrap()).await
}

pub async fn get_json(router: &Router, uri: &str) -> (StatusCode, Value) {
    let (status, body) = get(router, uri).await;
    (status, serde_json::from_slice(&body).unwrap())
}

pub fn post_json(
    router: &Router,
    uri: &str,
    body: Value,
) -> impl std::future::Future<Output = (StatusCode, Vec<u8>)> + Send + 'static {
    let router = router.clone();
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send_owned(router, request)
}

pub async fn names(router: &Router) -> Vec<String> {
    let (status, body) = get(router, "/reservations/names").await;
    assert_eq!(status, StatusCode::OK);
    serde_json::from_slice(&body).unwrap()
}
