//! Shared setup for daemon integration tests
#![allow(dead_code)]

use std::net::SocketAddr;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use tokio::sync::watch;
use tower::ServiceExt;
use url::Url;

use ::common::testkit::TestDriver;
use knfs_daemon::http_server;
use knfs_daemon::ServiceState;

/// Service state backed by the in-memory fakes.
pub async fn setup_state() -> (ServiceState, TestDriver) {
    let t = TestDriver::new().await;
    let state = ServiceState::new(t.driver.clone(), t.credentials.clone());
    (state, t)
}

pub fn router(state: ServiceState) -> Router {
    http_server::router(state)
}

/// Send one request through the router, returning the status and JSON body.
pub async fn send(
    router: &Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .header("accept", "application/json")
        .body(match body {
            Some(body) => Body::from(body.to_string()),
            None => Body::empty(),
        })
        .unwrap();

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

/// Serve the API on an ephemeral local port until the sender is dropped.
pub async fn serve(state: ServiceState) -> (Url, watch::Sender<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    let (tx, mut rx) = watch::channel(());

    tokio::spawn(async move {
        axum::serve(listener, http_server::router(state))
            .with_graceful_shutdown(async move {
                let _ = rx.changed().await;
            })
            .await
            .unwrap();
    });

    (Url::parse(&format!("http://{}", addr)).unwrap(), tx)
}
