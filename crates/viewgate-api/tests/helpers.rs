//! Shared test helpers for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use futures::{SinkExt, StreamExt};
use http::{Request, StatusCode};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tower::ServiceExt;

use viewgate_api::{AppState, build_app};
use viewgate_core::config::AppConfig;
use viewgate_realtime::QueueEngine;

/// Client side of a queue session.
pub type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Test application context
pub struct TestApp {
    /// The Axum router for making test requests
    pub router: Router,
    /// Engine behind the router, for direct inspection
    pub engine: QueueEngine,
}

impl TestApp {
    /// Create a new test application with default configuration
    pub fn new() -> Self {
        let config = AppConfig::default();
        let engine = QueueEngine::new(config.queue.clone());
        let router = build_app(AppState::new(config, engine.clone()));
        Self { router, engine }
    }

    /// Send a GET request through the router
    pub async fn get(&self, path: &str) -> TestResponse {
        let req = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .expect("Failed to build request");

        let response = self
            .router
            .clone()
            .oneshot(req)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .expect("Failed to read body");

        let body: Value = serde_json::from_slice(&body_bytes).unwrap_or(Value::Null);

        TestResponse { status, body }
    }

    /// Serve the router on an ephemeral local port
    pub async fn spawn(&self) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let addr = listener.local_addr().expect("No local addr");
        let router = self.router.clone();
        tokio::spawn(async move {
            axum::serve(listener, router).await.expect("Server failed");
        });
        addr
    }
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    /// HTTP status code
    pub status: StatusCode,
    /// Parsed JSON body
    pub body: Value,
}

/// Open a queue session for `participant` on `resource`.
pub async fn connect(addr: SocketAddr, resource: &str, participant: &str) -> Client {
    let url = format!("ws://{addr}/queue/{resource}?participant={participant}");
    let (client, _) = connect_async(url).await.expect("WebSocket handshake failed");
    client
}

/// Send a command frame.
pub async fn send(client: &mut Client, frame: &str) {
    client
        .send(Message::Text(frame.into()))
        .await
        .expect("Failed to send frame");
}

/// Read frames until one with the given `type` arrives.
pub async fn expect_type(client: &mut Client, kind: &str) -> Value {
    let wait = async {
        while let Some(msg) = client.next().await {
            let msg = msg.expect("WebSocket read failed");
            if !msg.is_text() {
                continue;
            }
            let value: Value = serde_json::from_str(msg.to_text().expect("Non-text frame"))
                .expect("Frame is not JSON");
            if value["type"] == kind {
                return value;
            }
        }
        panic!("Session closed before a '{kind}' frame arrived");
    };
    tokio::time::timeout(Duration::from_secs(5), wait)
        .await
        .unwrap_or_else(|_| panic!("Timed out waiting for '{kind}'"))
}

/// Wait until the engine reports the expected occupant for `resource`.
pub async fn wait_for_occupant(engine: &QueueEngine, resource: &str, expected: Option<&str>) {
    let resource_id = viewgate_core::types::ResourceId::parse(resource, 128).expect("bad id");
    for _ in 0..100 {
        let status = engine.status(&resource_id);
        if status.current_occupant_id.as_ref().map(|p| p.as_str()) == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("Occupant of {resource} never became {expected:?}");
}
