//! Shared test helpers for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
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

use billhub_api::{AppState, build_app};
use billhub_auth::JwtEncoder;
use billhub_auth::JwtVerifier;
use billhub_core::config::AppConfig;
use billhub_core::types::id::UserId;
use billhub_realtime::RealtimeEngine;
use billhub_store::MemoryMessageStore;

/// A client WebSocket.
pub type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Test application context
pub struct TestApp {
    /// The Axum router for making test requests
    pub router: Router,
    /// Engine behind the router
    pub realtime: Arc<RealtimeEngine>,
    /// Message store behind the engine
    pub store: Arc<MemoryMessageStore>,
    /// Application config
    pub config: AppConfig,
    encoder: JwtEncoder,
}

impl TestApp {
    /// Create a new test application
    pub fn new() -> Self {
        let mut config = AppConfig::default();
        config.auth.jwt_secret = "integration-test-secret".to_string();
        config.realtime.typing_timeout_ms = 300;
        Self::with_config(config)
    }

    /// Create a test application from an explicit config
    pub fn with_config(config: AppConfig) -> Self {
        let store = Arc::new(MemoryMessageStore::open());
        let realtime = Arc::new(RealtimeEngine::new(
            config.realtime.clone(),
            Arc::new(JwtVerifier::new(&config.auth)),
            store.clone(),
        ));
        let router = build_app(AppState::new(Arc::new(config.clone()), realtime.clone()));
        let encoder = JwtEncoder::new(&config.auth);

        Self {
            router,
            realtime,
            store,
            config,
            encoder,
        }
    }

    /// A valid access token for `user`
    pub fn token_for(&self, user: UserId) -> String {
        self.encoder
            .access_token(user)
            .expect("Failed to sign test token")
    }

    /// Send a request through the router without binding a socket
    pub async fn request(&self, path: &str, token: Option<&str>) -> TestResponse {
        let mut req = Request::builder().method("GET").uri(path);

        if let Some(token) = token {
            req = req.header("Authorization", format!("Bearer {}", token));
        }

        let req = req.body(Body::empty()).expect("Failed to build request");

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

    /// Bind the router on an ephemeral port and serve it in the background
    pub async fn spawn(&self) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("No local addr");
        let router = self.router.clone();
        tokio::spawn(async move {
            axum::serve(listener, router).await.expect("Server failed");
        });
        addr
    }

    /// Open a WebSocket for `user` against a spawned server
    pub async fn connect(&self, addr: SocketAddr, user: UserId) -> Client {
        let url = format!("ws://{addr}/ws?token={}", self.token_for(user));
        let (client, _) = connect_async(url).await.expect("WebSocket connect failed");
        client
    }

    /// Wait until the engine sees `count` connections
    pub async fn wait_for_connections(&self, count: usize) {
        wait_until(|| self.realtime.registry.connection_count() == count).await;
    }
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    /// HTTP status
    pub status: StatusCode,
    /// Parsed JSON body (Null if not JSON)
    pub body: Value,
}

/// Send `{"event", "data"}` over the socket
pub async fn send_event(client: &mut Client, event: &str, data: Value) {
    let frame = serde_json::json!({ "event": event, "data": data }).to_string();
    client
        .send(Message::Text(frame.into()))
        .await
        .expect("Failed to send frame");
}

/// Next non-ping event, failing after two seconds
pub async fn next_event(client: &mut Client) -> Value {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let frame = client
                .next()
                .await
                .expect("Socket closed")
                .expect("Socket error");
            if let Message::Text(text) = frame {
                let value: Value = serde_json::from_str(text.as_str()).expect("Invalid JSON");
                if value["event"] != "ping" {
                    return value;
                }
            }
        }
    })
    .await
    .expect("Timed out waiting for event")
}

/// Asserts nothing but pings arrive within `wait`
pub async fn expect_silence(client: &mut Client, wait: Duration) {
    let result = tokio::time::timeout(wait, async {
        loop {
            match client.next().await {
                Some(Ok(Message::Text(text))) => {
                    let value: Value = serde_json::from_str(text.as_str()).expect("Invalid JSON");
                    if value["event"] != "ping" {
                        return value;
                    }
                }
                Some(Ok(_)) => {}
                _ => return Value::Null,
            }
        }
    })
    .await;
    if let Ok(value) = result {
        panic!("Expected no events, got {value}");
    }
}

/// Poll `cond` until true, failing after two seconds
pub async fn wait_until(cond: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !cond() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "Condition not met in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
