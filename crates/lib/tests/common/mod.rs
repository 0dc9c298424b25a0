//! Shared harness: start the gateway on a free port and stand up fake upstreams.

#![allow(dead_code)]

use axum::{body::Bytes, extract::State, http::StatusCode, routing::post, Router};
use lib::config::Config;
use lib::gateway;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    listener.local_addr().expect("local_addr").port()
}

/// Config with nothing configured and a free gateway port.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.gateway.port = free_port();
    config.gateway.bind = "127.0.0.1".to_string();
    config
}

/// Spawn the gateway and wait until GET / answers. Returns the base URL.
/// The server task is left running when the test ends.
pub async fn start_gateway(config: Config) -> String {
    let base = format!("http://127.0.0.1:{}", config.gateway.port);
    tokio::spawn(async move {
        let _ = gateway::run_gateway(config).await;
    });

    let client = reqwest::Client::new();
    for _ in 0..100 {
        if let Ok(resp) = client.get(format!("{}/", base)).send().await {
            if resp.status().is_success() {
                return base;
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("gateway at {} did not come up within 5s", base);
}

#[derive(Clone)]
struct FakeState {
    status: StatusCode,
    body: String,
    received: Arc<Mutex<Vec<serde_json::Value>>>,
}

/// A fake upstream that records JSON bodies and answers every POST with a fixed response.
pub struct FakeUpstream {
    pub base: String,
    received: Arc<Mutex<Vec<serde_json::Value>>>,
}

impl FakeUpstream {
    /// Start serving `POST <path>` with the given status and body.
    pub async fn start(path: &str, status: u16, body: impl Into<String>) -> Self {
        let received = Arc::new(Mutex::new(Vec::new()));
        let state = FakeState {
            status: StatusCode::from_u16(status).expect("valid status"),
            body: body.into(),
            received: received.clone(),
        };
        let app = Router::new().route(path, post(record)).with_state(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake upstream");
        let addr = listener.local_addr().expect("local_addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Self {
            base: format!("http://{}", addr),
            received,
        }
    }

    pub fn received(&self) -> Vec<serde_json::Value> {
        self.received.lock().unwrap().clone()
    }

    /// Wait until at least `n` requests arrived (or give up after ~2s).
    pub async fn wait_for(&self, n: usize) -> Vec<serde_json::Value> {
        for _ in 0..40 {
            if self.received.lock().unwrap().len() >= n {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        self.received()
    }
}

async fn record(State(state): State<FakeState>, body: Bytes) -> (StatusCode, String) {
    let value = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    state.received.lock().unwrap().push(value);
    (state.status, state.body.clone())
}
