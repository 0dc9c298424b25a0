//! Gateway HTTP server: chat dispatch, webhook callback, poll, and lead notification.

use crate::callback;
use crate::config::{self, Config};
use crate::dispatch::{ChatRequest, Dispatcher};
use crate::error::RelayError;
use crate::gateway::protocol::{Ack, ChatResponse, ErrorBody, SessionQuery};
use crate::lead::Lead;
use crate::pending::{InMemoryPendingStore, PendingReplyStore};
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// Shared state for the gateway (config, dispatcher, pending replies).
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<Config>,
    pub dispatcher: Arc<Dispatcher>,
    /// Replies delivered by the webhook callback, waiting for the client's poll.
    pub store: Arc<dyn PendingReplyStore>,
}

impl GatewayState {
    /// Build clients from config and an in-memory store with the configured TTL.
    pub fn from_config(config: Config) -> Self {
        let dispatcher = Dispatcher::from_config(&config);
        let store = InMemoryPendingStore::new(Duration::from_secs(config.relay.pending_ttl_secs));
        Self::new(config, dispatcher, Arc::new(store))
    }

    pub fn new(config: Config, dispatcher: Dispatcher, store: Arc<dyn PendingReplyStore>) -> Self {
        Self {
            config: Arc::new(config),
            dispatcher: Arc::new(dispatcher),
            store,
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

/// Routes served by the gateway.
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/", get(health_http))
        .route("/chat", post(chat))
        .route("/chat/response", post(chat_callback).get(chat_poll))
        .route("/notify", post(notify))
        .with_state(state)
}

/// Run the gateway server; binds to config.gateway.bind:config.gateway.port.
/// Blocks until shutdown (e.g. Ctrl+C).
pub async fn run_gateway(config: Config) -> Result<()> {
    let bind = config.gateway.bind.trim().to_string();
    let port = config.gateway.port;
    let state = GatewayState::from_config(config);

    match state.dispatcher.active_mode() {
        Ok(mode) => log::info!("chat mode: {}", mode.as_str()),
        Err(e) => log::warn!("{}; /chat will answer 500 until configured", e),
    }
    if state.dispatcher.has_automation()
        && state.config.gateway.public_base_url.is_none()
        && config::is_loopback_bind(&bind)
    {
        log::warn!(
            "gateway bound to {} without a public base URL; webhook callbacks cannot reach this instance (set PUBLIC_BASE_URL)",
            bind
        );
    }

    let app = router(state);
    let bind_addr = format!("{}:{}", bind, port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("gateway server exited")?;
    log::info!("gateway stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                log::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, draining connections");
}

/// Origin the client used to reach us, from forwarding headers or Host.
fn request_origin(headers: &HeaderMap) -> Option<String> {
    let first = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };
    let host = first("x-forwarded-host").or_else(|| first(header::HOST.as_str()))?;
    let proto = first("x-forwarded-proto").unwrap_or_else(|| "http".to_string());
    Some(format!("{}://{}", proto, host))
}

/// GET / returns a simple health JSON (for probes).
async fn health_http(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    let mode = state
        .dispatcher
        .active_mode()
        .map(|m| m.as_str())
        .unwrap_or("unconfigured");
    Json(json!({
        "runtime": "running",
        "port": state.config.gateway.port,
        "mode": mode,
    }))
}

/// POST /chat dispatches one visitor message and replies now or tells the client to poll.
async fn chat(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ChatResponse>, RelayError> {
    let req: ChatRequest = serde_json::from_slice(&body)
        .map_err(|_| RelayError::validation("message and sessionId are required"))?;
    let origin = request_origin(&headers);
    let outcome = state.dispatcher.dispatch(req, origin.as_deref()).await?;
    Ok(Json(outcome.into()))
}

/// POST /chat/response?sessionId=: the automation webhook delivers a late reply.
async fn chat_callback(
    State(state): State<GatewayState>,
    Query(query): Query<SessionQuery>,
    body: Bytes,
) -> Result<Json<Ack>, RelayError> {
    callback::receive(state.store.as_ref(), query.session_id.as_deref(), &body).await?;
    Ok(Json(Ack::ok()))
}

/// GET /chat/response?sessionId=: client poll, consumes the reply when present.
async fn chat_poll(
    State(state): State<GatewayState>,
    Query(query): Query<SessionQuery>,
) -> Result<Json<ChatResponse>, RelayError> {
    let session_id = query
        .session_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| RelayError::validation("sessionId is required"))?;
    let response = match state.store.take(session_id).await {
        Some(reply) => reply.into(),
        None => ChatResponse::still_pending(),
    };
    Ok(Json(response))
}

/// POST /notify forwards a lead to the automation webhook.
async fn notify(State(state): State<GatewayState>, body: Bytes) -> Result<Json<Ack>, RelayError> {
    let value: serde_json::Value =
        serde_json::from_slice(&body).map_err(|_| RelayError::validation("invalid body"))?;
    if !value.is_object() {
        return Err(RelayError::validation("invalid body"));
    }
    let lead: Lead =
        serde_json::from_value(value).map_err(|e| RelayError::validation(format!("invalid lead: {}", e)))?;
    state.dispatcher.notify_lead(&lead).await?;
    Ok(Json(Ack::ok()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn origin_from_host() {
        let mut h = HeaderMap::new();
        assert_eq!(request_origin(&h), None);
        h.insert(header::HOST, HeaderValue::from_static("localhost:15151"));
        assert_eq!(request_origin(&h).as_deref(), Some("http://localhost:15151"));
    }

    #[test]
    fn origin_prefers_forwarding_headers() {
        let mut h = HeaderMap::new();
        h.insert(header::HOST, HeaderValue::from_static("10.0.0.5:15151"));
        h.insert("x-forwarded-host", HeaderValue::from_static("agency.example"));
        h.insert("x-forwarded-proto", HeaderValue::from_static("https, http"));
        assert_eq!(request_origin(&h).as_deref(), Some("https://agency.example"));
    }
}
