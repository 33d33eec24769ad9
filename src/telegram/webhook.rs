//! HTTP surface for webhook delivery and health checks
//!
//! Serves the provider-facing webhook endpoint plus the small operational
//! surface (status, health, manual webhook setup, restart). Runs in both
//! deployment modes; in polling mode the webhook endpoint simply never
//! receives traffic.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::core::config;
use crate::telegram::dispatcher::{DispatchError, UpdateDispatcher};
use crate::telegram::session::BotSession;
use crate::telegram::update::InboundUpdate;

/// Shared state for all endpoints.
#[derive(Clone)]
pub struct WebState {
    pub dispatcher: Arc<UpdateDispatcher>,
    pub session: Arc<BotSession>,
}

/// Builds the application router.
pub fn create_router(state: WebState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/setup_webhook", get(setup_webhook_handler))
        .route("/restart", get(restart_handler))
        .route("/webhook/{token}", post(webhook_handler))
        .with_state(state)
}

/// Starts the HTTP server.
pub async fn run_server(port: u16, state: WebState) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = create_router(state);

    log::info!("Starting web server on http://{}", addr);
    log::info!("  POST /webhook/{{token}} - provider update delivery");
    log::info!("  GET  /setup_webhook  - manual webhook registration");
    log::info!("  GET  /status         - session status snapshot");
    log::info!("  GET  /health         - health check");

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// GET / — service banner.
async fn index_handler() -> impl IntoResponse {
    Json(json!({
        "status": "running",
        "message": "tallybot ledger service is up"
    }))
}

/// GET /health — liveness probe.
async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "port": *config::PORT
    }))
}

/// GET /status — session status snapshot.
async fn status_handler(State(state): State<WebState>) -> impl IntoResponse {
    Json(json!({
        "bot_status": state.session.status(),
        "service": "running",
        "port": *config::PORT
    }))
}

/// GET /setup_webhook — manual webhook (re)registration.
async fn setup_webhook_handler(State(state): State<WebState>) -> Response {
    if state.session.setup_webhook().await {
        (StatusCode::OK, Json(json!({"status": "ok"}))).into_response()
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"status": "error"}))).into_response()
    }
}

/// GET /restart — stop and re-register the session.
async fn restart_handler(State(state): State<WebState>) -> Response {
    let restarted = state.session.restart().await;
    let body = json!({
        "status": if restarted { "success" } else { "error" },
        "bot_status": state.session.status()
    });
    let code = if restarted {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (code, Json(body)).into_response()
}

/// POST /webhook/{token} — provider update delivery.
///
/// Responses follow the provider contract: 200 on success (including
/// updates this bot ignores, so the provider stops re-delivering them),
/// 403 on a bad token, 500 on internal failure.
async fn webhook_handler(
    State(state): State<WebState>,
    Path(token): Path<String>,
    Json(payload): Json<serde_json::Value>,
) -> Response {
    let update = match serde_json::from_value::<teloxide::types::Update>(payload) {
        Ok(update) => update,
        Err(e) => {
            log::warn!("Dropping malformed webhook payload: {}", e);
            return (StatusCode::OK, Json(json!({"status": "ok"}))).into_response();
        }
    };

    let Some(inbound) = InboundUpdate::from_telegram(&update) else {
        // Update kinds this bot does not handle are acknowledged and dropped
        return (StatusCode::OK, Json(json!({"status": "ok"}))).into_response();
    };

    match state.dispatcher.handle(&token, inbound).await {
        Ok(_) => (StatusCode::OK, Json(json!({"status": "ok"}))).into_response(),
        Err(DispatchError::Unauthorized) => {
            (StatusCode::FORBIDDEN, Json(json!({"status": "error"}))).into_response()
        }
        Err(DispatchError::SessionUnavailable) => {
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"status": "error"}))).into_response()
        }
    }
}
