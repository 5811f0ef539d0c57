//! HTTP surface for the `api` subcommand: the webhook ingestor route plus
//! a health check. Router construction follows `server/mod.rs::create_router`
//! (CORS + trace layer, `Router::new().route(...)` style), pared down to
//! the routes spec.md actually names — the teacher's lead/agent/auth/call
//! CRUD table has no counterpart here.

use std::sync::Arc;

use axum::http::{Method, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::webhook::{axum_webhook_handler, WebhookState};

pub fn create_router(state: Arc<WebhookState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/webhooks/telephony/events", post(axum_webhook_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}
