//! Webhook HTTP surface
//!
//! `POST /webhook` accepts the transport's event batch, schedules one task
//! per event and answers immediately. `GET /health` pings the session store.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use serde_json::{json, Value};
use tracing::{debug, error, warn};

use crate::handlers::Router;
use crate::state::{Durability, SessionStore};
use crate::transport::events::parse_webhook;

/// Shared state accessible from Axum handlers
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<Router>,
    pub store: Arc<dyn SessionStore>,
}

/// Build the Axum router with all routes
pub fn app(state: AppState) -> axum::Router {
    axum::Router::new()
        .route("/webhook", post(webhook_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// POST /webhook
async fn webhook_handler(State(state): State<AppState>, body: String) -> StatusCode {
    let events = match parse_webhook(&body) {
        Ok(events) => events,
        Err(e) => {
            warn!(error = %e, "Rejected malformed webhook payload");
            return StatusCode::BAD_REQUEST;
        }
    };

    debug!(count = events.len(), "Webhook received");
    for event in events {
        let router = state.router.clone();
        tokio::spawn(async move {
            router.dispatch(event).await;
        });
    }

    StatusCode::OK
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let durability = match state.store.durability() {
        Durability::Durable => "durable",
        Durability::Volatile => "volatile",
        Durability::DurableWithVolatileFallback => "durable_with_volatile_fallback",
    };

    match state.store.health_check().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ok", "session_store": durability }))),
        Err(e) => {
            error!(error = %e, "Session store health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable", "session_store": durability })),
            )
        }
    }
}
