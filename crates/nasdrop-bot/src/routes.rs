//! Route configuration for the command front.

use crate::interactions::handle_interaction;
use crate::state::BotState;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

pub fn setup_routes(state: Arc<BotState>) -> Router<()> {
    Router::new()
        .route("/", get(health_check))
        .route("/interactions", post(handle_interaction))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check(State(state): State<Arc<BotState>>) -> impl IntoResponse {
    let database = match tokio::time::timeout(HEALTH_TIMEOUT, state.tokens.count()).await {
        Ok(Ok(_)) => "healthy".to_string(),
        Ok(Err(e)) => format!("unhealthy: {}", e),
        Err(_) => "timeout".to_string(),
    };

    let healthy = database == "healthy";
    let status = if healthy {
        StatusCode::OK
    } else {
        tracing::error!(database = %database, "Health check failed");
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "status": if healthy { "healthy" } else { "unhealthy" },
            "service": "nasdrop-bot",
            "database": database,
        })),
    )
}
