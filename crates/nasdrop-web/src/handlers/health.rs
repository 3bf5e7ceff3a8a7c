//! Health check handler and response type.

use crate::state::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(5);

/// Run an async check with timeout; returns status string "healthy", "timeout", or "{prefix}: {error}".
async fn run_check<F, E>(timeout: Duration, f: F, error_prefix: &str) -> String
where
    F: Future<Output = Result<(), E>>,
    E: Display,
{
    match tokio::time::timeout(timeout, f).await {
        Ok(Ok(())) => "healthy".to_string(),
        Ok(Err(e)) => format!("{}: {}", error_prefix, e),
        Err(_) => "timeout".to_string(),
    }
}

#[derive(Debug, Serialize)]
pub struct HealthCheckResponse {
    pub status: String,
    pub service: &'static str,
    pub database: String,
    /// Remote storage reachability. Not fatal: uploads are staged locally.
    pub storage: String,
}

/// Health check. Fails only when the shared store is unreachable.
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let pool = state.pool.clone();
    let database = run_check(
        TIMEOUT,
        async move { sqlx::query("SELECT 1").execute(&pool).await.map(drop) },
        "unhealthy",
    )
    .await;

    let storage = match state.storage.clone() {
        Some(storage) => {
            let folder = state.ingress.target_folder.clone();
            run_check(
                TIMEOUT,
                async move { storage.exists_dir(&folder).await.map(drop) },
                "degraded",
            )
            .await
        }
        None => "not_configured".to_string(),
    };

    let healthy = database == "healthy";
    if !healthy {
        tracing::error!(database = %database, "Health check failed");
    }

    let response = HealthCheckResponse {
        status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
        service: "nasdrop-web",
        database,
        storage,
    };

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(response))
}
