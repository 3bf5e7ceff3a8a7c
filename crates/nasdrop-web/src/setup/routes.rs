//! Route configuration and setup

use crate::handlers;
use crate::state::AppState;
use axum::{extract::DefaultBodyLimit, routing::get, Router};
use std::sync::Arc;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// Room for multipart boundaries and headers on top of the file itself.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Setup all application routes
pub fn setup_routes(state: Arc<AppState>) -> Router<()> {
    let body_limit = state
        .ingress
        .max_upload_size_bytes
        .saturating_add(MULTIPART_OVERHEAD_BYTES);

    let upload_routes = Router::new()
        .route(
            "/upload/{token}",
            get(handlers::upload::upload_form).post(handlers::upload::upload_file),
        )
        // The handler enforces the exact file size while streaming
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(ConcurrencyLimitLayer::new(state.ingress.max_concurrent_uploads));

    Router::new()
        .route("/", get(handlers::health::health_check))
        .route("/download/{job_id}", get(handlers::download::download_file))
        .route("/api/jobs/{id}", get(handlers::jobs::job_status))
        .merge(upload_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
