//! Server startup and graceful shutdown

use anyhow::Result;
use axum::Router;
use nasdrop_core::{shutdown_signal, Config};

/// Start the server with graceful shutdown
pub async fn start_server(config: &Config, app: Router) -> Result<()> {
    let addr = format!("0.0.0.0:{}", config.web.server_port);
    tracing::info!(addr = %addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!(
        max_upload_mb = config.web.max_upload_size_bytes / 1024 / 1024,
        cache_dir = %config.base.cache_dir.display(),
        app_base_url = %config.base.app_base_url,
        "Server ready and accepting connections"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}
