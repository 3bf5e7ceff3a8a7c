//! Application setup and initialization

pub mod database;
pub mod routes;
pub mod server;

use crate::state::{AppState, IngressConfig};
use anyhow::{Context, Result};
use nasdrop_core::Config;
use std::sync::Arc;

/// Initialize the web ingress (database, storage, routes)
pub async fn initialize_app(config: &Config) -> Result<(Arc<AppState>, axum::Router)> {
    // Validate configuration first - fail fast on misconfiguration
    config.validate().context("Configuration validation failed")?;
    tracing::info!("Configuration loaded and validated successfully");

    let pool = database::setup_database(config).await?;

    tokio::fs::create_dir_all(&config.base.cache_dir)
        .await
        .with_context(|| {
            format!(
                "Failed to create staging directory {}",
                config.base.cache_dir.display()
            )
        })?;

    // Stored files can still be served from staging without a backend
    let storage = match config.validate_storage() {
        Ok(()) => Some(nasdrop_storage::create_storage(config).await?),
        Err(e) => {
            tracing::warn!(error = %e, "Remote storage not configured, stored files cannot be served");
            None
        }
    };

    let state = Arc::new(AppState::new(
        pool,
        chrono::Duration::seconds(config.base.token_expiry_seconds),
        storage,
        IngressConfig::from_config(config),
    ));

    let router = routes::setup_routes(state.clone());

    Ok((state, router))
}
