use std::sync::Arc;
use std::time::Duration;

use nasdrop_core::{init_tracing, shutdown_signal, Config};
use nasdrop_db::{connect, TokenRepository, UploadJobRepository};
use nasdrop_worker::{RelayWorker, RelayWorkerConfig, StagingCleanupService};
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    init_tracing("nasdrop-relay");

    // Load configuration
    let config = Config::from_env()?;
    config.validate()?;
    config.validate_storage()?;

    let pool = connect(&config).await?;
    let jobs = UploadJobRepository::new(pool.clone());
    let tokens = TokenRepository::new(
        pool,
        chrono::Duration::seconds(config.base.token_expiry_seconds),
    );

    let storage = nasdrop_storage::create_storage(&config).await?;

    let (relay_shutdown_tx, relay_shutdown_rx) = mpsc::channel(1);
    let relay = RelayWorker::new(jobs.clone(), storage, RelayWorkerConfig::from_config(&config));
    let relay_handle = tokio::spawn(relay.run(relay_shutdown_rx));

    let (cleanup_shutdown_tx, cleanup_shutdown_rx) = mpsc::channel(1);
    let cleanup = Arc::new(StagingCleanupService::new(
        jobs,
        tokens,
        config.relay.cache_cleanup_age_days,
        Duration::from_secs(config.relay.cleanup_interval_seconds),
    ));
    let cleanup_handle = cleanup.start(cleanup_shutdown_rx);

    shutdown_signal().await;

    let _ = relay_shutdown_tx.send(()).await;
    let _ = cleanup_shutdown_tx.send(()).await;
    let _ = tokio::join!(relay_handle, cleanup_handle);

    tracing::info!("Relay process exited cleanly");
    Ok(())
}
