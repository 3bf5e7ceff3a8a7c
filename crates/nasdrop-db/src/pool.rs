//! Store connection setup and migrations

use anyhow::{Context, Result};
use nasdrop_core::Config;
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;

/// Schema migrations (workspace `migrations/`).
pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

/// Open the shared store described by `config` and apply pending migrations.
///
/// Every process calls this at startup; migrations are idempotent.
pub async fn connect(config: &Config) -> Result<SqlitePool> {
    let path = &config.base.database_path;
    let timeout = Duration::from_secs(config.base.db_timeout_seconds);

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create database directory {}", parent.display())
            })?;
        }
    }

    tracing::info!(path = %path.display(), "Connecting to database...");

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(timeout);

    let pool = SqlitePoolOptions::new()
        .max_connections(config.base.db_max_connections)
        .acquire_timeout(timeout)
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect_with(options)
        .await
        .context("Failed to open database")?;

    tracing::info!(
        max_connections = config.base.db_max_connections,
        "Database connected successfully"
    );

    MIGRATOR
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database migrations applied");

    Ok(pool)
}

/// Private in-memory store with the schema applied.
///
/// Limited to a single connection that is never recycled, since every new
/// connection to `:memory:` would see an empty database.
pub async fn connect_in_memory() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .context("Failed to open in-memory database")?;

    MIGRATOR
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;

    Ok(pool)
}
