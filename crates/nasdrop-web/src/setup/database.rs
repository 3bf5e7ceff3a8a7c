//! Database setup and initialization

use anyhow::Result;
use nasdrop_core::Config;
use sqlx::SqlitePool;

/// Open the shared store and run pending migrations
pub async fn setup_database(config: &Config) -> Result<SqlitePool> {
    nasdrop_db::connect(config).await
}
