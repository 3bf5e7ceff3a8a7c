//! Application state shared by the web ingress handlers.

use nasdrop_core::Config;
use nasdrop_db::{NotificationRepository, TokenRepository, UploadJobRepository};
use nasdrop_storage::RemoteStorage;
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;

/// Staging and link settings read by the upload and download handlers.
#[derive(Clone, Debug)]
pub struct IngressConfig {
    /// Directory uploads are staged in before the relay picks them up.
    pub cache_dir: PathBuf,
    pub max_upload_size_bytes: usize,
    pub max_concurrent_uploads: usize,
    pub app_base_url: String,
    /// Remote base folder probed by the health check.
    pub target_folder: String,
}

impl IngressConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            cache_dir: config.base.cache_dir.clone(),
            max_upload_size_bytes: config.web.max_upload_size_bytes,
            max_concurrent_uploads: config.web.max_concurrent_uploads,
            app_base_url: config.base.app_base_url.clone(),
            target_folder: config.storage.target_folder.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub tokens: TokenRepository,
    pub jobs: UploadJobRepository,
    pub notifications: NotificationRepository,
    /// Remote storage for reading back relayed files. `None` when no backend is
    /// configured; stored files then cannot be served.
    pub storage: Option<Arc<dyn RemoteStorage>>,
    pub ingress: IngressConfig,
}

impl AppState {
    pub fn new(
        pool: SqlitePool,
        token_ttl: chrono::Duration,
        storage: Option<Arc<dyn RemoteStorage>>,
        ingress: IngressConfig,
    ) -> Self {
        Self {
            tokens: TokenRepository::new(pool.clone(), token_ttl),
            jobs: UploadJobRepository::new(pool.clone()),
            notifications: NotificationRepository::new(pool.clone()),
            pool,
            storage,
            ingress,
        }
    }
}
