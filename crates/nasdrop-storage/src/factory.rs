use crate::{LocalStorage, RemoteBackend, RemoteStorage, StorageError, StorageResult, WebDavStorage};
use nasdrop_core::Config;
use std::sync::Arc;

/// Create a storage backend based on configuration
pub async fn create_storage(config: &Config) -> StorageResult<Arc<dyn RemoteStorage>> {
    let storage = &config.storage;

    match storage.backend {
        RemoteBackend::Webdav => {
            let url = storage
                .webdav_url
                .clone()
                .ok_or_else(|| StorageError::ConfigError("WEBDAV_URL not configured".to_string()))?;

            let backend = WebDavStorage::new(
                url,
                storage.webdav_user.clone(),
                storage.webdav_pass.clone(),
            )?;
            Ok(Arc::new(backend))
        }

        RemoteBackend::Local => {
            let base_path = storage.local_storage_path.clone().ok_or_else(|| {
                StorageError::ConfigError("LOCAL_STORAGE_PATH not configured".to_string())
            })?;

            let backend = LocalStorage::new(base_path).await?;
            Ok(Arc::new(backend))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn builds_configured_backend() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();

        config.storage.backend = RemoteBackend::Local;
        config.storage.local_storage_path = Some(temp_dir.path().to_path_buf());
        let local = create_storage(&config).await.unwrap();
        assert_eq!(local.backend_type(), RemoteBackend::Local);

        config.storage.backend = RemoteBackend::Webdav;
        config.storage.webdav_url = Some("https://nas.local/dav".to_string());
        let webdav = create_storage(&config).await.unwrap();
        assert_eq!(webdav.backend_type(), RemoteBackend::Webdav);
    }

    #[tokio::test]
    async fn missing_settings_are_config_errors() {
        let mut config = Config::default();
        config.storage.backend = RemoteBackend::Webdav;
        config.storage.webdav_url = None;
        assert!(matches!(
            create_storage(&config).await,
            Err(StorageError::ConfigError(_))
        ));

        config.storage.backend = RemoteBackend::Local;
        config.storage.local_storage_path = None;
        assert!(matches!(
            create_storage(&config).await,
            Err(StorageError::ConfigError(_))
        ));
    }
}
