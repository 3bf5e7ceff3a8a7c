use crate::keys::{segments, validate_remote_path};
use crate::traits::{ByteStream, RemoteStorage, StorageError, StorageResult};
use crate::RemoteBackend;
use async_trait::async_trait;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio_util::io::ReaderStream;

/// NAS share mounted into the local filesystem.
///
/// Remote paths are resolved below `base_path`, so `/DiscordUploads/a.txt`
/// lands at `{base_path}/DiscordUploads/a.txt`.
#[derive(Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    /// Create a new LocalStorage rooted at the mount point `base_path`.
    pub async fn new(base_path: impl Into<PathBuf>) -> StorageResult<Self> {
        let base_path = base_path.into();

        let meta = fs::metadata(&base_path).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Storage mount {} is not accessible: {}",
                base_path.display(),
                e
            ))
        })?;
        if !meta.is_dir() {
            return Err(StorageError::ConfigError(format!(
                "Storage mount {} is not a directory",
                base_path.display()
            )));
        }

        Ok(LocalStorage { base_path })
    }

    /// Map a remote path to a filesystem path below the mount point.
    fn remote_to_path(&self, remote_path: &str) -> StorageResult<PathBuf> {
        validate_remote_path(remote_path)?;

        let mut path = self.base_path.clone();
        for segment in segments(remote_path) {
            path.push(segment);
        }

        // Existing paths may still escape through a symlink
        if let (Ok(canonical), Ok(base)) = (path.canonicalize(), self.base_path.canonicalize()) {
            if canonical.strip_prefix(&base).is_err() {
                return Err(StorageError::InvalidPath(format!(
                    "{} resolves outside the storage mount",
                    remote_path
                )));
            }
        }

        Ok(path)
    }
}

#[async_trait]
impl RemoteStorage for LocalStorage {
    async fn put(&self, local_path: &Path, remote_path: &str) -> StorageResult<()> {
        let target = self.remote_to_path(remote_path)?;

        if !fs::try_exists(local_path).await.unwrap_or(false) {
            return Err(StorageError::SourceMissing(local_path.display().to_string()));
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }

        let start = std::time::Instant::now();
        let size = fs::copy(local_path, &target).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound && !local_path.exists() {
                StorageError::SourceMissing(local_path.display().to_string())
            } else {
                StorageError::UploadFailed(format!(
                    "Failed to copy to {}: {}",
                    target.display(),
                    e
                ))
            }
        })?;

        tracing::info!(
            path = %target.display(),
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage copy successful"
        );

        Ok(())
    }

    async fn exists_dir(&self, path: &str) -> StorageResult<bool> {
        let dir = self.remote_to_path(path)?;
        match fs::metadata(&dir).await {
            Ok(meta) => Ok(meta.is_dir()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::IoError(e)),
        }
    }

    async fn mkdir(&self, path: &str) -> StorageResult<()> {
        let dir = self.remote_to_path(path)?;
        fs::create_dir_all(&dir).await?;
        Ok(())
    }

    async fn download_stream(&self, remote_path: &str) -> StorageResult<ByteStream> {
        let path = self.remote_to_path(remote_path)?;

        let file = fs::File::open(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(remote_path.to_string())
            } else {
                StorageError::DownloadFailed(format!(
                    "Failed to open {}: {}",
                    path.display(),
                    e
                ))
            }
        })?;

        let stream = ReaderStream::new(file).map(|chunk| chunk.map_err(StorageError::IoError));
        Ok(Box::pin(stream))
    }

    fn backend_type(&self) -> RemoteBackend {
        RemoteBackend::Local
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use tempfile::TempDir;

    async fn storage() -> (LocalStorage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp_dir.path()).await.unwrap();
        (storage, temp_dir)
    }

    #[tokio::test]
    async fn missing_mount_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let result = LocalStorage::new(temp_dir.path().join("not-mounted")).await;
        assert!(matches!(result, Err(StorageError::ConfigError(_))));
    }

    #[tokio::test]
    async fn put_then_download() {
        let (storage, temp_dir) = storage().await;
        let staged = temp_dir.path().join("staged.bin");
        fs::write(&staged, b"hello nas").await.unwrap();

        storage.put(&staged, "/DiscordUploads/abc_staged.bin").await.unwrap();
        assert!(temp_dir.path().join("DiscordUploads/abc_staged.bin").exists());

        let chunks: Vec<bytes::Bytes> = storage
            .download_stream("/DiscordUploads/abc_staged.bin")
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(chunks.concat(), b"hello nas");
    }

    #[tokio::test]
    async fn put_overwrites_existing_file() {
        let (storage, temp_dir) = storage().await;
        let staged = temp_dir.path().join("staged.bin");

        fs::write(&staged, b"first").await.unwrap();
        storage.put(&staged, "/up/a").await.unwrap();
        fs::write(&staged, b"second").await.unwrap();
        storage.put(&staged, "/up/a").await.unwrap();

        let stored = fs::read(temp_dir.path().join("up/a")).await.unwrap();
        assert_eq!(stored, b"second");
    }

    #[tokio::test]
    async fn put_missing_source() {
        let (storage, temp_dir) = storage().await;
        let result = storage
            .put(&temp_dir.path().join("gone.bin"), "/up/gone.bin")
            .await;
        assert!(matches!(result, Err(StorageError::SourceMissing(_))));
    }

    #[tokio::test]
    async fn ensure_dir_creates_nested_folders() {
        let (storage, temp_dir) = storage().await;
        assert!(!storage.exists_dir("/a/b").await.unwrap());

        storage.ensure_dir("/a/b").await.unwrap();
        assert!(storage.exists_dir("/a/b").await.unwrap());
        assert!(temp_dir.path().join("a/b").is_dir());

        // Second call is a no-op
        storage.ensure_dir("/a/b").await.unwrap();
    }

    #[tokio::test]
    async fn rejects_traversal() {
        let (storage, temp_dir) = storage().await;
        let staged = temp_dir.path().join("staged.bin");
        fs::write(&staged, b"x").await.unwrap();

        assert!(matches!(
            storage.put(&staged, "/../escape.bin").await,
            Err(StorageError::InvalidPath(_))
        ));
        assert!(matches!(
            storage.mkdir("relative").await,
            Err(StorageError::InvalidPath(_))
        ));
    }

    #[tokio::test]
    async fn download_missing_is_not_found() {
        let (storage, _temp_dir) = storage().await;
        assert!(matches!(
            storage.download_stream("/up/none").await,
            Err(StorageError::NotFound(_))
        ));
    }
}
