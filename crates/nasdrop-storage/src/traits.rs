//! Remote storage abstraction trait

use crate::RemoteBackend;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::path::Path;
use std::pin::Pin;
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("File not found: {0}")]
    NotFound(String),

    /// The local file handed to `put` does not exist (any more).
    #[error("Source file missing: {0}")]
    SourceMissing(String),

    #[error("Invalid remote path: {0}")]
    InvalidPath(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Chunked file content.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, StorageError>> + Send>>;

/// Remote storage abstraction trait
///
/// Transfers are whole-file with no resume. Writing the same remote path twice
/// overwrites it, so a repeated `put` is harmless.
#[async_trait]
pub trait RemoteStorage: Send + Sync {
    /// Copy the local file at `local_path` to `remote_path`.
    async fn put(&self, local_path: &Path, remote_path: &str) -> StorageResult<()>;

    /// Whether `path` exists and is a directory.
    async fn exists_dir(&self, path: &str) -> StorageResult<bool>;

    /// Create `path`, including missing parents. Existing directories are fine.
    async fn mkdir(&self, path: &str) -> StorageResult<()>;

    /// Read a stored file back as a stream.
    async fn download_stream(&self, remote_path: &str) -> StorageResult<ByteStream>;

    /// Get the storage backend type
    fn backend_type(&self) -> RemoteBackend;

    /// Create `path` unless it already exists.
    async fn ensure_dir(&self, path: &str) -> StorageResult<()> {
        if self.exists_dir(path).await? {
            return Ok(());
        }
        tracing::info!(path = %path, backend = %self.backend_type(), "Creating remote directory");
        self.mkdir(path).await
    }
}
