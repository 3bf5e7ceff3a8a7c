use crate::keys::{segments, validate_remote_path};
use crate::traits::{ByteStream, RemoteStorage, StorageError, StorageResult};
use crate::RemoteBackend;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Method, StatusCode};
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tokio_util::io::ReaderStream;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// NAS reachable over WebDAV.
#[derive(Clone)]
pub struct WebDavStorage {
    client: Client,
    base_url: String,
    username: Option<String>,
    password: Option<String>,
}

impl WebDavStorage {
    /// Create a client for the WebDAV root at `base_url`.
    pub fn new(
        base_url: impl Into<String>,
        username: Option<String>,
        password: Option<String>,
    ) -> StorageResult<Self> {
        let base_url = base_url.into();
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(StorageError::ConfigError(format!(
                "WEBDAV_URL must be an http(s) URL: {}",
                base_url
            )));
        }

        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| StorageError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            username,
            password,
        })
    }

    /// Full URL of a remote path with each segment percent-encoded.
    fn url_for(&self, remote_path: &str) -> StorageResult<String> {
        validate_remote_path(remote_path)?;
        let mut url = self.base_url.clone();
        for segment in segments(remote_path) {
            url.push('/');
            url.push_str(&urlencoding::encode(segment));
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: &str) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.username {
            Some(user) => builder.basic_auth(user, self.password.as_deref()),
            None => builder,
        }
    }

    fn method(name: &'static str) -> StorageResult<Method> {
        Method::from_bytes(name.as_bytes())
            .map_err(|e| StorageError::BackendError(format!("Invalid method {}: {}", name, e)))
    }
}

#[async_trait]
impl RemoteStorage for WebDavStorage {
    #[tracing::instrument(skip(self, local_path), fields(backend = "webdav"))]
    async fn put(&self, local_path: &Path, remote_path: &str) -> StorageResult<()> {
        let url = self.url_for(remote_path)?;

        let file = match fs::File::open(local_path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::SourceMissing(local_path.display().to_string()));
            }
            Err(e) => return Err(StorageError::IoError(e)),
        };
        let size = file.metadata().await?.len();

        let start = std::time::Instant::now();
        let body = reqwest::Body::wrap_stream(ReaderStream::new(file));
        let response = self
            .request(Method::PUT, &url)
            .header(reqwest::header::CONTENT_LENGTH, size)
            .body(body)
            .send()
            .await
            .map_err(|e| StorageError::UploadFailed(format!("PUT {} failed: {}", remote_path, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StorageError::UploadFailed(format!(
                "PUT {} returned {}",
                remote_path, status
            )));
        }

        tracing::info!(
            remote_path = %remote_path,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "WebDAV upload successful"
        );

        Ok(())
    }

    async fn exists_dir(&self, path: &str) -> StorageResult<bool> {
        let url = self.url_for(path)?;
        let response = self
            .request(Self::method("PROPFIND")?, &url)
            .header("Depth", "0")
            .send()
            .await
            .map_err(|e| StorageError::BackendError(format!("PROPFIND {} failed: {}", path, e)))?;

        match response.status() {
            StatusCode::MULTI_STATUS | StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(StorageError::BackendError(format!(
                "PROPFIND {} returned {}",
                path, status
            ))),
        }
    }

    async fn mkdir(&self, path: &str) -> StorageResult<()> {
        validate_remote_path(path)?;
        let mkcol = Self::method("MKCOL")?;

        // MKCOL only creates one level, so walk down from the root
        let mut current = String::new();
        for segment in segments(path) {
            current.push('/');
            current.push_str(segment);

            let url = self.url_for(&current)?;
            let response = self
                .request(mkcol.clone(), &url)
                .send()
                .await
                .map_err(|e| {
                    StorageError::BackendError(format!("MKCOL {} failed: {}", current, e))
                })?;

            match response.status() {
                // 405: already exists
                StatusCode::CREATED | StatusCode::METHOD_NOT_ALLOWED => {}
                status if status.is_success() => {}
                status => {
                    return Err(StorageError::BackendError(format!(
                        "MKCOL {} returned {}",
                        current, status
                    )))
                }
            }
        }

        Ok(())
    }

    async fn download_stream(&self, remote_path: &str) -> StorageResult<ByteStream> {
        let url = self.url_for(remote_path)?;
        let response = self
            .request(Method::GET, &url)
            .send()
            .await
            .map_err(|e| {
                StorageError::DownloadFailed(format!("GET {} failed: {}", remote_path, e))
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(StorageError::NotFound(remote_path.to_string())),
            status if !status.is_success() => Err(StorageError::DownloadFailed(format!(
                "GET {} returned {}",
                remote_path, status
            ))),
            _ => {
                let stream = response
                    .bytes_stream()
                    .map(|chunk| chunk.map_err(|e| StorageError::DownloadFailed(e.to_string())));
                Ok(Box::pin(stream))
            }
        }
    }

    fn backend_type(&self) -> RemoteBackend {
        RemoteBackend::Webdav
    }
}
