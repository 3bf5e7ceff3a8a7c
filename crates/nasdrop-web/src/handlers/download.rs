use crate::error::PageError;
use crate::state::AppState;
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderValue, Response, StatusCode},
};
use futures::StreamExt;
use nasdrop_core::{AppError, ContentSource, UploadJob};
use std::sync::Arc;
use tokio_util::io::ReaderStream;
use uuid::Uuid;

fn not_retrievable(reason: impl Into<String>) -> AppError {
    AppError::NotRetrievable(reason.into())
}

/// Serve a job's bytes from the staging copy or from remote storage, whichever
/// is authoritative for its state.
#[tracing::instrument(skip(state), fields(operation = "download_file"))]
pub async fn download_file(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<Response<Body>, PageError> {
    let id = Uuid::parse_str(&job_id)
        .map_err(|_| not_retrievable(format!("malformed job id {}", job_id)))?;

    let job = state
        .jobs
        .get(id)
        .await?
        .ok_or_else(|| not_retrievable(format!("no job {}", id)))?;

    let local_exists = match &job.local_path {
        Some(path) => tokio::fs::try_exists(path).await.unwrap_or(false),
        None => false,
    };

    let body = match job.content_source(local_exists)? {
        ContentSource::Local(path) => {
            tracing::info!(path = %path.display(), state = %job.state, "Serving file from staging");
            let file = tokio::fs::File::open(&path).await.map_err(|e| {
                // Removed between the existence check and the open
                not_retrievable(format!("staged copy unreadable: {}", e))
            })?;
            Body::from_stream(ReaderStream::new(file))
        }
        ContentSource::Remote(remote_path) => {
            let storage = state.storage.as_ref().ok_or_else(|| {
                tracing::warn!("Stored file requested but no remote storage is configured");
                not_retrievable(format!("job {} is only available remotely", id))
            })?;
            tracing::info!(remote_path = %remote_path, "Serving file from remote storage");
            let stream = storage.download_stream(&remote_path).await?;
            Body::from_stream(stream.map(|chunk| {
                chunk.map_err(|e| std::io::Error::other(format!("Storage stream error: {}", e)))
            }))
        }
    };

    build_attachment(&job, body)
}

fn build_attachment(job: &UploadJob, body: Body) -> Result<Response<Body>, PageError> {
    let content_type = job
        .content_type
        .as_deref()
        .and_then(|ct| HeaderValue::from_str(ct).ok())
        .unwrap_or_else(|| HeaderValue::from_static("application/octet-stream"));
    // Display names are sanitised on upload, so they need no quoting beyond this
    let content_disposition = format!("attachment; filename=\"{}\"", job.display_name);

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_DISPOSITION, content_disposition)
        .body(body)
        .map_err(|e| AppError::Internal(format!("Failed to build response: {}", e)))?;

    Ok(response)
}
