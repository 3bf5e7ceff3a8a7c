//! Common utilities for the upload handler

use axum::extract::multipart::{Field, MultipartError};
use axum::extract::Multipart;
use axum::http::StatusCode;
use nasdrop_core::AppError;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// A payload written to the staging directory.
#[derive(Debug, Clone)]
pub struct StagedUpload {
    pub path: PathBuf,
    pub display_name: String,
    pub content_type: Option<String>,
    pub size_bytes: u64,
}

/// Stream the multipart field named "file" to `{cache_dir}/{job_id}_{name}`.
///
/// Only one field named "file" is accepted. The file is removed again if the
/// payload exceeds `max_bytes` or the body breaks off.
pub async fn stage_multipart_file(
    mut multipart: Multipart,
    cache_dir: &Path,
    job_id: Uuid,
    max_bytes: usize,
) -> Result<StagedUpload, AppError> {
    let mut staged: Option<StagedUpload> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }
        if let Some(previous) = staged.take() {
            remove_staged(&previous.path).await;
            return Err(AppError::BadRequest(
                "Multiple file fields are not allowed; send exactly one field named 'file'"
                    .to_string(),
            ));
        }

        let original = field.file_name().unwrap_or_default().to_string();
        if original.trim().is_empty() {
            return Err(AppError::BadRequest("No selected file".to_string()));
        }
        let display_name = sanitize_filename(&original)?;
        let content_type = field.content_type().map(str::to_string);

        fs::create_dir_all(cache_dir).await?;
        let path = cache_dir.join(format!("{}_{}", job_id, display_name));

        match write_field(field, &path, max_bytes).await {
            Ok(size_bytes) => {
                staged = Some(StagedUpload {
                    path,
                    display_name,
                    content_type,
                    size_bytes,
                });
            }
            Err(e) => {
                remove_staged(&path).await;
                return Err(e);
            }
        }
    }

    staged.ok_or_else(|| AppError::BadRequest("No file part".to_string()))
}

async fn write_field(
    mut field: Field<'_>,
    path: &Path,
    max_bytes: usize,
) -> Result<u64, AppError> {
    let mut file = fs::File::create(path).await?;
    let mut written: u64 = 0;

    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        written += chunk.len() as u64;
        if written > max_bytes as u64 {
            return Err(too_large(max_bytes));
        }
        file.write_all(&chunk).await?;
    }

    file.flush().await?;
    file.sync_all().await?;
    Ok(written)
}

/// Remove a partially staged file, logging rather than failing.
pub async fn remove_staged(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => tracing::info!(path = %path.display(), "Removed staged file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::error!(error = %e, path = %path.display(), "Failed to remove staged file"),
    }
}

fn multipart_error(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(err.body_text())
    } else {
        AppError::BadRequest(format!("Failed to read multipart: {}", err.body_text()))
    }
}

fn too_large(max_bytes: usize) -> AppError {
    AppError::PayloadTooLarge(format!(
        "File size exceeds maximum allowed size of {} MB",
        max_bytes / 1024 / 1024
    ))
}

/// Sanitize filename to prevent path traversal and invalid characters.
/// Returns an error if the filename contains path traversal attempts.
pub fn sanitize_filename(filename: &str) -> Result<String, AppError> {
    const MAX_FILENAME_LENGTH: usize = 255;

    // Browsers on Windows may send a full client path
    let filename_only = filename.rsplit(['/', '\\']).next().unwrap_or(filename);

    if filename.split(['/', '\\']).any(|part| part == "..") {
        return Err(AppError::InvalidInput(
            "Filename contains invalid path traversal".to_string(),
        ));
    }

    let sanitized: String = filename_only
        .chars()
        .take(MAX_FILENAME_LENGTH)
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    let sanitized = sanitized.trim_start_matches('.').to_string();
    if sanitized.trim_matches('_').is_empty() || sanitized.len() < 3 {
        return Ok("file".to_string());
    }

    Ok(sanitized)
}
