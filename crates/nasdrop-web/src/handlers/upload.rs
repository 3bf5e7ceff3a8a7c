use crate::error::PageError;
use crate::state::AppState;
use crate::utils::upload::{remove_staged, stage_multipart_file};
use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{Html, IntoResponse},
};
use nasdrop_core::{AppError, NewUploadJob, OriginIdentity};
use std::sync::Arc;
use uuid::Uuid;

const INVALID_LINK: &str = "Invalid or expired upload link.";

const UPLOAD_FORM: &str = r#"<!doctype html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <title>Upload a file</title>
</head>
<body>
  <h1>Upload a file</h1>
  <form method="post" action="/upload/{{token}}" enctype="multipart/form-data">
    <input type="file" name="file" required>
    <button type="submit">Upload</button>
  </form>
</body>
</html>
"#;

async fn redeem(state: &AppState, token: &str) -> Result<OriginIdentity, AppError> {
    match state.tokens.redeem(token).await? {
        Some(origin) => Ok(origin),
        None => {
            tracing::warn!("Invalid or expired token used");
            Err(AppError::NotFound(INVALID_LINK.to_string()))
        }
    }
}

/// Serve the upload form for a live token.
#[tracing::instrument(skip(state, token), fields(operation = "upload_form"))]
pub async fn upload_form(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Html<String>, PageError> {
    redeem(&state, &token).await?;
    Ok(Html(UPLOAD_FORM.replace("{{token}}", &token)))
}

/// Accept a file for a live token: stage it, record the job, queue the
/// completion notice and retire the token.
#[tracing::instrument(skip(state, token, multipart), fields(operation = "upload_file", job_id = tracing::field::Empty))]
pub async fn upload_file(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    multipart: Multipart,
) -> Result<impl IntoResponse, PageError> {
    let origin = redeem(&state, &token).await?;

    let job_id = Uuid::new_v4();
    tracing::Span::current().record("job_id", tracing::field::display(job_id));

    let staged = stage_multipart_file(
        multipart,
        &state.ingress.cache_dir,
        job_id,
        state.ingress.max_upload_size_bytes,
    )
    .await?;

    tracing::info!(
        path = %staged.path.display(),
        size_bytes = staged.size_bytes,
        "File saved to staging"
    );

    let new_job = NewUploadJob {
        id: job_id,
        display_name: staged.display_name.clone(),
        local_path: staged.path.clone(),
        origin: origin.clone(),
        content_type: staged.content_type.clone(),
        size_bytes: i64::try_from(staged.size_bytes).unwrap_or(i64::MAX),
    };

    if let Err(e) = state.jobs.create(&new_job).await {
        tracing::error!(error = %e, "Failed to record upload job");
        remove_staged(&staged.path).await;
        return Err(e.into());
    }

    // The file is safe at this point; a lost notice must not fail the upload
    match state
        .notifications
        .enqueue(job_id, &origin, &staged.display_name)
        .await
    {
        Ok(notification_id) => tracing::info!(notification_id, "Completion notice queued"),
        Err(e) => tracing::error!(error = %e, "Failed to queue completion notice"),
    }

    if let Err(e) = state.tokens.invalidate(&token).await {
        tracing::error!(error = %e, "Failed to invalidate upload token");
    }

    Ok((
        StatusCode::OK,
        format!(
            "Upload Successful! File ID: {}. Share link will be sent to the chat shortly.",
            job_id
        ),
    ))
}
