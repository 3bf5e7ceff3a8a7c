use crate::error::HttpAppError;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use nasdrop_core::{AppError, JobState, UploadJob};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// Public view of a job. Staging paths and origin identity stay private.
#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub id: Uuid,
    pub display_name: String,
    pub state: JobState,
    pub size_bytes: i64,
    pub download_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobStatusResponse {
    fn from_job(job: UploadJob, app_base_url: &str) -> Self {
        Self {
            download_url: format!("{}/download/{}", app_base_url.trim_end_matches('/'), job.id),
            id: job.id,
            display_name: job.display_name,
            state: job.state,
            size_bytes: job.size_bytes,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

/// Lifecycle state of one upload, for polling clients.
#[tracing::instrument(skip(state), fields(operation = "job_status"))]
pub async fn job_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<JobStatusResponse>, HttpAppError> {
    let job = state
        .jobs
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Job {} not found", id)))?;

    Ok(Json(JobStatusResponse::from_job(
        job,
        &state.ingress.app_base_url,
    )))
}
