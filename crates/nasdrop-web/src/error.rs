//! HTTP error response conversion
//!
//! JSON endpoints return `Result<_, HttpAppError>` and render an [`ErrorResponse`].
//! The upload and download pages are opened in a browser, so they return
//! [`PageError`] which answers with the plain client message instead.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use nasdrop_core::{AppError, ErrorMetadata, LogLevel};
use nasdrop_storage::StorageError;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    /// Machine-readable error code for programmatic handling
    pub code: String,
    /// Whether this error is recoverable (can be retried)
    pub recoverable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_action: Option<String>,
}

/// Wrapper type for AppError to implement IntoResponse
/// This is necessary because of Rust's orphan rules - we can't implement
/// IntoResponse (external trait) for AppError (external type from nasdrop-core)
#[derive(Debug)]
pub struct HttpAppError(pub AppError);

impl From<AppError> for HttpAppError {
    fn from(err: AppError) -> Self {
        HttpAppError(err)
    }
}

impl From<anyhow::Error> for HttpAppError {
    fn from(err: anyhow::Error) -> Self {
        HttpAppError(AppError::InternalWithSource {
            message: err.to_string(),
            source: err,
        })
    }
}

impl From<StorageError> for HttpAppError {
    fn from(err: StorageError) -> Self {
        HttpAppError(storage_to_app_error(err))
    }
}

/// Plain-text error for pages a user opens in a browser.
#[derive(Debug)]
pub struct PageError(pub AppError);

impl From<AppError> for PageError {
    fn from(err: AppError) -> Self {
        PageError(err)
    }
}

impl From<StorageError> for PageError {
    fn from(err: StorageError) -> Self {
        PageError(storage_to_app_error(err))
    }
}

pub(crate) fn storage_to_app_error(err: StorageError) -> AppError {
    match err {
        StorageError::NotFound(msg) => AppError::NotRetrievable(msg),
        StorageError::InvalidPath(msg) => AppError::InvalidInput(msg),
        StorageError::SourceMissing(msg) => AppError::UnrecoverableLocalLoss(msg),
        StorageError::IoError(err) => AppError::Internal(format!("IO error: {}", err)),
        StorageError::ConfigError(msg) => AppError::Internal(msg),
        other => AppError::TransferFailure(other.to_string()),
    }
}

fn log_error(error: &AppError) {
    let error_type = error.error_type();
    match error.log_level() {
        LogLevel::Debug => {
            tracing::debug!(error = %error, error_type = error_type, "Error occurred");
        }
        LogLevel::Warn => {
            tracing::warn!(error = %error, error_type = error_type, "Error occurred");
        }
        LogLevel::Error => {
            tracing::error!(error = %error, error_type = error_type, "Error occurred");
        }
    }
}

fn is_production_env() -> bool {
    std::env::var("ENVIRONMENT")
        .or_else(|_| std::env::var("APP_ENV"))
        .map(|env| env.to_lowercase() == "production" || env.to_lowercase() == "prod")
        .unwrap_or(false)
}

fn status_of(error: &AppError) -> StatusCode {
    StatusCode::from_u16(error.http_status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

impl IntoResponse for HttpAppError {
    fn into_response(self) -> Response {
        let app_error = &self.0;
        log_error(app_error);

        // Details only outside production, and never for sensitive errors
        let show_details = !is_production_env() && !app_error.is_sensitive();
        let body = ErrorResponse {
            error: app_error.client_message(),
            details: show_details.then(|| app_error.detailed_message()),
            error_type: show_details.then(|| app_error.error_type().to_string()),
            code: app_error.error_code().to_string(),
            recoverable: app_error.is_recoverable(),
            suggested_action: app_error.suggested_action().map(String::from),
        };

        (status_of(app_error), Json(body)).into_response()
    }
}

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        log_error(&self.0);
        (status_of(&self.0), self.0.client_message()).into_response()
    }
}
