//! HTTP error responses for the interactions endpoint.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use nasdrop_core::{AppError, ErrorMetadata, LogLevel};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Wrapper so `AppError` can be returned from axum handlers.
#[derive(Debug)]
pub struct HttpAppError(pub AppError);

impl From<AppError> for HttpAppError {
    fn from(err: AppError) -> Self {
        HttpAppError(err)
    }
}

impl IntoResponse for HttpAppError {
    fn into_response(self) -> Response {
        let error = &self.0;
        match error.log_level() {
            LogLevel::Debug => tracing::debug!(error = %error, "Interaction rejected"),
            LogLevel::Warn => tracing::warn!(error = %error, "Interaction rejected"),
            LogLevel::Error => tracing::error!(error = %error, "Interaction failed"),
        }

        let status = StatusCode::from_u16(error.http_status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorResponse {
            error: error.client_message(),
            code: error.error_code().to_string(),
        };
        (status, Json(body)).into_response()
    }
}
