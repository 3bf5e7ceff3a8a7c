//! Error types module
//!
//! All failures surfaced by the token registry, the upload lifecycle tracker and
//! the notification outbox are unified under `AppError`. Each variant describes
//! itself through `ErrorMetadata` so the HTTP surfaces and the pollers can decide
//! how to log and present it.
//!
//! The `Persistence` variant and `From<sqlx::Error>` are gated behind the `sqlx` feature.

use std::io;

#[cfg(feature = "sqlx")]
use sqlx::Error as SqlxError;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like an expired link
    Debug,
    /// Warning level - for recoverable issues like a failed chat delivery
    Warn,
    /// Error level - for unexpected failures
    Error,
}

/// Metadata for error responses - defines how an error should be presented
pub trait ErrorMetadata {
    /// HTTP status code to return
    fn http_status_code(&self) -> u16;

    /// Machine-readable error code (e.g., "PERSISTENCE_ERROR")
    fn error_code(&self) -> &'static str;

    /// Whether this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Suggested action for the client
    fn suggested_action(&self) -> Option<&'static str>;

    /// Client-facing message (may differ from internal error message)
    fn client_message(&self) -> String;

    /// Whether details should be hidden from clients
    fn is_sensitive(&self) -> bool;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[cfg(feature = "sqlx")]
    #[error("Persistence error: {0}")]
    Persistence(#[source] SqlxError),

    #[cfg(not(feature = "sqlx"))]
    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("File too large: {0}")]
    PayloadTooLarge(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Channel not allowed: {0}")]
    ChannelNotAllowed(String),

    #[error("Rate limited, retry in {retry_after_secs:.1}s")]
    RateLimited { retry_after_secs: f64 },

    #[error("Transfer failed: {0}")]
    TransferFailure(String),

    #[error("Staged file lost: {0}")]
    UnrecoverableLocalLoss(String),

    #[error("Delivery failed: {0}")]
    DeliveryFailure(String),

    #[error("Content not retrievable: {0}")]
    NotRetrievable(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Internal error with source")]
    InternalWithSource {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

#[cfg(feature = "sqlx")]
impl From<SqlxError> for AppError {
    fn from(err: SqlxError) -> Self {
        match err {
            SqlxError::PoolTimedOut => {
                AppError::StoreUnavailable("timed out acquiring a store connection".to_string())
            }
            SqlxError::PoolClosed => {
                AppError::StoreUnavailable("store connection pool is closed".to_string())
            }
            SqlxError::Io(e) => AppError::StoreUnavailable(format!("store I/O error: {}", e)),
            other => AppError::Persistence(other),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalWithSource {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<io::Error> for AppError {
    fn from(err: io::Error) -> Self {
        AppError::Internal(format!("IO error: {}", err))
    }
}

impl From<uuid::Error> for AppError {
    fn from(err: uuid::Error) -> Self {
        AppError::InvalidInput(format!("UUID parsing error: {}", err))
    }
}

/// Static metadata for each variant: (http_status, error_code, recoverable, suggested_action, sensitive, log_level).
fn app_error_static_metadata(
    err: &AppError,
) -> (
    u16,
    &'static str,
    bool,
    Option<&'static str>,
    bool,
    LogLevel,
) {
    match err {
        AppError::Persistence(_) => (
            500,
            "PERSISTENCE_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
        AppError::StoreUnavailable(_) => (
            503,
            "STORE_UNAVAILABLE",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
        AppError::NotFound(_) => (
            404,
            "NOT_FOUND",
            false,
            Some("Request a new upload link"),
            false,
            LogLevel::Debug,
        ),
        AppError::InvalidInput(_) => (
            400,
            "INVALID_INPUT",
            false,
            Some("Check request parameters and try again"),
            false,
            LogLevel::Debug,
        ),
        AppError::BadRequest(_) => (
            400,
            "BAD_REQUEST",
            false,
            Some("Check request format and parameters"),
            false,
            LogLevel::Debug,
        ),
        AppError::PayloadTooLarge(_) => (
            413,
            "PAYLOAD_TOO_LARGE",
            false,
            Some("Reduce file size"),
            false,
            LogLevel::Debug,
        ),
        AppError::Unauthorized(_) => (
            401,
            "UNAUTHORIZED",
            false,
            Some("Check the request signature"),
            false,
            LogLevel::Debug,
        ),
        AppError::ChannelNotAllowed(_) => (
            403,
            "CHANNEL_NOT_ALLOWED",
            false,
            Some("Use the command in an allowed channel"),
            false,
            LogLevel::Debug,
        ),
        AppError::RateLimited { .. } => (
            429,
            "RATE_LIMITED",
            true,
            Some("Wait before using the command again"),
            false,
            LogLevel::Debug,
        ),
        AppError::TransferFailure(_) => (
            502,
            "TRANSFER_FAILURE",
            true,
            Some("The transfer is retried on the next relay cycle"),
            true,
            LogLevel::Warn,
        ),
        AppError::UnrecoverableLocalLoss(_) => (
            410,
            "STAGED_FILE_LOST",
            false,
            Some("Upload the file again"),
            false,
            LogLevel::Error,
        ),
        AppError::DeliveryFailure(_) => (
            502,
            "DELIVERY_FAILURE",
            false,
            None,
            true,
            LogLevel::Warn,
        ),
        AppError::NotRetrievable(_) => (
            404,
            "NOT_RETRIEVABLE",
            false,
            Some("Try again once the file has been relayed"),
            false,
            LogLevel::Debug,
        ),
        AppError::Internal(_) => (
            500,
            "INTERNAL_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
        AppError::InternalWithSource { .. } => (
            500,
            "INTERNAL_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
    }
}

impl AppError {
    /// Get the error type name for detailed error responses
    pub fn error_type(&self) -> &str {
        match self {
            AppError::Persistence(_) => "Persistence",
            AppError::StoreUnavailable(_) => "StoreUnavailable",
            AppError::NotFound(_) => "NotFound",
            AppError::InvalidInput(_) => "InvalidInput",
            AppError::BadRequest(_) => "BadRequest",
            AppError::PayloadTooLarge(_) => "PayloadTooLarge",
            AppError::Unauthorized(_) => "Unauthorized",
            AppError::ChannelNotAllowed(_) => "ChannelNotAllowed",
            AppError::RateLimited { .. } => "RateLimited",
            AppError::TransferFailure(_) => "TransferFailure",
            AppError::UnrecoverableLocalLoss(_) => "UnrecoverableLocalLoss",
            AppError::DeliveryFailure(_) => "DeliveryFailure",
            AppError::NotRetrievable(_) => "NotRetrievable",
            AppError::Internal(_) => "Internal",
            AppError::InternalWithSource { .. } => "Internal",
        }
    }

    /// Get detailed error information including error chain
    pub fn detailed_message(&self) -> String {
        use std::error::Error;

        let mut details = self.to_string();

        let mut source = self.source();
        let mut depth = 0;
        while let Some(err) = source {
            depth += 1;
            if depth > 5 {
                details.push_str("\n  ... (truncated)");
                break;
            }
            details.push_str(&format!("\n  Caused by: {}", err));
            source = err.source();
        }

        details
    }
}

impl ErrorMetadata for AppError {
    fn http_status_code(&self) -> u16 {
        app_error_static_metadata(self).0
    }

    fn error_code(&self) -> &'static str {
        app_error_static_metadata(self).1
    }

    fn is_recoverable(&self) -> bool {
        app_error_static_metadata(self).2
    }

    fn suggested_action(&self) -> Option<&'static str> {
        app_error_static_metadata(self).3
    }

    fn is_sensitive(&self) -> bool {
        app_error_static_metadata(self).4
    }

    fn log_level(&self) -> LogLevel {
        app_error_static_metadata(self).5
    }

    fn client_message(&self) -> String {
        match self {
            AppError::Persistence(_) => "Failed to access the database".to_string(),
            AppError::StoreUnavailable(_) => "The service is temporarily unavailable".to_string(),
            AppError::NotFound(ref msg) => msg.clone(),
            AppError::InvalidInput(ref msg) => msg.clone(),
            AppError::BadRequest(ref msg) => msg.clone(),
            AppError::PayloadTooLarge(ref msg) => msg.clone(),
            AppError::Unauthorized(ref msg) => msg.clone(),
            AppError::ChannelNotAllowed(_) => {
                "This command cannot be used in this channel.".to_string()
            }
            AppError::RateLimited { retry_after_secs } => format!(
                "You're using this command too quickly! Please wait {:.1} seconds.",
                retry_after_secs
            ),
            AppError::TransferFailure(_) => "Failed to transfer file to storage".to_string(),
            AppError::UnrecoverableLocalLoss(_) => {
                "The uploaded file is no longer available".to_string()
            }
            AppError::DeliveryFailure(_) => "Failed to deliver notification".to_string(),
            AppError::NotRetrievable(_) => "File not found or is still processing.".to_string(),
            AppError::Internal(_) => "Internal server error".to_string(),
            AppError::InternalWithSource { .. } => "Internal server error".to_string(),
        }
    }
}
