//! nasdrop core library
//!
//! Domain models, error types, configuration and process plumbing shared by the
//! command front, the web ingress and the storage relay.

pub mod config;
pub mod error;
pub mod models;
pub mod shutdown;
pub mod storage_types;
pub mod telemetry;

// Re-export commonly used types
pub use config::{BaseConfig, ChatConfig, Config, RelayConfig, StorageConfig, WebConfig};
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use models::{
    ContentSource, JobState, NewUploadJob, Notification, OriginIdentity, Token, UploadJob,
};
pub use shutdown::shutdown_signal;
pub use storage_types::RemoteBackend;
pub use telemetry::init_tracing;
