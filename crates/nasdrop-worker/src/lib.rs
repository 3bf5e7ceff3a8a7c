//! Storage relay and background maintenance.
//!
//! [`RelayWorker`] moves staged uploads to remote storage and advances their
//! lifecycle. [`StagingCleanupService`] frees local staging space once a job is
//! stored and sweeps expired upload tokens.

pub mod cleanup;
pub mod relay;

pub use cleanup::{CleanupReport, StagingCleanupService};
pub use relay::{RelayReport, RelayWorker, RelayWorkerConfig, MAX_RETRY_BACKOFF_SECS};
