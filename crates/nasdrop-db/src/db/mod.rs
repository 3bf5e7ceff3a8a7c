//! Repositories, one per record family.
//!
//! Time-dependent operations have an `*_at(now)` form so callers (and tests) can
//! pin the clock; the plain form uses `Utc::now()`.

pub mod notification;
pub mod token;
pub mod upload_job;

pub use notification::NotificationRepository;
pub use token::TokenRepository;
pub use upload_job::UploadJobRepository;
