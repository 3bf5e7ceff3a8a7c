pub mod notification;
pub mod token;
pub mod upload_job;

pub use notification::Notification;
pub use token::{OriginIdentity, Token};
pub use upload_job::{ContentSource, JobState, NewUploadJob, UploadJob};

use chrono::{DateTime, Utc};

/// Timestamps are persisted as epoch milliseconds.
pub fn from_epoch_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}
