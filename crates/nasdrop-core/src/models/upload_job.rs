use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

use super::OriginIdentity;
use crate::AppError;

/// Lifecycle of an uploaded file.
///
/// `received → relaying → stored | error`, with `relaying → received` when a
/// transfer fails transiently. `stored` never changes again.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Received,
    Relaying,
    Stored,
    Error,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Received => "received",
            JobState::Relaying => "relaying",
            JobState::Stored => "stored",
            JobState::Error => "error",
        }
    }

    /// Whether content is expected to be served from local staging.
    pub fn serves_locally(&self) -> bool {
        matches!(
            self,
            JobState::Received | JobState::Relaying | JobState::Error
        )
    }
}

impl Display for JobState {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "received" => Ok(JobState::Received),
            "relaying" => Ok(JobState::Relaying),
            "stored" => Ok(JobState::Stored),
            "error" => Ok(JobState::Error),
            _ => Err(anyhow::anyhow!("Invalid job state: {}", s)),
        }
    }
}

/// Fields supplied by the web ingress when a payload has been staged.
#[derive(Debug, Clone)]
pub struct NewUploadJob {
    pub id: Uuid,
    pub display_name: String,
    pub local_path: PathBuf,
    pub origin: OriginIdentity,
    pub content_type: Option<String>,
    pub size_bytes: i64,
}

/// One tracked upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadJob {
    pub id: Uuid,
    pub display_name: String,
    pub local_path: Option<PathBuf>,
    pub remote_path: Option<String>,
    pub state: JobState,
    pub origin: OriginIdentity,
    pub content_type: Option<String>,
    pub size_bytes: i64,
    /// Failed transfer attempts so far.
    pub attempts: i32,
    /// Earliest time the relay may pick the job up again.
    pub retry_after: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Where the bytes of a job should be read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentSource {
    Local(PathBuf),
    Remote(String),
}

impl UploadJob {
    /// Whether the relay may attempt the job at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.retry_after.map(|t| t <= now).unwrap_or(true)
    }

    /// Resolve the authoritative copy for serving.
    ///
    /// `local_exists` reports whether the staged file is still on disk.
    pub fn content_source(&self, local_exists: bool) -> Result<ContentSource, AppError> {
        match (self.state, &self.local_path, &self.remote_path) {
            (state, Some(local), _) if state.serves_locally() && local_exists => {
                Ok(ContentSource::Local(local.clone()))
            }
            (JobState::Stored, _, Some(remote)) => Ok(ContentSource::Remote(remote.clone())),
            _ => Err(AppError::NotRetrievable(format!(
                "job {} in state {} has no readable copy",
                self.id, self.state
            ))),
        }
    }
}

#[cfg(feature = "sqlx")]
impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for UploadJob {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;

        let id: String = row.try_get("id")?;
        let state: String = row.try_get("state")?;
        let local_path: Option<String> = row.try_get("local_path")?;
        let retry_after_ms: Option<i64> = row.try_get("retry_after_ms")?;

        Ok(UploadJob {
            id: Uuid::parse_str(&id).map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
            display_name: row.try_get("display_name")?,
            local_path: local_path.map(PathBuf::from),
            remote_path: row.try_get("remote_path")?,
            state: state
                .parse()
                .map_err(|e: anyhow::Error| sqlx::Error::Decode(e.into()))?,
            origin: OriginIdentity {
                requester_id: row.try_get("requester_id")?,
                channel_id: row.try_get("channel_id")?,
            },
            content_type: row.try_get("content_type")?,
            size_bytes: row.try_get("size_bytes")?,
            attempts: row.try_get("attempts")?,
            retry_after: retry_after_ms.map(super::from_epoch_millis),
            created_at: super::from_epoch_millis(row.try_get("created_at_ms")?),
            updated_at: super::from_epoch_millis(row.try_get("updated_at_ms")?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(state: JobState) -> UploadJob {
        let now = Utc::now();
        UploadJob {
            id: Uuid::new_v4(),
            display_name: "report.pdf".to_string(),
            local_path: Some(PathBuf::from("/tmp/staged/report.pdf")),
            remote_path: None,
            state,
            origin: OriginIdentity::new("1", "2"),
            content_type: Some("application/pdf".to_string()),
            size_bytes: 10,
            attempts: 0,
            retry_after: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn state_round_trips_through_text() {
        for state in [
            JobState::Received,
            JobState::Relaying,
            JobState::Stored,
            JobState::Error,
        ] {
            assert_eq!(state.to_string().parse::<JobState>().unwrap(), state);
        }
        assert!("uploading_to_nas".parse::<JobState>().is_err());
    }

    #[test]
    fn received_job_served_locally() {
        let j = job(JobState::Received);
        assert_eq!(
            j.content_source(true).unwrap(),
            ContentSource::Local(PathBuf::from("/tmp/staged/report.pdf"))
        );
        assert!(matches!(
            j.content_source(false),
            Err(AppError::NotRetrievable(_))
        ));
    }

    #[test]
    fn errored_job_with_local_copy_is_served() {
        let j = job(JobState::Error);
        assert!(matches!(j.content_source(true), Ok(ContentSource::Local(_))));
    }

    #[test]
    fn stored_job_served_remotely() {
        let mut j = job(JobState::Stored);
        j.remote_path = Some("/DiscordUploads/x_report.pdf".to_string());
        assert_eq!(
            j.content_source(true).unwrap(),
            ContentSource::Remote("/DiscordUploads/x_report.pdf".to_string())
        );
    }

    #[test]
    fn stored_job_without_remote_is_not_retrievable() {
        let mut j = job(JobState::Stored);
        j.local_path = None;
        assert!(matches!(
            j.content_source(false),
            Err(AppError::NotRetrievable(_))
        ));
    }

    #[test]
    fn due_when_no_backoff_pending() {
        let mut j = job(JobState::Received);
        let now = Utc::now();
        assert!(j.is_due(now));
        j.retry_after = Some(now + chrono::Duration::seconds(30));
        assert!(!j.is_due(now));
        assert!(j.is_due(now + chrono::Duration::seconds(30)));
    }
}
