use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::OriginIdentity;

/// Pending "your file is ready" notice for the origin channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    /// Insertion-ordered id; ties on `created_at` are broken by it.
    pub id: i64,
    pub job_id: Uuid,
    pub origin: OriginIdentity,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(feature = "sqlx")]
impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for Notification {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;

        let job_id: String = row.try_get("job_id")?;
        Ok(Notification {
            id: row.try_get("id")?,
            job_id: Uuid::parse_str(&job_id).map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
            origin: OriginIdentity {
                requester_id: row.try_get("requester_id")?,
                channel_id: row.try_get("channel_id")?,
            },
            display_name: row.try_get("display_name")?,
            created_at: super::from_epoch_millis(row.try_get("created_at_ms")?),
        })
    }
}
