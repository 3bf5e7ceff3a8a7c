use chrono::{DateTime, Utc};
use nasdrop_core::{AppError, Notification, OriginIdentity};
use sqlx::SqlitePool;
use uuid::Uuid;

/// Outbox of completion notices.
#[derive(Clone)]
pub struct NotificationRepository {
    pool: SqlitePool,
}

impl NotificationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append a notice for `job_id` and return its id.
    pub async fn enqueue(
        &self,
        job_id: Uuid,
        origin: &OriginIdentity,
        display_name: &str,
    ) -> Result<i64, AppError> {
        self.enqueue_at(job_id, origin, display_name, Utc::now())
            .await
    }

    #[tracing::instrument(skip(self, origin, display_name), fields(db.table = "notifications"))]
    pub async fn enqueue_at(
        &self,
        job_id: Uuid,
        origin: &OriginIdentity,
        display_name: &str,
        now: DateTime<Utc>,
    ) -> Result<i64, AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO notifications (job_id, requester_id, channel_id, display_name, created_at_ms)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(job_id.to_string())
        .bind(&origin.requester_id)
        .bind(&origin.channel_id)
        .bind(display_name)
        .bind(now.timestamp_millis())
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        tracing::debug!(notification_id = id, "Notification enqueued");
        Ok(id)
    }

    /// Every pending notice, oldest first. Nothing is taken; delete after delivery.
    #[tracing::instrument(skip(self), fields(db.table = "notifications"))]
    pub async fn drain(&self) -> Result<Vec<Notification>, AppError> {
        let rows = sqlx::query_as::<_, Notification>(
            r#"
            SELECT id, job_id, requester_id, channel_id, display_name, created_at_ms
            FROM notifications
            ORDER BY created_at_ms ASC, id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Remove one notice. Removing an unknown id is not an error.
    #[tracing::instrument(skip(self), fields(db.table = "notifications"))]
    pub async fn delete(&self, id: i64) -> Result<(), AppError> {
        sqlx::query("DELETE FROM notifications WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connect_in_memory;
    use chrono::Duration;

    async fn repo() -> NotificationRepository {
        NotificationRepository::new(connect_in_memory().await.unwrap())
    }

    #[tokio::test]
    async fn enqueue_drain_delete() {
        let repo = repo().await;
        let job_id = Uuid::new_v4();
        let origin = OriginIdentity::new("1", "2");

        let id = repo.enqueue(job_id, &origin, "report.pdf").await.unwrap();

        let pending = repo.drain().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, id);
        assert_eq!(pending[0].job_id, job_id);
        assert_eq!(pending[0].origin, origin);
        assert_eq!(pending[0].display_name, "report.pdf");

        // Draining again still sees it
        assert_eq!(repo.drain().await.unwrap().len(), 1);

        repo.delete(id).await.unwrap();
        assert!(repo.drain().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let repo = repo().await;
        let id = repo
            .enqueue(Uuid::new_v4(), &OriginIdentity::new("1", "2"), "a")
            .await
            .unwrap();
        repo.delete(id).await.unwrap();
        repo.delete(id).await.unwrap();
        repo.delete(9999).await.unwrap();
    }

    #[tokio::test]
    async fn drain_is_fifo() {
        let repo = repo().await;
        let origin = OriginIdentity::new("1", "2");
        let now = Utc::now();

        let mut ids = Vec::new();
        for i in 0..5 {
            // Same timestamp for all: order falls back to insertion id
            ids.push(
                repo.enqueue_at(Uuid::new_v4(), &origin, &format!("f{}", i), now)
                    .await
                    .unwrap(),
            );
        }

        let drained: Vec<i64> = repo.drain().await.unwrap().iter().map(|n| n.id).collect();
        assert_eq!(drained, ids);
        let mut sorted = drained.clone();
        sorted.sort();
        assert_eq!(drained, sorted);
    }

    #[tokio::test]
    async fn drain_orders_by_creation_time_first() {
        let repo = repo().await;
        let origin = OriginIdentity::new("1", "2");
        let now = Utc::now();

        let newer = repo
            .enqueue_at(Uuid::new_v4(), &origin, "newer", now + Duration::seconds(5))
            .await
            .unwrap();
        let older = repo
            .enqueue_at(Uuid::new_v4(), &origin, "older", now)
            .await
            .unwrap();

        let drained: Vec<i64> = repo.drain().await.unwrap().iter().map(|n| n.id).collect();
        assert_eq!(drained, vec![older, newer]);
    }
}
