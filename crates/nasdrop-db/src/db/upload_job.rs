use chrono::{DateTime, Duration, Utc};
use nasdrop_core::{AppError, JobState, NewUploadJob, UploadJob};
use sqlx::SqlitePool;
use uuid::Uuid;

const JOB_COLUMNS: &str = r#"
    id, display_name, local_path, remote_path, state, requester_id, channel_id,
    content_type, size_bytes, attempts, retry_after_ms, created_at_ms, updated_at_ms
"#;

/// Upload lifecycle tracker.
///
/// Transitions are conditional updates: each one only applies when the job is in
/// a state the lifecycle allows it to leave. They return `Ok(true)` when the row
/// changed, `Ok(false)` when the job exists but was in a state the transition does
/// not apply to, and `NotFound` when there is no such job.
#[derive(Clone)]
pub struct UploadJobRepository {
    pool: SqlitePool,
}

impl UploadJobRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Record a freshly staged upload in state `received`.
    pub async fn create(&self, job: &NewUploadJob) -> Result<UploadJob, AppError> {
        self.create_at(job, Utc::now()).await
    }

    #[tracing::instrument(skip(self, job), fields(db.table = "upload_jobs", job_id = %job.id))]
    pub async fn create_at(
        &self,
        job: &NewUploadJob,
        now: DateTime<Utc>,
    ) -> Result<UploadJob, AppError> {
        let now_ms = now.timestamp_millis();

        sqlx::query(
            r#"
            INSERT INTO upload_jobs (
                id, display_name, local_path, remote_path, state, requester_id, channel_id,
                content_type, size_bytes, attempts, retry_after_ms, created_at_ms, updated_at_ms
            )
            VALUES (?, ?, ?, NULL, 'received', ?, ?, ?, ?, 0, NULL, ?, ?)
            "#,
        )
        .bind(job.id.to_string())
        .bind(&job.display_name)
        .bind(job.local_path.to_string_lossy().into_owned())
        .bind(&job.origin.requester_id)
        .bind(&job.origin.channel_id)
        .bind(&job.content_type)
        .bind(job.size_bytes)
        .bind(now_ms)
        .bind(now_ms)
        .execute(&self.pool)
        .await?;

        tracing::info!(
            display_name = %job.display_name,
            size_bytes = job.size_bytes,
            "Upload job created"
        );

        self.get(job.id)
            .await?
            .ok_or_else(|| AppError::Internal(format!("job {} vanished after insert", job.id)))
    }

    #[tracing::instrument(skip(self), fields(db.table = "upload_jobs"))]
    pub async fn get(&self, id: Uuid) -> Result<Option<UploadJob>, AppError> {
        let job = sqlx::query_as::<_, UploadJob>(&format!(
            "SELECT {} FROM upload_jobs WHERE id = ?",
            JOB_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(job)
    }

    /// All jobs currently in `state`, oldest first.
    ///
    /// This is a snapshot, not a lock: use [`Self::try_claim`] before acting on a
    /// `received` job.
    #[tracing::instrument(skip(self), fields(db.table = "upload_jobs"))]
    pub async fn claim_batch(&self, state: JobState) -> Result<Vec<UploadJob>, AppError> {
        let jobs = sqlx::query_as::<_, UploadJob>(&format!(
            "SELECT {} FROM upload_jobs WHERE state = ? ORDER BY created_at_ms ASC, id ASC",
            JOB_COLUMNS
        ))
        .bind(state.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(jobs)
    }

    /// Most recent jobs, optionally filtered by state.
    #[tracing::instrument(skip(self), fields(db.table = "upload_jobs"))]
    pub async fn list(
        &self,
        state: Option<JobState>,
        limit: i64,
    ) -> Result<Vec<UploadJob>, AppError> {
        let jobs = match state {
            Some(state) => {
                sqlx::query_as::<_, UploadJob>(&format!(
                    "SELECT {} FROM upload_jobs WHERE state = ? ORDER BY created_at_ms DESC LIMIT ?",
                    JOB_COLUMNS
                ))
                .bind(state.as_str())
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, UploadJob>(&format!(
                    "SELECT {} FROM upload_jobs ORDER BY created_at_ms DESC LIMIT ?",
                    JOB_COLUMNS
                ))
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(jobs)
    }

    /// Compare-and-set `received → relaying`.
    ///
    /// Returns `true` only for the single caller that won the job.
    pub async fn try_claim(&self, id: Uuid) -> Result<bool, AppError> {
        self.try_claim_at(id, Utc::now()).await
    }

    #[tracing::instrument(skip(self), fields(db.table = "upload_jobs"))]
    pub async fn try_claim_at(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE upload_jobs
            SET state = 'relaying', updated_at_ms = ?
            WHERE id = ? AND state = 'received'
            "#,
        )
        .bind(now.timestamp_millis())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        self.transition_outcome(id, result.rows_affected()).await
    }

    /// `received → relaying`, tolerating re-entry from `relaying`.
    #[tracing::instrument(skip(self), fields(db.table = "upload_jobs"))]
    pub async fn mark_relaying(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE upload_jobs
            SET state = 'relaying', updated_at_ms = ?
            WHERE id = ? AND state IN ('received', 'relaying')
            "#,
        )
        .bind(Utc::now().timestamp_millis())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        self.transition_outcome(id, result.rows_affected()).await
    }

    /// `relaying → stored`; the remote location becomes permanent.
    #[tracing::instrument(skip(self), fields(db.table = "upload_jobs"))]
    pub async fn mark_stored(&self, id: Uuid, remote_path: &str) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE upload_jobs
            SET state = 'stored', remote_path = ?, retry_after_ms = NULL, updated_at_ms = ?
            WHERE id = ? AND state = 'relaying'
            "#,
        )
        .bind(remote_path)
        .bind(Utc::now().timestamp_millis())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        self.transition_outcome(id, result.rows_affected()).await
    }

    /// Any non-final state → `error`. A stored job is never touched.
    #[tracing::instrument(skip(self), fields(db.table = "upload_jobs"))]
    pub async fn mark_error(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE upload_jobs
            SET state = 'error', retry_after_ms = NULL, updated_at_ms = ?
            WHERE id = ? AND state != 'stored'
            "#,
        )
        .bind(Utc::now().timestamp_millis())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        self.transition_outcome(id, result.rows_affected()).await
    }

    /// `relaying → received` after a failed transfer.
    ///
    /// Counts the attempt and, when `retry_after` is given, keeps the relay away
    /// from the job until then.
    #[tracing::instrument(skip(self), fields(db.table = "upload_jobs"))]
    pub async fn retry(
        &self,
        id: Uuid,
        retry_after: Option<DateTime<Utc>>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE upload_jobs
            SET state = 'received', attempts = attempts + 1, retry_after_ms = ?, updated_at_ms = ?
            WHERE id = ? AND state = 'relaying'
            "#,
        )
        .bind(retry_after.map(|t| t.timestamp_millis()))
        .bind(Utc::now().timestamp_millis())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        self.transition_outcome(id, result.rows_affected()).await
    }

    /// Operator action: put an `error` job back in the queue with a clean slate.
    #[tracing::instrument(skip(self), fields(db.table = "upload_jobs"))]
    pub async fn requeue_failed(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE upload_jobs
            SET state = 'received', attempts = 0, retry_after_ms = NULL, updated_at_ms = ?
            WHERE id = ? AND state = 'error'
            "#,
        )
        .bind(Utc::now().timestamp_millis())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        self.transition_outcome(id, result.rows_affected()).await
    }

    /// Hand `relaying` jobs untouched for longer than `grace` back to `received`.
    pub async fn reap_stale_relaying(&self, grace: Duration) -> Result<u64, AppError> {
        self.reap_stale_relaying_at(grace, Utc::now()).await
    }

    #[tracing::instrument(skip(self), fields(db.table = "upload_jobs"))]
    pub async fn reap_stale_relaying_at(
        &self,
        grace: Duration,
        now: DateTime<Utc>,
    ) -> Result<u64, AppError> {
        let cutoff = (now - grace).timestamp_millis();
        let result = sqlx::query(
            r#"
            UPDATE upload_jobs
            SET state = 'received', updated_at_ms = ?
            WHERE state = 'relaying' AND updated_at_ms < ?
            "#,
        )
        .bind(now.timestamp_millis())
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        let reaped = result.rows_affected();
        if reaped > 0 {
            tracing::warn!(reaped, "Returned stale relaying jobs to received");
        }
        Ok(reaped)
    }

    /// Stored jobs still holding a staged copy, last updated before `cutoff`.
    #[tracing::instrument(skip(self), fields(db.table = "upload_jobs"))]
    pub async fn stored_with_local_copy_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<UploadJob>, AppError> {
        let jobs = sqlx::query_as::<_, UploadJob>(&format!(
            r#"
            SELECT {} FROM upload_jobs
            WHERE state = 'stored' AND local_path IS NOT NULL AND updated_at_ms < ?
            ORDER BY updated_at_ms ASC
            "#,
            JOB_COLUMNS
        ))
        .bind(cutoff.timestamp_millis())
        .fetch_all(&self.pool)
        .await?;

        Ok(jobs)
    }

    /// Forget the staged copy of a stored job.
    #[tracing::instrument(skip(self), fields(db.table = "upload_jobs"))]
    pub async fn clear_local_path(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE upload_jobs
            SET local_path = NULL
            WHERE id = ? AND state = 'stored'
            "#,
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        self.transition_outcome(id, result.rows_affected()).await
    }

    async fn transition_outcome(&self, id: Uuid, rows_affected: u64) -> Result<bool, AppError> {
        if rows_affected > 0 {
            return Ok(true);
        }

        let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM upload_jobs WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        match exists {
            Some(_) => Ok(false),
            None => Err(AppError::NotFound(format!("upload job {} not found", id))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connect_in_memory;
    use nasdrop_core::OriginIdentity;
    use std::path::PathBuf;

    async fn repo() -> UploadJobRepository {
        UploadJobRepository::new(connect_in_memory().await.unwrap())
    }

    fn new_job(name: &str) -> NewUploadJob {
        let id = Uuid::new_v4();
        NewUploadJob {
            id,
            display_name: name.to_string(),
            local_path: PathBuf::from(format!("/staging/{}_{}", id, name)),
            origin: OriginIdentity::new("1", "2"),
            content_type: Some("application/pdf".to_string()),
            size_bytes: 1234,
        }
    }

    async fn state_of(repo: &UploadJobRepository, id: Uuid) -> JobState {
        repo.get(id).await.unwrap().unwrap().state
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let repo = repo().await;
        let new = new_job("report.pdf");

        let created = repo.create(&new).await.unwrap();
        let fetched = repo.get(new.id).await.unwrap().unwrap();

        assert_eq!(created.id, new.id);
        assert_eq!(fetched.display_name, "report.pdf");
        assert_eq!(fetched.origin, OriginIdentity::new("1", "2"));
        assert_eq!(fetched.state, JobState::Received);
        assert_eq!(fetched.local_path, Some(new.local_path.clone()));
        assert_eq!(fetched.remote_path, None);
        assert_eq!(fetched.size_bytes, 1234);
        assert_eq!(fetched.attempts, 0);
    }

    #[tokio::test]
    async fn duplicate_create_is_a_persistence_error() {
        let repo = repo().await;
        let new = new_job("a.txt");
        repo.create(&new).await.unwrap();

        let err = repo.create(&new).await.unwrap_err();
        assert!(matches!(err, AppError::Persistence(_)));
    }

    #[tokio::test]
    async fn get_unknown_is_none() {
        let repo = repo().await;
        assert!(repo.get(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn happy_path_reaches_stored() {
        let repo = repo().await;
        let job = repo.create(&new_job("f.bin")).await.unwrap();

        assert!(repo.mark_relaying(job.id).await.unwrap());
        assert!(repo.mark_relaying(job.id).await.unwrap());
        assert!(repo
            .mark_stored(job.id, "/DiscordUploads/f.bin")
            .await
            .unwrap());

        let stored = repo.get(job.id).await.unwrap().unwrap();
        assert_eq!(stored.state, JobState::Stored);
        assert_eq!(stored.remote_path.as_deref(), Some("/DiscordUploads/f.bin"));
    }

    #[tokio::test]
    async fn stored_is_never_left() {
        let repo = repo().await;
        let job = repo.create(&new_job("f.bin")).await.unwrap();
        repo.mark_relaying(job.id).await.unwrap();
        repo.mark_stored(job.id, "/r/f.bin").await.unwrap();

        assert!(!repo.mark_error(job.id).await.unwrap());
        assert!(!repo.retry(job.id, None).await.unwrap());
        assert!(!repo.mark_relaying(job.id).await.unwrap());
        assert!(!repo.try_claim(job.id).await.unwrap());
        assert!(!repo.mark_stored(job.id, "/elsewhere").await.unwrap());

        let job = repo.get(job.id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Stored);
        assert_eq!(job.remote_path.as_deref(), Some("/r/f.bin"));
    }

    #[tokio::test]
    async fn mark_stored_requires_relaying() {
        let repo = repo().await;
        let job = repo.create(&new_job("f.bin")).await.unwrap();
        assert!(!repo.mark_stored(job.id, "/r/f.bin").await.unwrap());
        assert_eq!(state_of(&repo, job.id).await, JobState::Received);
    }

    #[tokio::test]
    async fn transitions_on_unknown_job_are_not_found() {
        let repo = repo().await;
        let id = Uuid::new_v4();
        assert!(matches!(
            repo.mark_relaying(id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(repo.mark_error(id).await, Err(AppError::NotFound(_))));
        assert!(matches!(
            repo.retry(id, None).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn lost_staged_file_is_excluded_from_next_batch() {
        let repo = repo().await;
        let job = repo.create(&new_job("f2")).await.unwrap();
        repo.mark_relaying(job.id).await.unwrap();

        assert!(repo.mark_error(job.id).await.unwrap());

        let batch = repo.claim_batch(JobState::Received).await.unwrap();
        assert!(batch.iter().all(|j| j.id != job.id));
        assert_eq!(state_of(&repo, job.id).await, JobState::Error);
    }

    #[tokio::test]
    async fn retry_returns_job_to_batch() {
        let repo = repo().await;
        let job = repo.create(&new_job("f3")).await.unwrap();
        assert!(repo.try_claim(job.id).await.unwrap());
        assert!(repo
            .claim_batch(JobState::Received)
            .await
            .unwrap()
            .is_empty());

        assert!(repo.retry(job.id, None).await.unwrap());

        let batch = repo.claim_batch(JobState::Received).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].id, job.id);
        assert_eq!(batch[0].attempts, 1);
    }

    #[tokio::test]
    async fn retry_records_backoff() {
        let repo = repo().await;
        let job = repo.create(&new_job("f")).await.unwrap();
        repo.try_claim(job.id).await.unwrap();

        let after = Utc::now() + Duration::seconds(60);
        repo.retry(job.id, Some(after)).await.unwrap();

        let job = repo.get(job.id).await.unwrap().unwrap();
        assert_eq!(
            job.retry_after.map(|t| t.timestamp_millis()),
            Some(after.timestamp_millis())
        );
        assert!(!job.is_due(Utc::now()));
    }

    #[tokio::test]
    async fn only_one_claim_wins() {
        let repo = repo().await;
        let job = repo.create(&new_job("race")).await.unwrap();

        let first = repo.try_claim(job.id).await.unwrap();
        let second = repo.try_claim(job.id).await.unwrap();
        assert!(first);
        assert!(!second);
    }

    #[tokio::test]
    async fn claim_batch_is_oldest_first() {
        let repo = repo().await;
        let t0 = Utc::now();
        let late = repo
            .create_at(&new_job("late"), t0 + Duration::seconds(10))
            .await
            .unwrap();
        let early = repo.create_at(&new_job("early"), t0).await.unwrap();

        let batch = repo.claim_batch(JobState::Received).await.unwrap();
        let ids: Vec<Uuid> = batch.iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![early.id, late.id]);
    }

    #[tokio::test]
    async fn requeue_failed_resets_attempts() {
        let repo = repo().await;
        let job = repo.create(&new_job("x")).await.unwrap();
        repo.try_claim(job.id).await.unwrap();
        repo.retry(job.id, None).await.unwrap();
        repo.mark_error(job.id).await.unwrap();

        assert!(repo.requeue_failed(job.id).await.unwrap());
        let job = repo.get(job.id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Received);
        assert_eq!(job.attempts, 0);

        // Not in error any more
        assert!(!repo.requeue_failed(job.id).await.unwrap());
    }

    #[tokio::test]
    async fn stale_relaying_jobs_are_reaped() {
        let repo = repo().await;
        let job = repo.create(&new_job("stale")).await.unwrap();
        let claimed_at = Utc::now();
        repo.try_claim_at(job.id, claimed_at).await.unwrap();

        let grace = Duration::seconds(60);
        assert_eq!(
            repo.reap_stale_relaying_at(grace, claimed_at + Duration::seconds(30))
                .await
                .unwrap(),
            0
        );
        assert_eq!(
            repo.reap_stale_relaying_at(grace, claimed_at + Duration::seconds(61))
                .await
                .unwrap(),
            1
        );
        assert_eq!(state_of(&repo, job.id).await, JobState::Received);
    }

    #[tokio::test]
    async fn cleanup_candidates_and_clearing_local_path() {
        let repo = repo().await;
        let job = repo.create(&new_job("old")).await.unwrap();
        let pending = repo.create(&new_job("pending")).await.unwrap();
        repo.mark_relaying(job.id).await.unwrap();
        repo.mark_stored(job.id, "/r/old").await.unwrap();

        let future = Utc::now() + Duration::days(1);
        let candidates = repo.stored_with_local_copy_before(future).await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, job.id);

        assert!(repo.clear_local_path(job.id).await.unwrap());
        assert!(!repo.clear_local_path(pending.id).await.unwrap());
        assert!(repo
            .stored_with_local_copy_before(future)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn list_filters_by_state() {
        let repo = repo().await;
        let a = repo.create(&new_job("a")).await.unwrap();
        repo.create(&new_job("b")).await.unwrap();
        repo.mark_error(a.id).await.unwrap();

        assert_eq!(repo.list(None, 10).await.unwrap().len(), 2);
        let errors = repo.list(Some(JobState::Error), 10).await.unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].id, a.id);
        assert_eq!(repo.list(None, 1).await.unwrap().len(), 1);
    }
}
