//! Actors coordinating through one file-backed store.
//!
//! Each actor opens its own pool, as the separate processes do in production.
//! Run with: `cargo test -p nasdrop-db --test coordination_test`

use chrono::{Duration, Utc};
use nasdrop_core::{Config, JobState, NewUploadJob, OriginIdentity};
use nasdrop_db::{connect, NotificationRepository, TokenRepository, UploadJobRepository};
use tempfile::TempDir;
use uuid::Uuid;

struct Actors {
    _dir: TempDir,
    front_tokens: TokenRepository,
    front_outbox: NotificationRepository,
    ingress_tokens: TokenRepository,
    ingress_jobs: UploadJobRepository,
    ingress_outbox: NotificationRepository,
    relay_jobs: UploadJobRepository,
}

async fn actors() -> Actors {
    let dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.base.database_path = dir.path().join("db").join("metadata.db");
    let ttl = Duration::seconds(config.base.token_expiry_seconds);

    // Three independent pools against the same file
    let front = connect(&config).await.unwrap();
    let ingress = connect(&config).await.unwrap();
    let relay = connect(&config).await.unwrap();

    Actors {
        _dir: dir,
        front_tokens: TokenRepository::new(front.clone(), ttl),
        front_outbox: NotificationRepository::new(front),
        ingress_tokens: TokenRepository::new(ingress.clone(), ttl),
        ingress_jobs: UploadJobRepository::new(ingress.clone()),
        ingress_outbox: NotificationRepository::new(ingress),
        relay_jobs: UploadJobRepository::new(relay),
    }
}

fn new_job(name: &str, origin: &OriginIdentity) -> NewUploadJob {
    let id = Uuid::new_v4();
    NewUploadJob {
        id,
        display_name: name.to_string(),
        local_path: format!("/staging/{}_{}", id, name).into(),
        origin: origin.clone(),
        content_type: None,
        size_bytes: 10,
    }
}

#[tokio::test]
async fn upload_flows_from_command_to_notice_to_storage() {
    let a = actors().await;
    let origin = OriginIdentity::new("1", "2");

    // Command front hands out a link
    let token = a.front_tokens.issue(&origin).await.unwrap();

    // Web ingress accepts the upload
    let redeemed = a.ingress_tokens.redeem(&token.token).await.unwrap();
    assert_eq!(redeemed, Some(origin.clone()));
    let job = a
        .ingress_jobs
        .create(&new_job("report.pdf", &origin))
        .await
        .unwrap();
    a.ingress_outbox
        .enqueue(job.id, &origin, &job.display_name)
        .await
        .unwrap();
    a.ingress_tokens.invalidate(&token.token).await.unwrap();

    // The link is dead for everyone
    assert_eq!(a.front_tokens.redeem(&token.token).await.unwrap(), None);

    // Command front sees the notice
    let pending = a.front_outbox.drain().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].job_id, job.id);
    assert_eq!(pending[0].origin, origin);
    a.front_outbox.delete(pending[0].id).await.unwrap();
    assert!(a.front_outbox.drain().await.unwrap().is_empty());

    // Relay picks the job up and stores it
    let batch = a.relay_jobs.claim_batch(JobState::Received).await.unwrap();
    assert_eq!(batch.iter().map(|j| j.id).collect::<Vec<_>>(), vec![job.id]);
    assert!(a.relay_jobs.try_claim(job.id).await.unwrap());
    assert!(a
        .relay_jobs
        .mark_stored(job.id, "/DiscordUploads/x_report.pdf")
        .await
        .unwrap());

    // The ingress read path observes the relay's write
    let seen = a.ingress_jobs.get(job.id).await.unwrap().unwrap();
    assert_eq!(seen.state, JobState::Stored);
    assert_eq!(
        seen.remote_path.as_deref(),
        Some("/DiscordUploads/x_report.pdf")
    );
}

#[tokio::test]
async fn transient_failure_returns_job_to_queue() {
    let a = actors().await;
    let job = a
        .ingress_jobs
        .create(&new_job("f3.bin", &OriginIdentity::new("1", "2")))
        .await
        .unwrap();

    assert!(a.relay_jobs.try_claim(job.id).await.unwrap());
    assert!(a.relay_jobs.retry(job.id, None).await.unwrap());

    let batch = a.relay_jobs.claim_batch(JobState::Received).await.unwrap();
    assert!(batch.iter().any(|j| j.id == job.id));
    assert_eq!(a.ingress_jobs.get(job.id).await.unwrap().unwrap().attempts, 1);
}

#[tokio::test]
async fn lost_staged_file_leaves_queue_for_good() {
    let a = actors().await;
    let job = a
        .ingress_jobs
        .create(&new_job("f2.bin", &OriginIdentity::new("1", "2")))
        .await
        .unwrap();

    assert!(a.relay_jobs.try_claim(job.id).await.unwrap());
    assert!(a.relay_jobs.mark_error(job.id).await.unwrap());

    assert!(a
        .relay_jobs
        .claim_batch(JobState::Received)
        .await
        .unwrap()
        .is_empty());
    assert_eq!(
        a.ingress_jobs.get(job.id).await.unwrap().unwrap().state,
        JobState::Error
    );
}

#[tokio::test]
async fn second_relay_cannot_claim_a_taken_job() {
    let a = actors().await;
    let job = a
        .ingress_jobs
        .create(&new_job("race.bin", &OriginIdentity::new("1", "2")))
        .await
        .unwrap();

    // The ingress pool stands in for a second relay instance
    assert!(a.relay_jobs.try_claim(job.id).await.unwrap());
    assert!(!a.ingress_jobs.try_claim(job.id).await.unwrap());
}

#[tokio::test]
async fn token_expires_for_every_actor() {
    let a = actors().await;
    let issued_at = Utc::now() - Duration::hours(2);
    let token = a
        .front_tokens
        .issue_at(&OriginIdentity::new("1", "2"), issued_at)
        .await
        .unwrap();

    assert_eq!(a.ingress_tokens.redeem(&token.token).await.unwrap(), None);
    assert_eq!(a.ingress_tokens.sweep_expired().await.unwrap(), 1);
    assert_eq!(a.front_tokens.count().await.unwrap(), 0);
}
