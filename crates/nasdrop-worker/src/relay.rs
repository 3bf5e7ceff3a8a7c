//! Relay: poll for `received` jobs and copy them to remote storage.
//!
//! Shutdown: [`RelayWorker::run`] stops between cycles. A cycle that is already
//! running finishes its batch first.

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use nasdrop_core::{AppError, Config, JobState, UploadJob};
use nasdrop_db::UploadJobRepository;
use nasdrop_storage::{remote_path_for, RemoteStorage, StorageError};

/// Maximum delay in seconds before retrying a failed transfer. Caps exponential
/// backoff so that high attempt counts do not produce excessively long delays.
pub const MAX_RETRY_BACKOFF_SECS: u64 = 300;

/// Computes backoff in seconds for a given attempt count (exponential with cap).
#[inline]
pub(crate) fn compute_retry_backoff_seconds(attempts: i32) -> u64 {
    2_u64
        .checked_pow(attempts.max(0) as u32)
        .unwrap_or(u64::MAX)
        .min(MAX_RETRY_BACKOFF_SECS)
}

#[derive(Clone, Debug)]
pub struct RelayWorkerConfig {
    /// Remote base folder, e.g. `/DiscordUploads`.
    pub target_folder: String,
    pub poll_interval: Duration,
    /// Transfer attempts before a job is given up; 0 = unbounded.
    pub max_attempts: u32,
    pub transfer_timeout: Duration,
    /// Interval between runs of the stale claim reaper.
    pub stale_reap_interval: Duration,
    /// `relaying` jobs untouched for this long are handed back to `received`.
    pub stale_claim_grace: chrono::Duration,
}

impl Default for RelayWorkerConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl RelayWorkerConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            target_folder: config.storage.target_folder.clone(),
            poll_interval: Duration::from_secs(config.relay.interval_seconds),
            max_attempts: config.relay.max_attempts,
            transfer_timeout: Duration::from_secs(config.relay.transfer_timeout_seconds),
            stale_reap_interval: Duration::from_secs(60),
            stale_claim_grace: chrono::Duration::seconds(config.relay.stale_claim_seconds),
        }
    }
}

/// Outcome counts of one relay cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RelayReport {
    /// Jobs returned by `claim_batch`.
    pub examined: usize,
    pub stored: usize,
    /// Failed transfers sent back to `received`.
    pub retried: usize,
    /// Jobs moved to `error`.
    pub failed: usize,
    /// Jobs not yet due, claimed by another relay, or moved on by someone
    /// else before their outcome could be recorded.
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy)]
enum Outcome {
    Stored,
    Retried,
    Failed,
}

impl RelayReport {
    /// Count an outcome, or a skip when the state change did not apply.
    fn record(&mut self, outcome: Outcome, applied: bool) {
        if !applied {
            tracing::warn!(?outcome, "Job changed state during relay, outcome not recorded");
            self.skipped += 1;
            return;
        }
        match outcome {
            Outcome::Stored => self.stored += 1,
            Outcome::Retried => self.retried += 1,
            Outcome::Failed => self.failed += 1,
        }
    }
}

pub struct RelayWorker {
    jobs: UploadJobRepository,
    storage: Arc<dyn RemoteStorage>,
    config: RelayWorkerConfig,
}

impl RelayWorker {
    pub fn new(
        jobs: UploadJobRepository,
        storage: Arc<dyn RemoteStorage>,
        config: RelayWorkerConfig,
    ) -> Self {
        Self {
            jobs,
            storage,
            config,
        }
    }

    /// Run one cycle immediately, then one per poll interval until shutdown.
    pub async fn run(self, mut shutdown_rx: mpsc::Receiver<()>) {
        tracing::info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            max_attempts = self.config.max_attempts,
            target_folder = %self.config.target_folder,
            backend = %self.storage.backend_type(),
            "Relay worker started"
        );

        // Spawn stale claim reaper
        let (reaper_shutdown_tx, mut reaper_shutdown_rx) = mpsc::channel::<()>(1);
        let repo_for_reaper = self.jobs.clone();
        let reap_interval = self.config.stale_reap_interval;
        let grace = self.config.stale_claim_grace;
        let reaper = tokio::spawn(async move {
            let mut interval = tokio::time::interval(reap_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(e) = repo_for_reaper.reap_stale_relaying(grace).await {
                            tracing::error!(error = %e, "Stale claim reaper failed");
                        }
                    }
                    _ = reaper_shutdown_rx.recv() => break,
                }
            }
        });

        // First tick fires immediately
        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("Relay worker shutting down");
                    let _ = reaper_shutdown_tx.send(()).await;
                    break;
                }
                _ = interval.tick() => {
                    match self.run_once().await {
                        Ok(report) => tracing::info!(
                            examined = report.examined,
                            stored = report.stored,
                            retried = report.retried,
                            failed = report.failed,
                            skipped = report.skipped,
                            "Relay cycle completed"
                        ),
                        Err(e) => tracing::error!(error = %e, "Relay cycle aborted"),
                    }
                }
            }
        }

        let _ = reaper.await;
        tracing::info!("Relay worker stopped");
    }

    /// One relay cycle over every `received` job.
    pub async fn run_once(&self) -> Result<RelayReport, AppError> {
        self.run_once_at(Utc::now()).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn run_once_at(&self, now: DateTime<Utc>) -> Result<RelayReport, AppError> {
        self.storage
            .ensure_dir(&self.config.target_folder)
            .await
            .map_err(|e| {
                AppError::TransferFailure(format!(
                    "remote folder {} unavailable: {}",
                    self.config.target_folder, e
                ))
            })?;

        let batch = self.jobs.claim_batch(JobState::Received).await?;
        let mut report = RelayReport {
            examined: batch.len(),
            ..RelayReport::default()
        };

        for job in &batch {
            if !job.is_due(now) {
                tracing::debug!(job_id = %job.id, retry_after = ?job.retry_after, "Job not due yet");
                report.skipped += 1;
                continue;
            }

            // A store failure on one job must not stop the rest of the batch
            if let Err(e) = self.relay_job(job, now, &mut report).await {
                tracing::error!(job_id = %job.id, error = %e, "Failed to record relay outcome");
            }
        }

        Ok(report)
    }

    #[tracing::instrument(skip(self, job, report), fields(job_id = %job.id))]
    async fn relay_job(
        &self,
        job: &UploadJob,
        now: DateTime<Utc>,
        report: &mut RelayReport,
    ) -> Result<(), AppError> {
        let local_path = match staged_copy(job).await {
            Ok(path) => path,
            Err(AppError::UnrecoverableLocalLoss(reason)) => {
                tracing::error!(reason = %reason, "Staged file missing, giving up on job");
                let applied = self.jobs.mark_error(job.id).await?;
                report.record(Outcome::Failed, applied);
                return Ok(());
            }
            Err(e) => {
                // The file may still be there; try again next cycle
                tracing::warn!(error = %e, "Cannot inspect staged file, leaving job queued");
                report.skipped += 1;
                return Ok(());
            }
        };

        if !self.jobs.try_claim_at(job.id, now).await? {
            tracing::debug!("Job claimed elsewhere, skipping");
            report.skipped += 1;
            return Ok(());
        }

        let remote_path = remote_path_for(&self.config.target_folder, job.id, &job.display_name);
        tracing::info!(remote_path = %remote_path, size_bytes = job.size_bytes, "Relaying job");

        let outcome = tokio::time::timeout(
            self.config.transfer_timeout,
            self.storage.put(&local_path, &remote_path),
        )
        .await;

        match outcome {
            Ok(Ok(())) => {
                let applied = self.jobs.mark_stored(job.id, &remote_path).await?;
                if applied {
                    tracing::info!(remote_path = %remote_path, "Job stored");
                }
                report.record(Outcome::Stored, applied);
            }
            Ok(Err(StorageError::SourceMissing(path))) => {
                tracing::error!(local_path = %path, "Staged file vanished during transfer");
                let applied = self.jobs.mark_error(job.id).await?;
                report.record(Outcome::Failed, applied);
            }
            Ok(Err(e)) => {
                self.handle_transfer_failure(job, now, &e.to_string(), report)
                    .await?;
            }
            Err(_) => {
                let reason = format!(
                    "transfer timed out after {}s",
                    self.config.transfer_timeout.as_secs()
                );
                self.handle_transfer_failure(job, now, &reason, report)
                    .await?;
            }
        }

        Ok(())
    }

    async fn handle_transfer_failure(
        &self,
        job: &UploadJob,
        now: DateTime<Utc>,
        reason: &str,
        report: &mut RelayReport,
    ) -> Result<(), AppError> {
        let attempts = job.attempts.saturating_add(1);
        let max = self.config.max_attempts;

        if max > 0 && attempts as u32 >= max {
            tracing::error!(attempts, max_attempts = max, error = %reason, "Transfer failed, attempts exhausted");
            let applied = self.jobs.mark_error(job.id).await?;
            report.record(Outcome::Failed, applied);
            return Ok(());
        }

        let backoff_seconds = compute_retry_backoff_seconds(job.attempts);
        let retry_after = now + chrono::Duration::seconds(backoff_seconds as i64);
        tracing::warn!(
            attempts,
            backoff_seconds,
            error = %reason,
            "Transfer failed, will retry"
        );
        let applied = self.jobs.retry(job.id, Some(retry_after)).await?;
        report.record(Outcome::Retried, applied);
        Ok(())
    }
}

/// Path of the staged copy, if it is still on disk.
///
/// Only a confirmed absence is `UnrecoverableLocalLoss`; an I/O error while
/// checking says nothing about the file and is reported as `Internal`.
async fn staged_copy(job: &UploadJob) -> Result<PathBuf, AppError> {
    let path = job.local_path.as_ref().ok_or_else(|| {
        AppError::UnrecoverableLocalLoss(format!("job {} has no staged copy", job.id))
    })?;

    match tokio::fs::try_exists(path).await {
        Ok(true) => Ok(path.clone()),
        Ok(false) => Err(AppError::UnrecoverableLocalLoss(format!(
            "{} no longer exists",
            path.display()
        ))),
        Err(e) => Err(AppError::Internal(format!(
            "cannot check staged file {}: {}",
            path.display(),
            e
        ))),
    }
}
