use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::interval;

use nasdrop_core::AppError;
use nasdrop_db::{TokenRepository, UploadJobRepository};

/// What one cleanup pass removed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CleanupReport {
    pub staged_files_removed: usize,
    pub tokens_swept: u64,
}

/// Periodic housekeeping: drops staged copies of stored jobs and expired tokens.
#[derive(Clone)]
pub struct StagingCleanupService {
    jobs: UploadJobRepository,
    tokens: TokenRepository,
    /// Staged copies of stored jobs older than this are removed. `None` keeps them.
    staged_retention: Option<chrono::Duration>,
    run_interval: Duration,
}

impl StagingCleanupService {
    pub fn new(
        jobs: UploadJobRepository,
        tokens: TokenRepository,
        staged_retention_days: i64,
        run_interval: Duration,
    ) -> Self {
        Self {
            jobs,
            tokens,
            staged_retention: (staged_retention_days > 0)
                .then(|| chrono::Duration::days(staged_retention_days)),
            run_interval,
        }
    }

    /// Start the background cleanup task.
    /// Returns a JoinHandle for graceful shutdown
    pub fn start(self: Arc<Self>, mut shutdown_rx: mpsc::Receiver<()>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut cleanup_interval = interval(self.run_interval);

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = cleanup_interval.tick() => {
                        tracing::info!("Starting scheduled staging cleanup");

                        match self.run_once().await {
                            Ok(report) => tracing::info!(
                                staged_files_removed = report.staged_files_removed,
                                tokens_swept = report.tokens_swept,
                                "Cleanup completed"
                            ),
                            Err(e) => tracing::error!(error = %e, "Cleanup task failed"),
                        }
                    }
                }
            }

            tracing::info!("Cleanup service stopped");
        })
    }

    pub async fn run_once(&self) -> Result<CleanupReport, AppError> {
        self.run_once_at(Utc::now()).await
    }

    #[tracing::instrument(skip(self), fields(cleanup.operation = "staging"))]
    pub async fn run_once_at(&self, now: DateTime<Utc>) -> Result<CleanupReport, AppError> {
        let staged_files_removed = match self.staged_retention {
            Some(retention) => match self.cleanup_staged_copies(now - retention).await {
                Ok(count) => count,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to cleanup staged copies");
                    0
                }
            },
            None => 0,
        };

        let tokens_swept = self.tokens.sweep_expired_at(now).await?;

        Ok(CleanupReport {
            staged_files_removed,
            tokens_swept,
        })
    }

    async fn cleanup_staged_copies(&self, cutoff: DateTime<Utc>) -> Result<usize, AppError> {
        let jobs = self.jobs.stored_with_local_copy_before(cutoff).await?;
        let mut removed = 0;

        for job in jobs {
            let Some(path) = job.local_path.as_ref() else {
                continue;
            };

            match tokio::fs::remove_file(path).await {
                Ok(()) => {
                    tracing::debug!(job_id = %job.id, path = %path.display(), "Removed staged copy");
                    removed += 1;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        job_id = %job.id,
                        path = %path.display(),
                        "Failed to remove staged copy, keeping record"
                    );
                    continue;
                }
            }

            self.jobs.clear_local_path(job.id).await?;
        }

        Ok(removed)
    }
}
