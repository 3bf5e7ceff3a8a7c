//! Outbox dispatcher: turns queued completion notices into chat messages.
//!
//! Delivery is at most once. A notice that cannot be delivered is logged and
//! deleted like a delivered one, so a broken channel never blocks the queue.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use nasdrop_core::{AppError, Notification};
use nasdrop_db::NotificationRepository;

use crate::chat::ChatPlatform;

/// Outcome counts of one drain.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    /// Notices deleted after a failed or timed-out delivery.
    pub dropped: usize,
}

pub struct NotificationDispatcher {
    outbox: NotificationRepository,
    chat: Arc<dyn ChatPlatform>,
    app_base_url: String,
    send_timeout: Duration,
    poll_interval: Duration,
}

/// The chat message announcing a finished upload.
pub fn completion_message(notification: &Notification, app_base_url: &str) -> String {
    format!(
        "<@{}> Your file '{}' has been uploaded successfully!\nDownload link: <{}/download/{}>",
        notification.origin.requester_id,
        notification.display_name,
        app_base_url.trim_end_matches('/'),
        notification.job_id
    )
}

impl NotificationDispatcher {
    pub fn new(
        outbox: NotificationRepository,
        chat: Arc<dyn ChatPlatform>,
        app_base_url: impl Into<String>,
        send_timeout: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            outbox,
            chat,
            app_base_url: app_base_url.into(),
            send_timeout,
            poll_interval,
        }
    }

    /// Drain the outbox every poll interval until shutdown. A drain in progress
    /// finishes before the loop exits.
    pub async fn run(self, mut shutdown_rx: mpsc::Receiver<()>) {
        tracing::info!(
            poll_interval_secs = self.poll_interval.as_secs(),
            "Notification dispatcher started"
        );

        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("Notification dispatcher shutting down");
                    break;
                }
                _ = interval.tick() => {
                    match self.run_once().await {
                        Ok(report) if report.delivered + report.dropped > 0 => tracing::info!(
                            delivered = report.delivered,
                            dropped = report.dropped,
                            "Processed pending notifications"
                        ),
                        Ok(_) => {}
                        Err(e) => tracing::error!(error = %e, "Failed to drain notification outbox"),
                    }
                }
            }
        }
    }

    /// Deliver every pending notice once, oldest first.
    pub async fn run_once(&self) -> Result<DispatchReport, AppError> {
        let pending = self.outbox.drain().await?;
        let mut report = DispatchReport::default();

        for notification in &pending {
            if self.deliver(notification).await {
                report.delivered += 1;
            } else {
                report.dropped += 1;
            }

            // Deleted either way: a retry could spam a channel that half-received the message
            if let Err(e) = self.outbox.delete(notification.id).await {
                tracing::error!(
                    error = %e,
                    notification_id = notification.id,
                    "Failed to delete processed notification"
                );
            }
        }

        Ok(report)
    }

    #[tracing::instrument(skip(self, notification), fields(notification_id = notification.id, job_id = %notification.job_id, channel_id = %notification.origin.channel_id))]
    async fn deliver(&self, notification: &Notification) -> bool {
        let content = completion_message(notification, &self.app_base_url);
        let send = self
            .chat
            .send_message(&notification.origin.channel_id, &content);

        match tokio::time::timeout(self.send_timeout, send).await {
            Ok(Ok(())) => {
                tracing::info!("Sent completion message");
                true
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Completion message not delivered, dropping notice");
                false
            }
            Err(_) => {
                tracing::warn!(
                    timeout_secs = self.send_timeout.as_secs(),
                    "Completion message timed out, dropping notice"
                );
                false
            }
        }
    }
}
