use chrono::{DateTime, Utc};
use nasdrop_core::{Notification, UploadJob};

/// Truncate a string to max_len characters, appending "..." if truncated.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

fn short_time(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%d %H:%M:%S").to_string()
}

pub const JOB_TABLE_HEADER: &str = "ID                                    STATE     TRIES  SIZE        UPDATED              NAME";

/// One line of the `jobs` table.
pub fn job_row(job: &UploadJob) -> String {
    format!(
        "{:<37} {:<9} {:<6} {:<11} {:<20} {}",
        job.id,
        job.state,
        job.attempts,
        job.size_bytes,
        short_time(job.updated_at),
        truncate_string(&job.display_name, 40)
    )
}

/// One line of the `outbox` listing.
pub fn notification_row(n: &Notification) -> String {
    format!(
        "#{:<6} {} job={} channel={} user={} '{}'",
        n.id,
        short_time(n.created_at),
        n.job_id,
        n.origin.channel_id,
        n.origin.requester_id,
        truncate_string(&n.display_name, 40)
    )
}

/// Initialize tracing for CLI binaries. Logs go to stderr so stdout stays parseable.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();
}
