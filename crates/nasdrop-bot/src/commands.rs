//! Slash command handling.

use dashmap::{mapref::entry::Entry, DashMap};
use nasdrop_core::{AppError, Config, ErrorMetadata, OriginIdentity};
use nasdrop_db::TokenRepository;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const STORE_FAILURE_REPLY: &str =
    "Sorry, I couldn't generate an upload link right now. Please try again later.";

/// Hands out upload links in response to `/upload`.
#[derive(Clone)]
pub struct CommandFront {
    tokens: TokenRepository,
    config: Arc<Config>,
    /// Last accepted `/upload` per requester, for the cooldown.
    last_used: Arc<DashMap<String, Instant>>,
}

impl CommandFront {
    pub fn new(tokens: TokenRepository, config: Arc<Config>) -> Self {
        Self {
            tokens,
            config,
            last_used: Arc::new(DashMap::new()),
        }
    }

    /// Issue a token for `origin` and return its upload link.
    pub async fn issue_upload_link(&self, origin: &OriginIdentity) -> Result<String, AppError> {
        self.issue_upload_link_at(origin, Instant::now()).await
    }

    #[tracing::instrument(skip(self, now), fields(requester_id = %origin.requester_id, channel_id = %origin.channel_id))]
    pub async fn issue_upload_link_at(
        &self,
        origin: &OriginIdentity,
        now: Instant,
    ) -> Result<String, AppError> {
        if !self.config.chat.is_channel_allowed(&origin.channel_id) {
            tracing::warn!("/upload blocked in channel outside the allowlist");
            return Err(AppError::ChannelNotAllowed(origin.channel_id.clone()));
        }

        self.check_cooldown(&origin.requester_id, now)?;

        let token = self.tokens.issue(origin).await?;
        tracing::info!(expires_at = %token.expires_at, "Issued upload token");
        Ok(self.config.upload_link(&token.token))
    }

    /// Record a use by `requester_id`, or fail if the last one is too recent.
    fn check_cooldown(&self, requester_id: &str, now: Instant) -> Result<(), AppError> {
        let cooldown = Duration::from_secs(self.config.chat.upload_cooldown_seconds);
        if cooldown.is_zero() {
            return Ok(());
        }

        // Must run before `entry`, which holds a shard lock
        self.last_used
            .retain(|_, last| now.saturating_duration_since(*last) < cooldown);

        match self.last_used.entry(requester_id.to_string()) {
            Entry::Occupied(entry) => {
                let elapsed = now.saturating_duration_since(*entry.get());
                let remaining = cooldown.saturating_sub(elapsed);
                tracing::debug!(
                    retry_after_ms = remaining.as_millis() as u64,
                    "/upload on cooldown"
                );
                Err(AppError::RateLimited {
                    retry_after_secs: remaining.as_secs_f64(),
                })
            }
            Entry::Vacant(entry) => {
                entry.insert(now);
                Ok(())
            }
        }
    }

    /// The private reply to an `/upload` invocation.
    pub async fn handle_upload_command(&self, origin: &OriginIdentity) -> String {
        match self.issue_upload_link(origin).await {
            Ok(link) => format!(
                "Click the link below to upload your file.\nThis link is valid for a limited time and can only be used once.\n\n<{}>",
                link
            ),
            Err(e @ (AppError::ChannelNotAllowed(_) | AppError::RateLimited { .. })) => {
                e.client_message()
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to issue upload token");
                STORE_FAILURE_REPLY.to_string()
            }
        }
    }
}
