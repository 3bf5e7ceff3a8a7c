//! Chat platform seam and the Discord REST client behind it.

use async_trait::async_trait;
use nasdrop_core::AppError;
use reqwest::{Client, StatusCode};
use serde_json::json;
use std::time::Duration;

/// Outbound side of the chat platform.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Post `content` to a channel.
    async fn send_message(&self, channel_id: &str, content: &str) -> Result<(), AppError>;
}

/// Discord REST API client authenticated as the bot user.
#[derive(Clone)]
pub struct DiscordClient {
    client: Client,
    api_base: String,
    bot_token: String,
}

impl DiscordClient {
    pub fn new(
        api_base: impl Into<String>,
        bot_token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            bot_token: bot_token.into(),
        })
    }

    fn authorization(&self) -> String {
        format!("Bot {}", self.bot_token)
    }

    /// Register the global `/upload` slash command for `application_id`.
    ///
    /// Overwrites the application's global command list, so it is safe to call
    /// on every start.
    pub async fn register_commands(&self, application_id: &str) -> Result<(), AppError> {
        let url = format!("{}/applications/{}/commands", self.api_base, application_id);
        let commands = json!([{
            "name": "upload",
            "description": "Generates a link to upload a file to the NAS.",
            "type": 1
        }]);

        let response = self
            .client
            .put(&url)
            .header(reqwest::header::AUTHORIZATION, self.authorization())
            .json(&commands)
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("Command registration failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Internal(format!(
                "Command registration returned {}",
                response.status()
            )));
        }

        tracing::info!(application_id = %application_id, "Slash commands registered");
        Ok(())
    }
}

#[async_trait]
impl ChatPlatform for DiscordClient {
    #[tracing::instrument(skip(self, content), fields(chat.platform = "discord"))]
    async fn send_message(&self, channel_id: &str, content: &str) -> Result<(), AppError> {
        let url = format!("{}/channels/{}/messages", self.api_base, channel_id);
        let body = json!({
            "content": content,
            // Only ping the users named in the message
            "allowed_mentions": { "parse": ["users"] }
        });

        let response = self
            .client
            .post(&url)
            .header(reqwest::header::AUTHORIZATION, self.authorization())
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::DeliveryFailure(format!("POST {} failed: {}", url, e)))?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(AppError::DeliveryFailure(format!(
                "channel {} not found",
                channel_id
            ))),
            StatusCode::FORBIDDEN => Err(AppError::DeliveryFailure(format!(
                "missing permission to post in channel {}",
                channel_id
            ))),
            status => {
                let text = response.text().await.unwrap_or_default();
                Err(AppError::DeliveryFailure(format!(
                    "channel {} returned {}: {}",
                    channel_id, status, text
                )))
            }
        }
    }
}
