//! Discord interactions webhook.
//!
//! Discord signs every request with the application's ed25519 key over
//! `timestamp || body`; unsigned or mis-signed requests are rejected with 401
//! before the body is parsed.

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    Json,
};
use ed25519_dalek::{Signature, VerifyingKey};
use nasdrop_core::{AppError, OriginIdentity};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::HttpAppError;
use crate::state::BotState;

pub const SIGNATURE_HEADER: &str = "x-signature-ed25519";
pub const TIMESTAMP_HEADER: &str = "x-signature-timestamp";

const INTERACTION_PING: u8 = 1;
const INTERACTION_APPLICATION_COMMAND: u8 = 2;
const RESPONSE_PONG: u8 = 1;
const RESPONSE_CHANNEL_MESSAGE: u8 = 4;
/// Message visible only to the invoking user.
const FLAG_EPHEMERAL: u64 = 1 << 6;

/// Checks request signatures against the application public key.
#[derive(Clone)]
pub struct InteractionVerifier {
    key: VerifyingKey,
}

impl InteractionVerifier {
    pub fn from_hex(public_key: &str) -> Result<Self, AppError> {
        let bytes = hex::decode(public_key.trim())
            .map_err(|e| AppError::InvalidInput(format!("Public key is not hex: {}", e)))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| AppError::InvalidInput("Public key must be 32 bytes".to_string()))?;
        let key = VerifyingKey::from_bytes(&bytes)
            .map_err(|e| AppError::InvalidInput(format!("Invalid public key: {}", e)))?;
        Ok(Self { key })
    }

    pub fn verify(&self, timestamp: &str, body: &[u8], signature_hex: &str) -> Result<(), AppError> {
        let sig_bytes = hex::decode(signature_hex)
            .map_err(|_| AppError::Unauthorized("Malformed request signature".to_string()))?;
        let sig_bytes: [u8; 64] = sig_bytes
            .try_into()
            .map_err(|_| AppError::Unauthorized("Malformed request signature".to_string()))?;
        let signature = Signature::from_bytes(&sig_bytes);

        let mut message = Vec::with_capacity(timestamp.len() + body.len());
        message.extend_from_slice(timestamp.as_bytes());
        message.extend_from_slice(body);

        self.key
            .verify_strict(&message, &signature)
            .map_err(|_| AppError::Unauthorized("Invalid request signature".to_string()))
    }
}

#[derive(Debug, Deserialize)]
pub struct Interaction {
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(default)]
    pub data: Option<CommandData>,
    #[serde(default)]
    pub channel_id: Option<String>,
    /// Present for guild invocations.
    #[serde(default)]
    pub member: Option<Member>,
    /// Present for direct-message invocations.
    #[serde(default)]
    pub user: Option<User>,
}

#[derive(Debug, Deserialize)]
pub struct CommandData {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct Member {
    pub user: User,
}

#[derive(Debug, Deserialize)]
pub struct User {
    pub id: String,
}

impl Interaction {
    /// Who invoked the command and where.
    pub fn origin(&self) -> Option<OriginIdentity> {
        let requester = self
            .member
            .as_ref()
            .map(|m| &m.user)
            .or(self.user.as_ref())?;
        let channel_id = self.channel_id.as_ref()?;
        Some(OriginIdentity::new(requester.id.clone(), channel_id.clone()))
    }
}

#[derive(Debug, Serialize, PartialEq)]
pub struct InteractionResponse {
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<MessageData>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct MessageData {
    pub content: String,
    pub flags: u64,
}

impl InteractionResponse {
    pub fn pong() -> Self {
        Self {
            kind: RESPONSE_PONG,
            data: None,
        }
    }

    pub fn ephemeral(content: impl Into<String>) -> Self {
        Self {
            kind: RESPONSE_CHANNEL_MESSAGE,
            data: Some(MessageData {
                content: content.into(),
                flags: FLAG_EPHEMERAL,
            }),
        }
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, AppError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized(format!("Missing {} header", name)))
}

/// `POST /interactions`
pub async fn handle_interaction(
    State(state): State<Arc<BotState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<InteractionResponse>, HttpAppError> {
    let signature = header(&headers, SIGNATURE_HEADER)?;
    let timestamp = header(&headers, TIMESTAMP_HEADER)?;
    state.verifier.verify(timestamp, &body, signature)?;

    let interaction: Interaction = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("Malformed interaction: {}", e)))?;

    match interaction.kind {
        INTERACTION_PING => Ok(Json(InteractionResponse::pong())),
        INTERACTION_APPLICATION_COMMAND => {
            let name = interaction.data.as_ref().map(|d| d.name.as_str());
            if name != Some("upload") {
                tracing::debug!(command = ?name, "Unknown command");
                return Ok(Json(InteractionResponse::ephemeral("Unknown command.")));
            }
            let origin = interaction.origin().ok_or_else(|| {
                AppError::BadRequest("Command without user or channel".to_string())
            })?;
            let reply = state.commands.handle_upload_command(&origin).await;
            Ok(Json(InteractionResponse::ephemeral(reply)))
        }
        other => Err(AppError::BadRequest(format!("Unsupported interaction type {}", other)).into()),
    }
}
