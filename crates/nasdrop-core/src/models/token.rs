use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who asked for an upload and where completion should be announced.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OriginIdentity {
    pub requester_id: String,
    pub channel_id: String,
}

impl OriginIdentity {
    pub fn new(requester_id: impl Into<String>, channel_id: impl Into<String>) -> Self {
        Self {
            requester_id: requester_id.into(),
            channel_id: channel_id.into(),
        }
    }
}

/// Single-use, time-bounded capability to submit one upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub origin: OriginIdentity,
}
