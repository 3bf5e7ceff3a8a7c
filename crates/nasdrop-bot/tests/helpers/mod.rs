//! Test helpers: a command front wired to an in-memory store and a fixed
//! signing key standing in for the chat platform.
//!
//! Run from workspace root: `cargo test -p nasdrop-bot`.

use axum::body::Bytes;
use axum_test::{TestResponse, TestServer};
use ed25519_dalek::{Signer, SigningKey};
use nasdrop_bot::{setup_routes, BotState, CommandFront, InteractionVerifier};
use nasdrop_core::Config;
use nasdrop_db::{connect_in_memory, TokenRepository};
use std::sync::Arc;

pub const APP_BASE_URL: &str = "https://files.example.test";
pub const TIMESTAMP: &str = "1700000000";

pub struct TestBot {
    pub server: TestServer,
    pub tokens: TokenRepository,
    pub signing_key: SigningKey,
}

impl TestBot {
    pub fn sign(&self, timestamp: &str, body: &str) -> String {
        let mut message = timestamp.as_bytes().to_vec();
        message.extend_from_slice(body.as_bytes());
        hex::encode(self.signing_key.sign(&message).to_bytes())
    }

    /// POST a correctly signed interaction.
    pub async fn post_signed(&self, body: &str) -> TestResponse {
        let signature = self.sign(TIMESTAMP, body);
        self.server
            .post("/interactions")
            .add_header("X-Signature-Ed25519", signature)
            .add_header("X-Signature-Timestamp", TIMESTAMP)
            .add_header("Content-Type", "application/json")
            .bytes(Bytes::from(body.to_string()))
            .await
    }
}

pub async fn setup_test_bot(allowlist: Option<Vec<String>>) -> TestBot {
    let pool = connect_in_memory()
        .await
        .expect("Failed to open in-memory store");
    let tokens = TokenRepository::new(pool, chrono::Duration::hours(1));

    let mut config = Config::default();
    config.base.app_base_url = APP_BASE_URL.to_string();
    config.chat.target_channel_ids = allowlist;

    let signing_key = SigningKey::from_bytes(&[7u8; 32]);
    let verifier = InteractionVerifier::from_hex(&hex::encode(signing_key.verifying_key().to_bytes()))
        .expect("Failed to build verifier");

    let state = Arc::new(BotState {
        verifier,
        commands: CommandFront::new(tokens.clone(), Arc::new(config)),
        tokens: tokens.clone(),
    });

    let server = TestServer::new(setup_routes(state)).expect("Failed to create test server");

    TestBot {
        server,
        tokens,
        signing_key,
    }
}

pub fn upload_command(user_id: &str, channel_id: &str) -> String {
    serde_json::json!({
        "type": 2,
        "channel_id": channel_id,
        "member": { "user": { "id": user_id } },
        "data": { "name": "upload" }
    })
    .to_string()
}
