//! nasdrop command front
//!
//! Answers `/upload` with a single-use link and posts a completion notice to the
//! originating channel once the web ingress has accepted the file.

pub mod chat;
pub mod commands;
pub mod dispatcher;
pub mod error;
pub mod interactions;
pub mod routes;
pub mod state;

pub use chat::{ChatPlatform, DiscordClient};
pub use commands::CommandFront;
pub use dispatcher::{completion_message, DispatchReport, NotificationDispatcher};
pub use interactions::InteractionVerifier;
pub use routes::setup_routes;
pub use state::BotState;
