//! Shared state for the command front's HTTP surface.

use crate::commands::CommandFront;
use crate::interactions::InteractionVerifier;
use nasdrop_db::TokenRepository;

pub struct BotState {
    pub verifier: InteractionVerifier,
    pub commands: CommandFront,
    /// Used by the health probe to reach the shared store.
    pub tokens: TokenRepository,
}
