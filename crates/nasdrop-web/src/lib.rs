//! Web ingress: turns a live upload token into a staged file and an upload job.

pub mod error;
pub mod handlers;
pub mod setup;
pub mod state;
pub mod utils;
