//! nasdrop shared store
//!
//! One SQLite database holds the three record families the processes coordinate
//! through: upload tokens, upload jobs and pending notifications. Each family is
//! reached through its own repository; no process caches rows across polls.

pub mod db;
pub mod pool;

pub use db::{NotificationRepository, TokenRepository, UploadJobRepository};
pub use pool::{connect, connect_in_memory, MIGRATOR};
