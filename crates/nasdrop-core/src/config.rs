//! Configuration module
//!
//! Every process reads the same environment (optionally seeded from a `.env` file).
//! Defaults live in the constants below; `Config::default()` is the fully defaulted
//! configuration and `Config::from_env()` overrides it field by field.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::storage_types::RemoteBackend;

// Common constants
const DATABASE_PATH: &str = "data/database/metadata.db";
const MAX_CONNECTIONS: u32 = 5;
const CONNECTION_TIMEOUT_SECS: u64 = 5;
const UPLOAD_TOKEN_EXPIRY_SECS: i64 = 3600;
const CACHE_DIR: &str = "data/pending_uploads";
const APP_BASE_URL: &str = "http://localhost:5000";

// Web ingress
const SERVER_PORT: u16 = 5000;
const MAX_UPLOAD_SIZE_MB: usize = 1024;
const MAX_CONCURRENT_UPLOADS: usize = 8;

// Relay
const UPLOADER_INTERVAL_SECS: u64 = 600;
const RELAY_MAX_ATTEMPTS: u32 = 5;
const RELAY_TRANSFER_TIMEOUT_SECS: u64 = 3600;
const RELAY_STALE_CLAIM_SECS: i64 = 7200;
/// Upper bound for second-valued durations that end up as timestamps.
const MAX_DURATION_SECS: i64 = 365 * 24 * 3600;
const CACHE_CLEANUP_AGE_DAYS: i64 = 7;
const CLEANUP_INTERVAL_SECS: u64 = 3600;

// Remote storage
const NAS_TARGET_FOLDER: &str = "/DiscordUploads";

// Command front
const BOT_PORT: u16 = 5001;
const DISCORD_API_BASE: &str = "https://discord.com/api/v10";
const NOTIFICATION_INTERVAL_SECS: u64 = 15;
const CHAT_SEND_TIMEOUT_SECS: u64 = 10;
const UPLOAD_COMMAND_COOLDOWN_SECS: u64 = 10;

/// Settings every process needs: the shared store, staging and public URLs.
#[derive(Clone, Debug)]
pub struct BaseConfig {
    pub environment: String,
    pub database_path: PathBuf,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
    /// Lifetime of an upload token in seconds.
    pub token_expiry_seconds: i64,
    /// Local staging directory for received uploads.
    pub cache_dir: PathBuf,
    /// Public base URL used to build upload and download links.
    pub app_base_url: String,
}

/// Web ingress settings
#[derive(Clone, Debug)]
pub struct WebConfig {
    pub server_port: u16,
    pub max_upload_size_bytes: usize,
    /// Upload requests served at once; further requests wait.
    pub max_concurrent_uploads: usize,
}

/// Storage relay and housekeeping settings
#[derive(Clone, Debug)]
pub struct RelayConfig {
    pub interval_seconds: u64,
    /// Transfer attempts before a job is moved to `error`. 0 = retry forever.
    pub max_attempts: u32,
    pub transfer_timeout_seconds: u64,
    /// `relaying` jobs not touched for this long are handed back to `received`.
    pub stale_claim_seconds: i64,
    /// Staged copies of stored jobs older than this are removed. 0 = never.
    pub cache_cleanup_age_days: i64,
    pub cleanup_interval_seconds: u64,
}

/// Remote (NAS) storage settings
#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub backend: RemoteBackend,
    pub webdav_url: Option<String>,
    pub webdav_user: Option<String>,
    pub webdav_pass: Option<String>,
    pub target_folder: String,
    pub local_storage_path: Option<PathBuf>,
}

/// Chat platform (command front) settings
#[derive(Clone, Debug)]
pub struct ChatConfig {
    pub bot_port: u16,
    pub bot_token: Option<String>,
    /// Hex encoded ed25519 public key used to verify interaction requests.
    pub public_key: Option<String>,
    pub application_id: Option<String>,
    pub api_base: String,
    /// Channels allowed to request upload links. `None` allows every channel.
    pub target_channel_ids: Option<Vec<String>>,
    pub notification_interval_seconds: u64,
    pub send_timeout_seconds: u64,
    /// Minimum gap between two `/upload` invocations by the same user; 0 disables.
    pub upload_cooldown_seconds: u64,
}

/// Application configuration shared by all nasdrop processes.
#[derive(Clone, Debug)]
pub struct Config {
    pub base: BaseConfig,
    pub web: WebConfig,
    pub relay: RelayConfig,
    pub storage: StorageConfig,
    pub chat: ChatConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base: BaseConfig {
                environment: "development".to_string(),
                database_path: PathBuf::from(DATABASE_PATH),
                db_max_connections: MAX_CONNECTIONS,
                db_timeout_seconds: CONNECTION_TIMEOUT_SECS,
                token_expiry_seconds: UPLOAD_TOKEN_EXPIRY_SECS,
                cache_dir: PathBuf::from(CACHE_DIR),
                app_base_url: APP_BASE_URL.to_string(),
            },
            web: WebConfig {
                server_port: SERVER_PORT,
                max_upload_size_bytes: MAX_UPLOAD_SIZE_MB * 1024 * 1024,
                max_concurrent_uploads: MAX_CONCURRENT_UPLOADS,
            },
            relay: RelayConfig {
                interval_seconds: UPLOADER_INTERVAL_SECS,
                max_attempts: RELAY_MAX_ATTEMPTS,
                transfer_timeout_seconds: RELAY_TRANSFER_TIMEOUT_SECS,
                stale_claim_seconds: RELAY_STALE_CLAIM_SECS,
                cache_cleanup_age_days: CACHE_CLEANUP_AGE_DAYS,
                cleanup_interval_seconds: CLEANUP_INTERVAL_SECS,
            },
            storage: StorageConfig {
                backend: RemoteBackend::Webdav,
                webdav_url: None,
                webdav_user: None,
                webdav_pass: None,
                target_folder: NAS_TARGET_FOLDER.to_string(),
                local_storage_path: None,
            },
            chat: ChatConfig {
                bot_port: BOT_PORT,
                bot_token: None,
                public_key: None,
                application_id: None,
                api_base: DISCORD_API_BASE.to_string(),
                target_channel_ids: None,
                notification_interval_seconds: NOTIFICATION_INTERVAL_SECS,
                send_timeout_seconds: CHAT_SEND_TIMEOUT_SECS,
                upload_cooldown_seconds: UPLOAD_COMMAND_COOLDOWN_SECS,
            },
        }
    }
}

/// Read `key` and parse it, falling back to `default` when unset or unparsable.
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Read `key` as a non-empty string.
fn env_opt(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse a comma separated channel allowlist. Blank input means "no restriction".
pub fn parse_channel_allowlist(raw: &str) -> Option<Vec<String>> {
    let ids: Vec<String> = raw
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if ids.is_empty() {
        None
    } else {
        Some(ids)
    }
}

impl Config {
    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let env = self.base.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let d = Config::default();

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or(d.base.environment);

        let backend = match env_opt("STORAGE_BACKEND") {
            Some(raw) => raw.parse::<RemoteBackend>()?,
            None => d.storage.backend,
        };

        let base = BaseConfig {
            environment,
            database_path: env_opt("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or(d.base.database_path),
            db_max_connections: env_or("DB_MAX_CONNECTIONS", d.base.db_max_connections),
            db_timeout_seconds: env_or("DB_TIMEOUT_SECONDS", d.base.db_timeout_seconds),
            token_expiry_seconds: env_or(
                "UPLOAD_TOKEN_EXPIRY_SECONDS",
                d.base.token_expiry_seconds,
            ),
            cache_dir: env_opt("CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or(d.base.cache_dir),
            app_base_url: env_opt("APP_BASE_URL").unwrap_or(d.base.app_base_url),
        };

        let web = WebConfig {
            server_port: match env_opt("PORT") {
                Some(raw) => raw
                    .parse()
                    .map_err(|_| anyhow::anyhow!("PORT must be a valid number"))?,
                None => d.web.server_port,
            },
            max_upload_size_bytes: env_or("MAX_UPLOAD_SIZE_MB", MAX_UPLOAD_SIZE_MB) * 1024 * 1024,
            max_concurrent_uploads: env_or("MAX_CONCURRENT_UPLOADS", d.web.max_concurrent_uploads),
        };

        let relay = RelayConfig {
            interval_seconds: env_or("UPLOADER_INTERVAL_SECONDS", d.relay.interval_seconds),
            max_attempts: env_or("RELAY_MAX_ATTEMPTS", d.relay.max_attempts),
            transfer_timeout_seconds: env_or(
                "RELAY_TRANSFER_TIMEOUT_SECONDS",
                d.relay.transfer_timeout_seconds,
            ),
            stale_claim_seconds: env_or("RELAY_STALE_CLAIM_SECONDS", d.relay.stale_claim_seconds),
            cache_cleanup_age_days: env_or(
                "CACHE_CLEANUP_AGE_DAYS",
                d.relay.cache_cleanup_age_days,
            ),
            cleanup_interval_seconds: env_or(
                "CLEANUP_INTERVAL_SECONDS",
                d.relay.cleanup_interval_seconds,
            ),
        };

        let storage = StorageConfig {
            backend,
            webdav_url: env_opt("NAS_WEBDAV_URL"),
            webdav_user: env_opt("NAS_WEBDAV_USER"),
            webdav_pass: env::var("NAS_WEBDAV_PASS").ok(),
            target_folder: env_opt("NAS_TARGET_FOLDER").unwrap_or(d.storage.target_folder),
            local_storage_path: env_opt("LOCAL_STORAGE_PATH").map(PathBuf::from),
        };

        let chat = ChatConfig {
            bot_port: match env_opt("BOT_PORT") {
                Some(raw) => raw
                    .parse()
                    .map_err(|_| anyhow::anyhow!("BOT_PORT must be a valid number"))?,
                None => d.chat.bot_port,
            },
            bot_token: env_opt("DISCORD_BOT_TOKEN"),
            public_key: env_opt("DISCORD_PUBLIC_KEY"),
            application_id: env_opt("DISCORD_APPLICATION_ID"),
            api_base: env_opt("DISCORD_API_BASE").unwrap_or(d.chat.api_base),
            target_channel_ids: env::var("DISCORD_TARGET_CHANNEL_IDS")
                .ok()
                .and_then(|raw| parse_channel_allowlist(&raw)),
            notification_interval_seconds: env_or(
                "NOTIFICATION_INTERVAL_SECONDS",
                d.chat.notification_interval_seconds,
            ),
            send_timeout_seconds: env_or(
                "CHAT_SEND_TIMEOUT_SECONDS",
                d.chat.send_timeout_seconds,
            ),
            upload_cooldown_seconds: env_or(
                "UPLOAD_COMMAND_COOLDOWN_SECONDS",
                d.chat.upload_cooldown_seconds,
            ),
        };

        Ok(Config {
            base,
            web,
            relay,
            storage,
            chat,
        })
    }

    /// Checks shared by every process.
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.base.token_expiry_seconds <= 0 || self.base.token_expiry_seconds > MAX_DURATION_SECS
        {
            return Err(anyhow::anyhow!(
                "UPLOAD_TOKEN_EXPIRY_SECONDS must be between 1 and {}",
                MAX_DURATION_SECS
            ));
        }

        if !self.base.app_base_url.starts_with("http://")
            && !self.base.app_base_url.starts_with("https://")
        {
            return Err(anyhow::anyhow!(
                "APP_BASE_URL must be an absolute http(s) URL"
            ));
        }

        if self.base.db_max_connections == 0 {
            return Err(anyhow::anyhow!("DB_MAX_CONNECTIONS must be at least 1"));
        }

        if self.relay.interval_seconds == 0 || self.chat.notification_interval_seconds == 0 {
            return Err(anyhow::anyhow!(
                "UPLOADER_INTERVAL_SECONDS and NOTIFICATION_INTERVAL_SECONDS must be greater than zero"
            ));
        }

        if self.web.max_concurrent_uploads == 0 {
            return Err(anyhow::anyhow!("MAX_CONCURRENT_UPLOADS must be at least 1"));
        }

        // A claim must outlive the transfer it guards, or a healthy upload is
        // handed to a second relay while still running
        if self.relay.stale_claim_seconds <= 0
            || self.relay.stale_claim_seconds > MAX_DURATION_SECS
            || self.relay.stale_claim_seconds as u64 <= self.relay.transfer_timeout_seconds
        {
            return Err(anyhow::anyhow!(
                "RELAY_STALE_CLAIM_SECONDS must be greater than RELAY_TRANSFER_TIMEOUT_SECONDS and at most {}",
                MAX_DURATION_SECS
            ));
        }

        if self.relay.cleanup_interval_seconds == 0 {
            return Err(anyhow::anyhow!(
                "CLEANUP_INTERVAL_SECONDS must be greater than zero"
            ));
        }

        Ok(())
    }

    /// Checks for processes that talk to remote storage (relay, web ingress).
    pub fn validate_storage(&self) -> Result<(), anyhow::Error> {
        match self.storage.backend {
            RemoteBackend::Webdav => {
                if self.storage.webdav_url.is_none() {
                    return Err(anyhow::anyhow!(
                        "NAS_WEBDAV_URL must be set when using the webdav storage backend"
                    ));
                }
            }
            RemoteBackend::Local => {
                if self.storage.local_storage_path.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_PATH must be set when using the local storage backend"
                    ));
                }
            }
        }

        if !self.storage.target_folder.starts_with('/') {
            return Err(anyhow::anyhow!("NAS_TARGET_FOLDER must be an absolute path"));
        }

        Ok(())
    }

    /// Checks for the command front.
    pub fn validate_bot(&self) -> Result<(), anyhow::Error> {
        if self.chat.bot_token.is_none() {
            return Err(anyhow::anyhow!("DISCORD_BOT_TOKEN must be set"));
        }
        if self.chat.public_key.is_none() {
            return Err(anyhow::anyhow!(
                "DISCORD_PUBLIC_KEY must be set to verify interactions"
            ));
        }
        Ok(())
    }

    pub fn upload_link(&self, token: &str) -> String {
        format!(
            "{}/upload/{}",
            self.base.app_base_url.trim_end_matches('/'),
            token
        )
    }

    pub fn download_link(&self, job_id: &uuid::Uuid) -> String {
        format!(
            "{}/download/{}",
            self.base.app_base_url.trim_end_matches('/'),
            job_id
        )
    }
}

impl ChatConfig {
    /// Whether `channel_id` may request upload links.
    pub fn is_channel_allowed(&self, channel_id: &str) -> bool {
        match &self.target_channel_ids {
            Some(ids) => ids.iter().any(|id| id == channel_id),
            None => true,
        }
    }
}
