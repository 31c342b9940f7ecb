use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_HTTP_PORT: u16 = 18790;
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_LOOP_INTERVAL_SECS: u64 = 10;
/// Loops between health probes (30 loops at 10 s is roughly five minutes).
pub const DEFAULT_HEALTH_CHECK_EVERY: u64 = 30;
pub const DEFAULT_PUBLISH_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_SLOW_PUBLISH_MS: u64 = 10_000;
pub const DEFAULT_ERROR_WINDOW_SECS: u64 = 300;
pub const DEFAULT_ERROR_ALERT_THRESHOLD: u64 = 10;
/// Platform limit on images attached to one post.
pub const MAX_ATTACHMENTS_PER_POST: usize = 4;
pub const MAX_ATTACHMENT_BYTES: u64 = 10 * 1024 * 1024; // 10 MB
pub const DEFAULT_NOTIFY_QUEUE: usize = 256;

/// Top-level config (xpost.toml + XPOST_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct XpostConfig {
    #[serde(default)]
    pub discord: DiscordConfig,
    #[serde(default)]
    pub x: XApiConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub images: ImagesConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscordConfig {
    #[serde(default)]
    pub bot_token: String,
    /// Operations channel for publish success/failure/error reports.
    /// Notifications are disabled when unset.
    pub log_channel_id: Option<u64>,
    /// Register slash commands on this guild only (instant) instead of globally.
    pub guild_id: Option<u64>,
}

/// Credentials and endpoints for the X (Twitter) API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XApiConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_secret: String,
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub access_token_secret: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_upload_base")]
    pub upload_base: String,
}

impl Default for XApiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_secret: String::new(),
            access_token: String::new(),
            access_token_secret: String::new(),
            api_base: default_api_base(),
            upload_base: default_upload_base(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImagesConfig {
    #[serde(default = "default_images_dir")]
    pub dir: String,
    #[serde(default = "default_max_bytes")]
    pub max_bytes: u64,
    #[serde(default = "default_max_per_post")]
    pub max_per_post: usize,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            dir: default_images_dir(),
            max_bytes: MAX_ATTACHMENT_BYTES,
            max_per_post: MAX_ATTACHMENTS_PER_POST,
        }
    }
}

/// Timing knobs for the publish loop.
///
/// The loop wakes every `loop_interval_secs` but only scans the store every
/// `check_interval_secs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
    #[serde(default = "default_loop_interval")]
    pub loop_interval_secs: u64,
    #[serde(default = "default_health_check_every")]
    pub health_check_every: u64,
    #[serde(default = "default_publish_timeout")]
    pub publish_timeout_secs: u64,
    /// Publish attempts slower than this are logged as slow. `0` disables.
    #[serde(default = "default_slow_publish_ms")]
    pub slow_publish_ms: u64,
    /// Sliding window for the error-rate alert.
    #[serde(default = "default_error_window")]
    pub error_window_secs: u64,
    /// Failures and errors within the window that raise an alert. `0` disables.
    #[serde(default = "default_error_alert_threshold")]
    pub error_alert_threshold: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: DEFAULT_CHECK_INTERVAL_SECS,
            loop_interval_secs: DEFAULT_LOOP_INTERVAL_SECS,
            health_check_every: DEFAULT_HEALTH_CHECK_EVERY,
            publish_timeout_secs: DEFAULT_PUBLISH_TIMEOUT_SECS,
            slow_publish_ms: DEFAULT_SLOW_PUBLISH_MS,
            error_window_secs: DEFAULT_ERROR_WINDOW_SECS,
            error_alert_threshold: DEFAULT_ERROR_ALERT_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_NOTIFY_QUEUE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "bool_true")]
    pub enabled: bool,
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: default_bind(),
            port: DEFAULT_HTTP_PORT,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogConfig {
    /// Fallback filter when RUST_LOG is unset, e.g. "info" or "xpost_scheduler=debug".
    pub level: Option<String>,
    /// Emit newline-delimited JSON instead of the human-readable format.
    #[serde(default)]
    pub json: bool,
}

fn bool_true() -> bool {
    true
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_port() -> u16 {
    DEFAULT_HTTP_PORT
}
fn default_api_base() -> String {
    "https://api.twitter.com".to_string()
}
fn default_upload_base() -> String {
    "https://upload.twitter.com".to_string()
}
fn default_max_bytes() -> u64 {
    MAX_ATTACHMENT_BYTES
}
fn default_max_per_post() -> usize {
    MAX_ATTACHMENTS_PER_POST
}
fn default_check_interval() -> u64 {
    DEFAULT_CHECK_INTERVAL_SECS
}
fn default_loop_interval() -> u64 {
    DEFAULT_LOOP_INTERVAL_SECS
}
fn default_health_check_every() -> u64 {
    DEFAULT_HEALTH_CHECK_EVERY
}
fn default_publish_timeout() -> u64 {
    DEFAULT_PUBLISH_TIMEOUT_SECS
}
fn default_slow_publish_ms() -> u64 {
    DEFAULT_SLOW_PUBLISH_MS
}
fn default_error_window() -> u64 {
    DEFAULT_ERROR_WINDOW_SECS
}
fn default_error_alert_threshold() -> u64 {
    DEFAULT_ERROR_ALERT_THRESHOLD
}
fn default_queue_capacity() -> usize {
    DEFAULT_NOTIFY_QUEUE
}

fn home_dir() -> String {
    std::env::var("HOME").unwrap_or_else(|_| ".".to_string())
}
fn default_db_path() -> String {
    format!("{}/.xpost/xpost.db", home_dir())
}
fn default_images_dir() -> String {
    format!("{}/.xpost/images", home_dir())
}
fn default_config_path() -> String {
    format!("{}/.xpost/xpost.toml", home_dir())
}

impl XpostConfig {
    /// Load config from a TOML file with XPOST_* env var overrides.
    ///
    /// Nested keys use a double underscore:
    /// `XPOST_SCHEDULER__CHECK_INTERVAL_SECS=15`.
    pub fn load(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("XPOST_").split("__"))
            .extract()
            .map_err(|e| ConfigError::Load(e.to_string()))
    }

    /// Names of required credentials that are empty.
    pub fn missing_credentials(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.discord.bot_token.is_empty() {
            missing.push("discord.bot_token");
        }
        if self.x.api_key.is_empty() {
            missing.push("x.api_key");
        }
        if self.x.api_secret.is_empty() {
            missing.push("x.api_secret");
        }
        if self.x.access_token.is_empty() {
            missing.push("x.access_token");
        }
        if self.x.access_token_secret.is_empty() {
            missing.push("x.access_token_secret");
        }
        missing
    }

    /// Full startup validation: credentials present and timing knobs sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let missing = self.missing_credentials();
        if !missing.is_empty() {
            return Err(ConfigError::MissingCredentials(missing.join(", ")));
        }
        self.scheduler.validate()?;
        if self.images.max_per_post == 0 || self.images.max_per_post > MAX_ATTACHMENTS_PER_POST {
            return Err(ConfigError::Invalid(format!(
                "images.max_per_post must be between 1 and {MAX_ATTACHMENTS_PER_POST}"
            )));
        }
        Ok(())
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.loop_interval_secs == 0 || self.check_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "scheduler intervals must be non-zero".to_string(),
            ));
        }
        if self.check_interval_secs < self.loop_interval_secs {
            return Err(ConfigError::Invalid(format!(
                "scheduler.check_interval_secs ({}) must be >= loop_interval_secs ({})",
                self.check_interval_secs, self.loop_interval_secs
            )));
        }
        if self.publish_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "scheduler.publish_timeout_secs must be non-zero".to_string(),
            ));
        }
        if self.error_alert_threshold > 0 && self.error_window_secs == 0 {
            return Err(ConfigError::Invalid(
                "scheduler.error_window_secs must be non-zero when alerts are enabled".to_string(),
            ));
        }
        Ok(())
    }
}
