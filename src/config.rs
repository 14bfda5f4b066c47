//! # Configuration Module
//!
//! This module defines the configuration structures for the bot: Telegram and
//! Paperless-NGX credentials, behaviour toggles, and the recovery settings used
//! by the HTTP client.
//!
//! Values are read from the environment (optionally seeded from a `.env` file).

use std::collections::HashSet;
use std::time::Duration;

use rand::Rng;
use secrecy::SecretString;
use thiserror::Error;

// Constants for bot configuration
pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const DEFAULT_KEYBOARD_PAGE_SIZE: usize = 8;
pub const DEFAULT_HEALTH_PORT: u16 = 8080;
pub const DEFAULT_LOG_LEVEL: &str = "info";
/// Paperless limits entity names to 128 characters
pub const MAX_ENTITY_NAME_LENGTH: usize = 128;
/// Largest file a bot may download from Telegram
pub const TELEGRAM_DOWNLOAD_LIMIT_BYTES: u64 = 20 * 1024 * 1024;
/// Largest file a bot may send to Telegram
pub const TELEGRAM_UPLOAD_LIMIT_BYTES: u64 = 50 * 1024 * 1024;

/// Errors raised while reading configuration
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("required environment variable '{0}' is not set")]
    Missing(&'static str),
    #[error("environment variable '{name}' has an invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
}

/// Recovery configuration for calls to the Paperless API
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    /// Timeout for a single HTTP request in seconds
    pub request_timeout_secs: u64,
    /// Maximum number of retry attempts for idempotent reads
    pub max_retries: u32,
    /// Base delay between retries in milliseconds
    pub base_retry_delay_ms: u64,
    /// Maximum delay between retries in milliseconds
    pub max_retry_delay_ms: u64,
    /// Interval between upload task status polls in milliseconds
    pub task_poll_interval_ms: u64,
    /// Give up waiting for an upload task after this many seconds
    pub task_timeout_secs: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            max_retries: 3,
            base_retry_delay_ms: 500,
            max_retry_delay_ms: 5000,
            task_poll_interval_ms: 2000, // 2 seconds
            task_timeout_secs: 60,       // 1 minute
        }
    }
}

impl RecoveryConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn task_poll_interval(&self) -> Duration {
        Duration::from_millis(self.task_poll_interval_ms)
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }

    /// Delay before retry number `attempt` (zero-based)
    ///
    /// Exponential backoff capped at `max_retry_delay_ms`, plus up to 25% random
    /// jitter so that concurrent chats do not hammer the service in lockstep.
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let exponential = self
            .base_retry_delay_ms
            .saturating_mul(1u64 << attempt.min(16));
        let capped = exponential.min(self.max_retry_delay_ms);
        let jitter = if capped >= 4 {
            rand::thread_rng().gen_range(0..=capped / 4)
        } else {
            0
        };
        Duration::from_millis(capped + jitter)
    }
}

/// Complete runtime configuration
#[derive(Debug)]
pub struct Config {
    pub telegram_bot_token: SecretString,
    /// Telegram user ids allowed to talk to the bot; empty means open to everyone
    pub allowed_users: HashSet<u64>,
    pub paperless_url: String,
    pub paperless_token: SecretString,
    /// Base URL used in links shown to users
    pub paperless_public_url: String,
    /// Documents per listing page
    pub page_size: usize,
    /// Entities per selection keyboard page
    pub keyboard_page_size: usize,
    pub remove_inbox_on_done: bool,
    /// Explicit inbox tag name; auto-detected when absent
    pub inbox_tag: Option<String>,
    pub log_level: String,
    pub log_json: bool,
    pub health_port: u16,
    pub recovery: RecoveryConfig,
}

impl Config {
    /// Load configuration from the process environment, reading `.env` first if present
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let telegram_bot_token = SecretString::from(required("TELEGRAM_BOT_TOKEN")?);
        let paperless_url = required("PAPERLESS_URL")?.trim_end_matches('/').to_string();
        let paperless_token = SecretString::from(required("PAPERLESS_TOKEN")?);

        let allowed_users = match get("TELEGRAM_ALLOWED_USERS") {
            Some(value) => parse_id_set("TELEGRAM_ALLOWED_USERS", &value)?,
            None => HashSet::new(),
        };

        let paperless_public_url = get("PAPERLESS_PUBLIC_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| paperless_url.clone());

        let page_size = parse_number("MAX_SEARCH_RESULTS", get("MAX_SEARCH_RESULTS"), DEFAULT_PAGE_SIZE)?;
        let keyboard_page_size = parse_number(
            "KEYBOARD_PAGE_SIZE",
            get("KEYBOARD_PAGE_SIZE"),
            DEFAULT_KEYBOARD_PAGE_SIZE,
        )?;
        let health_port = parse_number("HEALTH_PORT", get("HEALTH_PORT"), DEFAULT_HEALTH_PORT)?;

        let remove_inbox_on_done = match get("REMOVE_INBOX_ON_DONE") {
            Some(value) => parse_bool("REMOVE_INBOX_ON_DONE", &value)?,
            None => false,
        };

        let log_level = get("LOG_LEVEL")
            .map(|level| normalize_log_level(&level))
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());
        let log_json = get("LOG_FORMAT").is_some_and(|format| format.eq_ignore_ascii_case("json"));

        Ok(Self {
            telegram_bot_token,
            allowed_users,
            paperless_url,
            paperless_token,
            paperless_public_url,
            page_size,
            keyboard_page_size,
            remove_inbox_on_done,
            inbox_tag: get("INBOX_TAG"),
            log_level,
            log_json,
            health_port,
            recovery: RecoveryConfig::default(),
        })
    }
}

/// Parse a comma-separated list of Telegram user ids
pub fn parse_id_set(name: &'static str, value: &str) -> Result<HashSet<u64>, ConfigError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(|id| {
            id.parse::<u64>().map_err(|_| ConfigError::Invalid {
                name,
                value: id.to_string(),
            })
        })
        .collect()
}

fn parse_number<T: std::str::FromStr + PartialOrd + Default>(
    name: &'static str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    let Some(value) = value else {
        return Ok(default);
    };
    match value.parse::<T>() {
        Ok(parsed) if parsed > T::default() => Ok(parsed),
        _ => Err(ConfigError::Invalid { name, value }),
    }
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            name,
            value: value.to_string(),
        }),
    }
}

/// Map a `LOG_LEVEL` value onto a tracing filter directive
fn normalize_log_level(level: &str) -> String {
    match level.to_ascii_lowercase().as_str() {
        "warning" => "warn".to_string(),
        "critical" | "fatal" => "error".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const REQUIRED: [(&str, &str); 3] = [
        ("TELEGRAM_BOT_TOKEN", "test-token"),
        ("PAPERLESS_URL", "http://localhost:8000/"),
        ("PAPERLESS_TOKEN", "test-api-token"),
    ];

    #[test]
    fn test_loads_required_vars_and_defaults() {
        let config = Config::from_lookup(lookup_from(&REQUIRED)).unwrap();

        assert_eq!(config.telegram_bot_token.expose_secret(), "test-token");
        assert_eq!(config.paperless_url, "http://localhost:8000");
        assert_eq!(config.paperless_public_url, "http://localhost:8000");
        assert_eq!(config.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(config.keyboard_page_size, DEFAULT_KEYBOARD_PAGE_SIZE);
        assert_eq!(config.health_port, 8080);
        assert!(config.allowed_users.is_empty());
        assert!(!config.remove_inbox_on_done);
        assert_eq!(config.inbox_tag, None);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_missing_required_var() {
        let err = Config::from_lookup(lookup_from(&REQUIRED[1..])).unwrap_err();
        assert_eq!(err, ConfigError::Missing("TELEGRAM_BOT_TOKEN"));

        let mut pairs = REQUIRED.to_vec();
        pairs[1] = ("PAPERLESS_URL", "   ");
        let err = Config::from_lookup(lookup_from(&pairs)).unwrap_err();
        assert_eq!(err, ConfigError::Missing("PAPERLESS_URL"));
    }

    #[test]
    fn test_allowed_users_parsing() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("TELEGRAM_ALLOWED_USERS", "123, 456,,789"));
        let config = Config::from_lookup(lookup_from(&pairs)).unwrap();
        assert_eq!(config.allowed_users, HashSet::from([123, 456, 789]));

        assert!(parse_id_set("TELEGRAM_ALLOWED_USERS", "12,abc").is_err());
    }

    #[test]
    fn test_behaviour_toggles() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([
            ("REMOVE_INBOX_ON_DONE", "TRUE"),
            ("INBOX_TAG", "Posteingang"),
            ("MAX_SEARCH_RESULTS", "5"),
            ("PAPERLESS_PUBLIC_URL", "https://docs.example.org/"),
            ("LOG_LEVEL", "WARN"),
            ("LOG_FORMAT", "json"),
        ]);
        let config = Config::from_lookup(lookup_from(&pairs)).unwrap();

        assert!(config.remove_inbox_on_done);
        assert_eq!(config.inbox_tag.as_deref(), Some("Posteingang"));
        assert_eq!(config.page_size, 5);
        assert_eq!(config.paperless_public_url, "https://docs.example.org");
        assert_eq!(config.log_level, "warn");
        assert!(config.log_json);
    }

    #[test]
    fn test_invalid_numbers_are_rejected() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("MAX_SEARCH_RESULTS", "0"));
        assert!(matches!(
            Config::from_lookup(lookup_from(&pairs)),
            Err(ConfigError::Invalid { name: "MAX_SEARCH_RESULTS", .. })
        ));

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("HEALTH_PORT", "http"));
        assert!(Config::from_lookup(lookup_from(&pairs)).is_err());
    }

    #[test]
    fn test_retry_delay_bounds() {
        let recovery = RecoveryConfig::default();

        let first = recovery.retry_delay(0);
        assert!(first >= Duration::from_millis(500));
        assert!(first <= Duration::from_millis(625));

        // Capped at the maximum delay plus jitter
        let late = recovery.retry_delay(10);
        assert!(late >= Duration::from_millis(5000));
        assert!(late <= Duration::from_millis(6250));
    }
}
