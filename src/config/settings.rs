//! Application settings management
//!
//! This module defines the configuration structure and provides methods
//! for loading settings from TOML files and environment variables.

use serde::{Deserialize, Serialize};

/// Environment variable naming an alternative configuration file
pub const CONFIG_PATH_ENV: &str = "CLASSCHAT_CONFIG";

/// Main application configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    pub bot: BotConfig,
    pub session: SessionConfig,
    pub redis: RedisConfig,
    pub database: Option<DatabaseConfig>,
    pub router: RouterConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

/// Messaging API configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BotConfig {
    pub channel_access_token: String,
    pub api_base_url: String,
    pub admin_ids: Vec<String>,
    pub request_timeout_seconds: u64,
}

/// Session store backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionBackend {
    Memory,
    Redis,
}

/// Session store configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    pub backend: SessionBackend,
    pub ttl_seconds: u64,
    /// Serve public sessions from process memory while Redis is unreachable
    pub allow_memory_fallback: bool,
    pub lock_timeout_ms: u64,
    pub lock_retries: u32,
    /// Expiry of the per-user lock held for a whole flow operation, and the longest a waiter blocks on it
    pub flow_lock_timeout_ms: u64,
}

/// Redis configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RedisConfig {
    pub url: String,
    pub prefix: String,
}

/// Database configuration for the admin allow-list
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

/// Event router configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouterConfig {
    pub cancel_keywords: Vec<String>,
    pub fallback_text: String,
}

/// Webhook server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub bind_address: String,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file_path: String,
    pub json: bool,
}

impl Settings {
    /// Load settings from configuration file and environment variables
    pub fn new() -> Result<Self, config::ConfigError> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| "config".to_string());
        Self::load_from(&path)
    }

    /// Load settings from a specific file (extension optional) layered over defaults
    pub fn load_from(path: &str) -> Result<Self, config::ConfigError> {
        let defaults = config::Config::try_from(&Settings::default())?;

        let settings = config::Config::builder()
            .add_source(defaults)
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("CLASSCHAT")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("bot.admin_ids")
                    .with_list_parse_key("router.cancel_keywords")
                    .try_parsing(true),
            )
            .build()?;

        settings.try_deserialize()
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<(), crate::utils::errors::ClassChatError> {
        super::validation::validate_settings(self)
    }

    /// Session TTL as a chrono duration
    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.session.ttl_seconds as i64)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bot: BotConfig {
                channel_access_token: String::new(),
                api_base_url: "https://api.line.me".to_string(),
                admin_ids: vec![],
                request_timeout_seconds: 10,
            },
            session: SessionConfig {
                backend: SessionBackend::Memory,
                ttl_seconds: 30 * 60,
                allow_memory_fallback: false,
                lock_timeout_ms: 5_000,
                lock_retries: 50,
                flow_lock_timeout_ms: 30_000,
            },
            redis: RedisConfig {
                url: "redis://localhost:6379".to_string(),
                prefix: "classchat:".to_string(),
            },
            database: None,
            router: RouterConfig {
                cancel_keywords: vec![
                    "cancel".to_string(),
                    "/cancel".to_string(),
                    "abort".to_string(),
                    "stop".to_string(),
                ],
                fallback_text: "Sorry, I didn't understand that. Type \"menu\" to see what I can do.".to_string(),
            },
            server: ServerConfig {
                bind_address: "0.0.0.0:8080".to_string(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file_path: "logs".to_string(),
                json: false,
            },
        }
    }
}
