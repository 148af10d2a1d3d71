//! Configuration validation module
//!
//! This module provides validation functions for application configuration
//! to ensure all required settings are properly configured.

use crate::utils::errors::{ClassChatError, Result};
use super::{SessionBackend, Settings};

/// Validate all configuration settings
pub fn validate_settings(settings: &Settings) -> Result<()> {
    validate_bot_config(&settings.bot)?;
    validate_session_config(&settings.session)?;
    validate_redis_config(&settings.redis, &settings.session)?;
    validate_router_config(&settings.router)?;
    validate_logging_config(&settings.logging)?;

    if let Some(ref database) = settings.database {
        validate_database_config(database)?;
    }

    Ok(())
}

/// Validate messaging API configuration
fn validate_bot_config(config: &super::BotConfig) -> Result<()> {
    if config.channel_access_token.is_empty() {
        return Err(ClassChatError::Config(
            "Channel access token is required".to_string()
        ));
    }

    if url::Url::parse(&config.api_base_url).is_err() {
        return Err(ClassChatError::Config(
            format!("Invalid messaging API base URL: {}", config.api_base_url)
        ));
    }

    if config.request_timeout_seconds == 0 {
        return Err(ClassChatError::Config(
            "Request timeout must be greater than 0".to_string()
        ));
    }

    Ok(())
}

/// Validate session store configuration
fn validate_session_config(config: &super::SessionConfig) -> Result<()> {
    if config.ttl_seconds == 0 {
        return Err(ClassChatError::Config(
            "Session TTL must be greater than 0".to_string()
        ));
    }

    if config.allow_memory_fallback && config.backend == SessionBackend::Memory {
        return Err(ClassChatError::Config(
            "Memory fallback only applies to the redis session backend".to_string()
        ));
    }

    if config.backend == SessionBackend::Redis && config.lock_timeout_ms == 0 {
        return Err(ClassChatError::Config(
            "Session lock timeout must be greater than 0".to_string()
        ));
    }

    if config.backend == SessionBackend::Redis && config.flow_lock_timeout_ms == 0 {
        return Err(ClassChatError::Config(
            "Flow lock timeout must be greater than 0".to_string()
        ));
    }

    Ok(())
}

/// Validate Redis configuration
fn validate_redis_config(config: &super::RedisConfig, session: &super::SessionConfig) -> Result<()> {
    if session.backend == SessionBackend::Redis && config.url.is_empty() {
        return Err(ClassChatError::Config(
            "Redis URL is required for the redis session backend".to_string()
        ));
    }

    Ok(())
}

/// Validate database configuration
fn validate_database_config(config: &super::DatabaseConfig) -> Result<()> {
    if config.url.is_empty() {
        return Err(ClassChatError::Config(
            "Database URL is required".to_string()
        ));
    }

    if config.max_connections == 0 {
        return Err(ClassChatError::Config(
            "Max connections must be greater than 0".to_string()
        ));
    }

    if config.min_connections > config.max_connections {
        return Err(ClassChatError::Config(
            "Min connections cannot be greater than max connections".to_string()
        ));
    }

    Ok(())
}

/// Validate router configuration
fn validate_router_config(config: &super::RouterConfig) -> Result<()> {
    if config.cancel_keywords.iter().all(|k| k.trim().is_empty()) {
        return Err(ClassChatError::Config(
            "At least one cancel keyword is required".to_string()
        ));
    }

    Ok(())
}

/// Validate logging configuration
fn validate_logging_config(config: &super::LoggingConfig) -> Result<()> {
    if config.level.is_empty() {
        return Err(ClassChatError::Config(
            "Log level is required".to_string()
        ));
    }

    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.level.as_str()) {
        return Err(ClassChatError::Config(
            format!("Invalid log level: {}. Valid levels: {:?}", config.level, valid_levels)
        ));
    }

    Ok(())
}
