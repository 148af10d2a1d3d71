//! Logging configuration and setup
//!
//! This module provides logging initialization and structured logging utilities
//! for the ClassChat application.

use tracing::{info, warn, debug};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};
use crate::config::LoggingConfig;
use crate::utils::errors::{ClassChatError, Result};

/// Initialize logging based on configuration
///
/// The returned guard flushes the file appender when dropped, so keep it
/// alive for the whole lifetime of the process.
pub fn init_logging(config: &LoggingConfig) -> Result<WorkerGuard> {
    let file_appender = tracing_appender::rolling::daily(&config.file_path, "classchat.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = tracing_subscriber::EnvFilter::try_new(&config.level)
        .map_err(|e| ClassChatError::Config(format!("Invalid log filter: {}", e)))?;

    let stdout_layer = if config.json {
        tracing_subscriber::fmt::layer().json().with_writer(std::io::stdout).boxed()
    } else {
        tracing_subscriber::fmt::layer().with_writer(std::io::stdout).boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(non_blocking))
        .try_init()
        .map_err(|e| ClassChatError::Config(format!("Logging already initialized: {}", e)))?;

    info!("Logging initialized with level: {}", config.level);
    Ok(guard)
}

/// Log flow lifecycle events with structured data
pub fn log_flow_event(user_id: &str, flow_id: &str, event: &str, step_id: Option<&str>) {
    info!(
        user_id = user_id,
        flow_id = flow_id,
        event = event,
        step_id = step_id,
        "Flow event"
    );
}

/// Log admin actions
pub fn log_admin_action(user_id: &str, action: &str, granted: bool) {
    if granted {
        warn!(user_id = user_id, action = action, "Admin action performed");
    } else {
        warn!(user_id = user_id, action = action, "Admin action denied");
    }
}

/// Log a session served from the volatile fallback tier
pub fn log_store_degraded(user_id: &str, operation: &str, cause: &str) {
    warn!(
        user_id = user_id,
        operation = operation,
        cause = cause,
        durability = "volatile",
        "Session store degraded: serving from in-process memory, state will not survive a restart"
    );
}

/// Log inbound event classification
pub fn log_event_routed(user_id: &str, kind: &str, route: &str) {
    debug!(user_id = user_id, kind = kind, route = route, "Event routed");
}
