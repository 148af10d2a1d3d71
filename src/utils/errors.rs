//! Error handling for ClassChat
//!
//! This module defines the main error type used throughout the crate
//! and maps every error class onto the chat reply the user should see.

use thiserror::Error;

/// Main error type for ClassChat
#[derive(Error, Debug)]
pub enum ClassChatError {
    #[error("Unknown flow: {flow_id}")]
    UnknownFlow { flow_id: String },

    #[error("Flow already registered: {flow_id}")]
    DuplicateFlow { flow_id: String },

    #[error("Invalid flow definition {flow_id}: {reason}")]
    InvalidFlow { flow_id: String, reason: String },

    #[error("Flow {active_flow_id} is already in progress")]
    FlowAlreadyActive { active_flow_id: String },

    #[error("No flow is in progress")]
    NoActiveFlow,

    #[error("Flow {flow_id} cannot be cancelled")]
    AbortNotAllowed { flow_id: String },

    #[error("Flow completion failed: {0}")]
    Completion(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Session store error: {0}")]
    Store(String),

    #[error("Session of user {user_id} is busy with another request")]
    SessionBusy { user_id: String },

    #[error("Invalid postback data: {0}")]
    Postback(String),

    #[error("Handler {name} failed: {message}")]
    Handler { name: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration loading error: {0}")]
    ConfigLoad(#[from] ::config::ConfigError),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Messaging API error: {0}")]
    Messaging(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for ClassChat operations
pub type Result<T> = std::result::Result<T, ClassChatError>;

impl ClassChatError {
    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            ClassChatError::Postback(_) => ErrorSeverity::Info,
            ClassChatError::FlowAlreadyActive { .. } => ErrorSeverity::Info,
            ClassChatError::NoActiveFlow => ErrorSeverity::Info,
            ClassChatError::AbortNotAllowed { .. } => ErrorSeverity::Warning,
            ClassChatError::PermissionDenied(_) => ErrorSeverity::Warning,
            ClassChatError::SessionBusy { .. } => ErrorSeverity::Warning,
            ClassChatError::Config(_) => ErrorSeverity::Critical,
            ClassChatError::ConfigLoad(_) => ErrorSeverity::Critical,
            ClassChatError::Migration(_) => ErrorSeverity::Critical,
            ClassChatError::Store(_) | ClassChatError::Redis(_) => ErrorSeverity::Critical,
            _ => ErrorSeverity::Error,
        }
    }

    /// Whether this error came from the session store layer
    pub fn is_store_failure(&self) -> bool {
        matches!(
            self,
            ClassChatError::Store(_) | ClassChatError::Redis(_) | ClassChatError::Serialization(_)
        )
    }

    /// Chat reply shown to the user for this error
    pub fn user_message(&self) -> String {
        match self {
            ClassChatError::UnknownFlow { .. } => {
                "⚠️ This form is no longer available. Please start again from the menu.".to_string()
            }
            ClassChatError::FlowAlreadyActive { .. } => {
                "You already have a form in progress. Finish it or type \"cancel\" first.".to_string()
            }
            ClassChatError::NoActiveFlow => "There is nothing to cancel.".to_string(),
            ClassChatError::AbortNotAllowed { .. } => {
                "This form cannot be cancelled. Please complete it.".to_string()
            }
            ClassChatError::Completion(message) => format!("❌ Could not save: {}", message),
            ClassChatError::PermissionDenied(_) => "⛔ Access denied.".to_string(),
            ClassChatError::Postback(_) => "Sorry, that button is no longer valid.".to_string(),
            ClassChatError::SessionBusy { .. } => {
                "⏳ Your previous message is still being processed. Please try again.".to_string()
            }
            ClassChatError::Store(_) | ClassChatError::Redis(_) | ClassChatError::Serialization(_) => {
                "The service is temporarily unavailable. Please try again in a moment.".to_string()
            }
            _ => "Something went wrong. Please try again.".to_string(),
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl std::fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorSeverity::Info => write!(f, "INFO"),
            ErrorSeverity::Warning => write!(f, "WARN"),
            ErrorSeverity::Error => write!(f, "ERROR"),
            ErrorSeverity::Critical => write!(f, "CRITICAL"),
        }
    }
}
