//! ClassChat conversational flow engine
//!
//! A multi-step conversational flow engine for a school back-office chat
//! assistant. This library provides the session store, flow registry and
//! engine, event router, admin allow-list and chat transport plumbing; the
//! application supplies the flows and lookups.

#![allow(non_snake_case)]

pub mod config;
pub mod database;
pub mod flows;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod server;
pub mod state;
pub mod transport;
pub mod utils;

// Re-export commonly used types
pub use config::Settings;
pub use utils::errors::{ClassChatError, Result};

// Re-export main components for easy access
pub use flows::{FlowDefinition, FlowEngine, FlowHandler, FlowRegistry, InputOutcome, Step, StepInput};
pub use handlers::Router;
pub use state::{Session, SessionStore};
pub use transport::{InboundEvent, Messenger, OutboundMessage};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get library information
pub fn info() -> String {
    format!("{} v{}", NAME, VERSION)
}
