//! State management module
//!
//! This module handles per-user sessions and their storage tiers

pub mod session;
pub mod storage;

// Re-export commonly used state components
pub use session::{FlowData, Session, SessionMode, SessionPatch, ALL_PERMISSIONS};
pub use storage::{
    session_store_from_settings, Durability, FallbackSessionStore, MemorySessionStore, RedisSessionStore,
    SessionLock, SessionStore,
};
