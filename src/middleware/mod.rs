//! Middleware module
//!
//! This module contains authorization checks applied before dispatch

pub mod auth;

// Re-export commonly used middleware
pub use auth::{ensure_elevated, verify_admin, AdminRegistry, StaticAdminRegistry};
