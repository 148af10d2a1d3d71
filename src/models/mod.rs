//! Data models module
//!
//! This module contains the database row types

pub mod admin;

// Re-export commonly used models
pub use admin::{AdminRecord, CreateAdminRequest};
