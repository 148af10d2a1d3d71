//! Database repositories module
//!
//! This module contains all repository implementations for data access

pub mod admin;

// Re-export repositories
pub use admin::AdminRepository;
