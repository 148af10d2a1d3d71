//! Database module
//!
//! This module handles the Postgres connection backing the admin allow-list

pub mod connection;
pub mod repositories;

// Re-export commonly used database components
pub use connection::{create_pool, health_check, run_migrations, DatabasePool};
pub use repositories::AdminRepository;
