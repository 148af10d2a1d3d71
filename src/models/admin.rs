//! Admin model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::state::ALL_PERMISSIONS;

/// One row of the admin allow-list
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AdminRecord {
    pub user_id: String,
    pub display_name: Option<String>,
    pub permissions: Vec<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AdminRecord {
    pub fn is_superuser(&self) -> bool {
        self.permissions.iter().any(|p| p == ALL_PERMISSIONS)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAdminRequest {
    pub user_id: String,
    pub display_name: Option<String>,
    pub permissions: Vec<String>,
}
