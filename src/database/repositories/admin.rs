//! Admin repository implementation
//!
//! Postgres-backed admin allow-list. Only active rows grant elevation.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use tracing::info;

use crate::middleware::auth::AdminRegistry;
use crate::models::admin::{AdminRecord, CreateAdminRequest};
use crate::utils::errors::Result;

#[derive(Debug, Clone)]
pub struct AdminRepository {
    pool: PgPool,
}

impl AdminRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create an admin, or reactivate and update an existing one
    pub async fn upsert(&self, request: CreateAdminRequest) -> Result<AdminRecord> {
        let admin = sqlx::query_as::<_, AdminRecord>(
            r#"
            INSERT INTO admins (user_id, display_name, permissions, active, created_at, updated_at)
            VALUES ($1, $2, $3, TRUE, $4, $4)
            ON CONFLICT (user_id)
            DO UPDATE SET
                display_name = EXCLUDED.display_name,
                permissions = EXCLUDED.permissions,
                active = TRUE,
                updated_at = EXCLUDED.updated_at
            RETURNING user_id, display_name, permissions, active, created_at, updated_at
            "#,
        )
        .bind(&request.user_id)
        .bind(&request.display_name)
        .bind(&request.permissions)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        info!(user_id = %admin.user_id, "Admin registered");
        Ok(admin)
    }

    /// Get an active admin by user id
    pub async fn find_active(&self, user_id: &str) -> Result<Option<AdminRecord>> {
        let admin = sqlx::query_as::<_, AdminRecord>(
            "SELECT user_id, display_name, permissions, active, created_at, updated_at FROM admins WHERE user_id = $1 AND active",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(admin)
    }

    /// Revoke an admin without deleting the row. Returns false for an unknown user.
    pub async fn deactivate(&self, user_id: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE admins SET active = FALSE, updated_at = $2 WHERE user_id = $1")
            .bind(user_id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        info!(user_id = user_id, "Admin deactivated");
        Ok(true)
    }
}

#[async_trait]
impl AdminRegistry for AdminRepository {
    async fn is_registered_admin(&self, user_id: &str) -> Result<bool> {
        Ok(self.find_active(user_id).await?.is_some())
    }

    async fn permissions(&self, user_id: &str) -> Result<Vec<String>> {
        Ok(self.find_active(user_id).await?.map(|a| a.permissions).unwrap_or_default())
    }
}
