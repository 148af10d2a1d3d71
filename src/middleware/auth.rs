//! Admin authorization
//!
//! The admin registry is the durable allow-list. It is consulted every time
//! a user asks to enter admin mode, and on the first admin-only action of a
//! session. Between those checks the elevation lives in the session itself.

use std::collections::HashSet;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::Settings;
use crate::state::{Session, SessionMode, SessionPatch, SessionStore, ALL_PERMISSIONS};
use crate::utils::errors::{ClassChatError, Result};
use crate::utils::logging::log_admin_action;

/// Durable allow-list of admin users
#[async_trait]
pub trait AdminRegistry: Send + Sync {
    /// Check if the user may enter admin mode
    async fn is_registered_admin(&self, user_id: &str) -> Result<bool>;

    /// Permissions granted to a registered admin
    async fn permissions(&self, user_id: &str) -> Result<Vec<String>>;
}

/// Allow-list taken from `bot.admin_ids`; every listed admin holds all permissions
#[derive(Debug, Clone, Default)]
pub struct StaticAdminRegistry {
    admin_ids: HashSet<String>,
}

impl StaticAdminRegistry {
    /// Create a new StaticAdminRegistry instance
    pub fn new(settings: &Settings) -> Self {
        Self::from_ids(settings.bot.admin_ids.iter().cloned())
    }

    pub fn from_ids(ids: impl IntoIterator<Item = String>) -> Self {
        Self {
            admin_ids: ids
                .into_iter()
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty())
                .collect(),
        }
    }

    /// Get list of admin IDs
    pub fn admin_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.admin_ids.iter().cloned().collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl AdminRegistry for StaticAdminRegistry {
    async fn is_registered_admin(&self, user_id: &str) -> Result<bool> {
        Ok(self.admin_ids.contains(user_id))
    }

    async fn permissions(&self, user_id: &str) -> Result<Vec<String>> {
        if self.admin_ids.contains(user_id) {
            Ok(vec![ALL_PERMISSIONS.to_string()])
        } else {
            Ok(Vec::new())
        }
    }
}

/// Re-check the registry and bring the session's elevation in line with it
///
/// A registered admin gets their current permissions written to the session.
/// Anyone else loses whatever elevation the session still carries and gets
/// `PermissionDenied`.
pub async fn verify_admin(
    registry: &dyn AdminRegistry,
    store: &dyn SessionStore,
    session: Session,
    action: &str,
) -> Result<Session> {
    let user_id = session.user_id.clone();

    if !registry.is_registered_admin(&user_id).await? {
        if session.is_admin || session.mode == SessionMode::Admin {
            store.update(&user_id, &SessionPatch::revoke()).await?;
            warn!(user_id = %user_id, action = action, "Admin no longer registered, elevation revoked");
        }
        log_admin_action(&user_id, action, false);
        return Err(ClassChatError::PermissionDenied("Admin privileges required".to_string()));
    }

    let permissions = registry.permissions(&user_id).await?;
    let session = store.update(&user_id, &SessionPatch::elevate(permissions)).await?;
    log_admin_action(&user_id, action, true);
    Ok(session)
}

/// Make sure the session is elevated, consulting the registry on first use
///
/// An already elevated session is returned as is. Otherwise the registry is
/// asked once; a registered admin gets the elevation stored in the session,
/// anyone else gets `PermissionDenied` and no state change.
pub async fn ensure_elevated(
    registry: &dyn AdminRegistry,
    store: &dyn SessionStore,
    session: Session,
    action: &str,
) -> Result<Session> {
    if session.is_admin {
        debug!(user_id = %session.user_id, action = action, "Session already elevated");
        return Ok(session);
    }

    if !registry.is_registered_admin(&session.user_id).await? {
        log_admin_action(&session.user_id, action, false);
        return Err(ClassChatError::PermissionDenied("Admin privileges required".to_string()));
    }

    let permissions = registry.permissions(&session.user_id).await?;
    let session = store.update(&session.user_id, &SessionPatch::elevate(permissions)).await?;
    log_admin_action(&session.user_id, action, true);
    Ok(session)
}
