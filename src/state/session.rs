//! Per-user conversation session
//!
//! This module holds the session record kept for every chat user: access
//! mode, elevation, and the state of the flow instance the user is in.

use chrono::{DateTime, Duration, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Answers collected by a flow instance, keyed by step id in commit order
pub type FlowData = IndexMap<String, serde_json::Value>;

/// Wildcard permission granting every flow
pub const ALL_PERMISSIONS: &str = "*";

/// Coarse access partition gating menus and flows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SessionMode {
    #[default]
    Public,
    Admin,
}

impl std::fmt::Display for SessionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionMode::Public => write!(f, "PUBLIC"),
            SessionMode::Admin => write!(f, "ADMIN"),
        }
    }
}

/// User conversation session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Chat user this session belongs to
    pub user_id: String,
    pub mode: SessionMode,
    pub is_admin: bool,
    pub permissions: Vec<String>,
    /// Flow the user is currently in, if any
    pub active_flow_id: Option<String>,
    pub flow_type: Option<String>,
    pub current_step: usize,
    pub total_steps: usize,
    pub flow_data: FlowData,
    /// Step ids visited or skipped, in order
    pub step_history: Vec<String>,
    /// Step whose prompt is outstanding
    pub waiting_for: Option<String>,
    pub can_abort: bool,
    pub expires_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Create a fresh idle public session
    pub fn new(user_id: &str, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.to_string(),
            mode: SessionMode::Public,
            is_admin: false,
            permissions: Vec::new(),
            active_flow_id: None,
            flow_type: None,
            current_step: 0,
            total_steps: 0,
            flow_data: FlowData::new(),
            step_history: Vec::new(),
            waiting_for: None,
            can_abort: true,
            expires_at: now + ttl,
            updated_at: now,
        }
    }

    /// Check if the session has passed its expiry
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// Slide expiry forward by the TTL
    pub fn touch(&mut self, ttl: Duration) {
        let now = Utc::now();
        self.expires_at = now + ttl;
        self.updated_at = now;
    }

    /// Whether the user is inside a flow
    pub fn in_flow(&self) -> bool {
        self.active_flow_id.is_some()
    }

    /// Whether the session satisfies the idle invariant
    pub fn is_idle(&self) -> bool {
        self.active_flow_id.is_none()
            && self.current_step == 0
            && self.flow_data.is_empty()
            && self.waiting_for.is_none()
    }

    /// Whether an elevated session holds the given permission
    pub fn has_permission(&self, permission: &str) -> bool {
        self.is_admin
            && self
                .permissions
                .iter()
                .any(|p| p == permission || p == ALL_PERMISSIONS)
    }

    /// Merge a partial update into this session
    pub fn apply(&mut self, patch: &SessionPatch) {
        if let Some(mode) = patch.mode {
            self.mode = mode;
        }
        if let Some(is_admin) = patch.is_admin {
            self.is_admin = is_admin;
        }
        if let Some(permissions) = &patch.permissions {
            self.permissions = permissions.clone();
        }
        if let Some(active_flow_id) = &patch.active_flow_id {
            self.active_flow_id = active_flow_id.clone();
        }
        if let Some(flow_type) = &patch.flow_type {
            self.flow_type = flow_type.clone();
        }
        if let Some(current_step) = patch.current_step {
            self.current_step = current_step;
        }
        if let Some(total_steps) = patch.total_steps {
            self.total_steps = total_steps;
        }
        if let Some(flow_data) = &patch.flow_data {
            self.flow_data = flow_data.clone();
        }
        if let Some(step_history) = &patch.step_history {
            self.step_history = step_history.clone();
        }
        if let Some(waiting_for) = &patch.waiting_for {
            self.waiting_for = waiting_for.clone();
        }
        if let Some(can_abort) = patch.can_abort {
            self.can_abort = can_abort;
        }
    }
}

/// Partial session update merged by the session store
///
/// `None` leaves a field untouched. Nullable fields use a nested option so a
/// patch can clear them: `Some(None)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionPatch {
    pub mode: Option<SessionMode>,
    pub is_admin: Option<bool>,
    pub permissions: Option<Vec<String>>,
    pub active_flow_id: Option<Option<String>>,
    pub flow_type: Option<Option<String>>,
    pub current_step: Option<usize>,
    pub total_steps: Option<usize>,
    pub flow_data: Option<FlowData>,
    pub step_history: Option<Vec<String>>,
    pub waiting_for: Option<Option<String>>,
    pub can_abort: Option<bool>,
}

impl SessionPatch {
    /// Reset the flow instance fields back to idle
    pub fn idle() -> Self {
        Self {
            active_flow_id: Some(None),
            flow_type: Some(None),
            current_step: Some(0),
            total_steps: Some(0),
            flow_data: Some(FlowData::new()),
            step_history: Some(Vec::new()),
            waiting_for: Some(None),
            can_abort: Some(true),
            ..Self::default()
        }
    }

    /// Switch access mode
    pub fn mode(mode: SessionMode) -> Self {
        Self {
            mode: Some(mode),
            ..Self::default()
        }
    }

    /// Mark the session as elevated with the given permissions
    pub fn elevate(permissions: Vec<String>) -> Self {
        Self {
            is_admin: Some(true),
            permissions: Some(permissions),
            ..Self::default()
        }
    }

    /// Drop elevation and permissions and return to public mode
    pub fn revoke() -> Self {
        Self {
            mode: Some(SessionMode::Public),
            is_admin: Some(false),
            permissions: Some(Vec::new()),
            ..Self::default()
        }
    }

    /// Whether applying this patch would leave the session elevated
    pub fn grants_admin(&self) -> bool {
        self.is_admin == Some(true) || self.mode == Some(SessionMode::Admin)
    }
}
