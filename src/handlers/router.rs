//! Event router
//!
//! Classifies one inbound event and dispatches it to the flow engine, a
//! built-in command, a registered action or lookup, or the fallback reply.
//! Errors never escape [`Router::dispatch`]: each one becomes a chat reply.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::config::RouterConfig;
use crate::flows::{FlowEngine, StepInput};
use crate::middleware::auth::{ensure_elevated, verify_admin, AdminRegistry};
use crate::state::{Session, SessionMode, SessionPatch, SessionStore};
use crate::transport::client::Messenger;
use crate::transport::events::InboundEvent;
use crate::transport::messages::{cap_reply, OutboundMessage};
use crate::transport::postback::PostbackAction;
use crate::utils::errors::{ClassChatError, ErrorSeverity, Result};
use crate::utils::helpers::normalize_command;
use crate::utils::logging::log_event_routed;
use super::actions::{ActionHandler, QuickLookup};
use super::menus::{DefaultMenuRenderer, MenuRenderer};

const BUSY_NOTICE: &str = "You have a form in progress. Finish it or type \"cancel\" first.";

/// Built-in text commands available outside flows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Menu,
    EnterAdmin,
    ExitAdmin,
    Logout,
}

impl Command {
    fn parse(normalized: &str) -> Option<Self> {
        match normalized {
            "menu" | "help" => Some(Command::Menu),
            "admin" => Some(Command::EnterAdmin),
            "exit admin" | "public" => Some(Command::ExitAdmin),
            "logout" => Some(Command::Logout),
            _ => None,
        }
    }
}

/// Dispatches inbound events
pub struct Router {
    engine: Arc<FlowEngine>,
    admins: Arc<dyn AdminRegistry>,
    messenger: Arc<dyn Messenger>,
    menus: Box<dyn MenuRenderer>,
    actions: HashMap<String, Arc<dyn ActionHandler>>,
    lookups: Vec<Arc<dyn QuickLookup>>,
    cancel_keywords: Vec<String>,
    fallback_text: String,
}

impl Router {
    pub fn new(
        engine: Arc<FlowEngine>,
        admins: Arc<dyn AdminRegistry>,
        messenger: Arc<dyn Messenger>,
        config: &RouterConfig,
    ) -> Self {
        Self {
            engine,
            admins,
            messenger,
            menus: Box::new(DefaultMenuRenderer),
            actions: HashMap::new(),
            lookups: Vec::new(),
            cancel_keywords: config
                .cancel_keywords
                .iter()
                .map(|k| normalize_command(k))
                .filter(|k| !k.is_empty())
                .collect(),
            fallback_text: config.fallback_text.clone(),
        }
    }

    /// Replace the default menu renderer
    pub fn with_menu_renderer(mut self, menus: impl MenuRenderer + 'static) -> Self {
        self.menus = Box::new(menus);
        self
    }

    /// Register a custom postback action; the name must not shadow a built-in one
    pub fn register_action(&mut self, name: &str, handler: impl ActionHandler + 'static) -> Result<()> {
        if matches!(name, "start_flow" | "answer" | "cancel" | "menu" | "switch_mode") {
            return Err(ClassChatError::Config(format!("Action name {} is reserved", name)));
        }
        if self.actions.contains_key(name) {
            return Err(ClassChatError::Config(format!("Action {} is already registered", name)));
        }

        self.actions.insert(name.to_string(), Arc::new(handler));
        Ok(())
    }

    /// Register a quick lookup; lookups are tried in registration order
    pub fn register_lookup(&mut self, lookup: impl QuickLookup + 'static) {
        self.lookups.push(Arc::new(lookup));
    }

    fn store(&self) -> &Arc<dyn SessionStore> {
        self.engine.store()
    }

    /// Handle one event and deliver the reply; never fails
    pub async fn dispatch(&self, event: InboundEvent) {
        let messages = match self.handle(&event).await {
            Ok(messages) => messages,
            Err(e) => {
                match e.severity() {
                    ErrorSeverity::Info => {
                        debug!(user_id = event.user_id(), kind = event.kind(), error = %e, "Event rejected")
                    }
                    ErrorSeverity::Warning => {
                        warn!(user_id = event.user_id(), kind = event.kind(), error = %e, "Event rejected")
                    }
                    ErrorSeverity::Error | ErrorSeverity::Critical => {
                        error!(user_id = event.user_id(), kind = event.kind(), error = %e, severity = %e.severity(), "Event handling failed")
                    }
                }
                vec![OutboundMessage::text(e.user_message())]
            }
        };

        let Some(reply_token) = event.reply_token() else {
            return;
        };
        if messages.is_empty() {
            return;
        }

        if let Err(e) = self.messenger.reply(reply_token, cap_reply(messages)).await {
            error!(user_id = event.user_id(), error = %e, "Failed to deliver reply");
        }
    }

    /// Handle one event and return the reply messages
    pub async fn handle(&self, event: &InboundEvent) -> Result<Vec<OutboundMessage>> {
        match event {
            InboundEvent::Text { user_id, text, .. } => self.handle_text(user_id, text).await,
            InboundEvent::Postback { user_id, data, .. } => self.handle_postback(user_id, data).await,
            InboundEvent::Image { user_id, media_id, .. } => self.handle_image(user_id, media_id).await,
            InboundEvent::Follow { user_id, .. } => {
                log_event_routed(user_id, "follow", "menu");
                let session = self.store().get(user_id).await?;
                let mut messages = vec![OutboundMessage::text("👋 Welcome! Here is what I can do:")];
                messages.extend(self.menus.render(&session, self.engine.registry()));
                Ok(messages)
            }
            InboundEvent::Unfollow { user_id } => {
                log_event_routed(user_id, "unfollow", "delete_session");
                self.store().delete(user_id).await?;
                Ok(Vec::new())
            }
        }
    }

    async fn handle_text(&self, user_id: &str, text: &str) -> Result<Vec<OutboundMessage>> {
        let session = self.store().get(user_id).await?;
        let normalized = normalize_command(text);
        let is_cancel = self.cancel_keywords.contains(&normalized);

        if session.in_flow() {
            if is_cancel {
                log_event_routed(user_id, "text", "abort_flow");
                return self.cancel(user_id).await;
            }

            let outcome = self.engine.process_input(user_id, StepInput::text(text)).await?;
            if outcome.is_handled() {
                log_event_routed(user_id, "text", "process_input");
                return Ok(outcome.into_messages());
            }
        }

        if is_cancel {
            log_event_routed(user_id, "text", "nothing_to_cancel");
            let mut messages = vec![OutboundMessage::text(ClassChatError::NoActiveFlow.user_message())];
            messages.extend(self.menus.render(&session, self.engine.registry()));
            return Ok(messages);
        }

        if let Some(command) = Command::parse(&normalized) {
            log_event_routed(user_id, "text", "command");
            return self.run_command(session, command).await;
        }

        let trimmed = text.trim();
        let admin_mode = session.is_admin && session.mode == SessionMode::Admin;
        for lookup in &self.lookups {
            if lookup.admin_only() && !admin_mode {
                continue;
            }
            if lookup.matches(trimmed) {
                log_event_routed(user_id, "text", "quick_lookup");
                return lookup.lookup(&session, trimmed).await.map_err(|e| ClassChatError::Handler {
                    name: "quick_lookup".to_string(),
                    message: e.to_string(),
                });
            }
        }

        log_event_routed(user_id, "text", "fallback");
        Ok(vec![OutboundMessage::text(self.fallback_text.clone())])
    }

    async fn handle_postback(&self, user_id: &str, data: &str) -> Result<Vec<OutboundMessage>> {
        let action = PostbackAction::parse(data)?;
        let session = self.store().get(user_id).await?;
        debug!(user_id = user_id, action = action.name(), "Postback received");

        if session.in_flow() {
            match action {
                PostbackAction::Answer { value } => {
                    let outcome = self.engine.process_input(user_id, StepInput::Text(value)).await?;
                    if outcome.is_handled() {
                        log_event_routed(user_id, "postback", "process_input");
                        return Ok(outcome.into_messages());
                    }
                    return Ok(self.menus.render(&self.store().get(user_id).await?, self.engine.registry()));
                }
                PostbackAction::Cancel => {
                    log_event_routed(user_id, "postback", "abort_flow");
                    return self.cancel(user_id).await;
                }
                _ => {
                    log_event_routed(user_id, "postback", "busy");
                    let mut messages = vec![OutboundMessage::text(BUSY_NOTICE)];
                    messages.extend(self.engine.send_current_step(user_id).await?);
                    return Ok(messages);
                }
            }
        }

        log_event_routed(user_id, "postback", action.name());
        match action {
            PostbackAction::StartFlow { flow_id } => self.engine.start_flow(user_id, &flow_id).await,
            PostbackAction::Answer { .. } => {
                let mut messages = vec![OutboundMessage::text("There is no question waiting for an answer.")];
                messages.extend(self.menus.render(&session, self.engine.registry()));
                Ok(messages)
            }
            PostbackAction::Cancel => {
                let mut messages = vec![OutboundMessage::text(ClassChatError::NoActiveFlow.user_message())];
                messages.extend(self.menus.render(&session, self.engine.registry()));
                Ok(messages)
            }
            PostbackAction::Menu => Ok(self.menus.render(&session, self.engine.registry())),
            PostbackAction::SwitchMode { mode: SessionMode::Admin } => {
                self.run_command(session, Command::EnterAdmin).await
            }
            PostbackAction::SwitchMode { mode: SessionMode::Public } => {
                self.run_command(session, Command::ExitAdmin).await
            }
            PostbackAction::Custom { name, params } => {
                let handler = self
                    .actions
                    .get(&name)
                    .cloned()
                    .ok_or_else(|| ClassChatError::Postback(format!("unknown action {}", name)))?;

                let session = if handler.admin_only() {
                    ensure_elevated(self.admins.as_ref(), self.store().as_ref(), session, &name).await?
                } else {
                    session
                };

                handler
                    .handle(&session, &params)
                    .await
                    .map_err(|e| ClassChatError::Handler { name, message: e.to_string() })
            }
        }
    }

    async fn handle_image(&self, user_id: &str, media_id: &str) -> Result<Vec<OutboundMessage>> {
        let outcome = self
            .engine
            .process_input(user_id, StepInput::Image { media_id: media_id.to_string() })
            .await?;

        if outcome.is_handled() {
            log_event_routed(user_id, "image", "process_input");
            return Ok(outcome.into_messages());
        }

        log_event_routed(user_id, "image", "fallback");
        Ok(vec![OutboundMessage::text(self.fallback_text.clone())])
    }

    /// Abort the active flow and show the menu
    async fn cancel(&self, user_id: &str) -> Result<Vec<OutboundMessage>> {
        let mut messages = self.engine.abort_flow(user_id).await?;
        let session = self.store().get(user_id).await?;
        messages.extend(self.menus.render(&session, self.engine.registry()));
        Ok(messages)
    }

    async fn run_command(&self, session: Session, command: Command) -> Result<Vec<OutboundMessage>> {
        let user_id = session.user_id.clone();

        match command {
            Command::Menu => Ok(self.menus.render(&session, self.engine.registry())),
            Command::EnterAdmin => {
                verify_admin(self.admins.as_ref(), self.store().as_ref(), session, "enter_admin").await?;
                let session = self.store().update(&user_id, &SessionPatch::mode(SessionMode::Admin)).await?;
                info!(user_id = %user_id, permissions = ?session.permissions, "Admin mode enabled");

                let mut messages = vec![OutboundMessage::text("🔐 Admin mode enabled.")];
                messages.extend(self.menus.render(&session, self.engine.registry()));
                Ok(messages)
            }
            Command::ExitAdmin => {
                let session = self.store().update(&user_id, &SessionPatch::mode(SessionMode::Public)).await?;
                let mut messages = vec![OutboundMessage::text("Back to public mode.")];
                messages.extend(self.menus.render(&session, self.engine.registry()));
                Ok(messages)
            }
            Command::Logout => {
                self.store().delete(&user_id).await?;
                info!(user_id = %user_id, "User logged out");
                Ok(vec![OutboundMessage::text("👋 You have been logged out.")])
            }
        }
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("engine", &self.engine)
            .field("actions", &self.actions.keys().collect::<Vec<_>>())
            .field("lookups", &self.lookups.len())
            .field("cancel_keywords", &self.cancel_keywords)
            .finish()
    }
}
