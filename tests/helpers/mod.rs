//! Test helpers
//!
//! Recording doubles for the outbound seams, a handful of sample flows, and
//! a context wiring them to an in-memory session store.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Duration;
use serde_json::json;

use ClassChat::config::Settings;
use ClassChat::flows::{FlowDefinition, FlowEngine, FlowHandler, FlowRegistry, Step, Validation};
use ClassChat::handlers::Router;
use ClassChat::middleware::AdminRegistry;
use ClassChat::state::{FlowData, MemorySessionStore, SessionStore, ALL_PERMISSIONS};
use ClassChat::transport::{InboundEvent, Messenger, OutboundMessage};

pub const ADMIN_ID: &str = "U_ADMIN";
pub const USER_ID: &str = "U_PARENT";

/// Messenger double keeping every delivery in memory
#[derive(Debug, Default, Clone)]
pub struct RecordingMessenger {
    pub replies: Arc<Mutex<Vec<(String, Vec<OutboundMessage>)>>>,
    pub pushes: Arc<Mutex<Vec<(String, Vec<OutboundMessage>)>>>,
}

impl RecordingMessenger {
    pub fn reply_count(&self) -> usize {
        self.replies.lock().unwrap().len()
    }

    /// Messages of the most recent reply
    pub fn last_reply(&self) -> Vec<OutboundMessage> {
        self.replies
            .lock()
            .unwrap()
            .last()
            .map(|(_, messages)| messages.clone())
            .unwrap_or_default()
    }

    /// Bodies of the most recent reply, joined for substring checks
    pub fn last_reply_text(&self) -> String {
        self.last_reply()
            .iter()
            .map(|m| m.body().to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn reply(&self, reply_token: &str, messages: Vec<OutboundMessage>) -> ClassChat::Result<()> {
        self.replies.lock().unwrap().push((reply_token.to_string(), messages));
        Ok(())
    }

    async fn push(&self, user_id: &str, messages: Vec<OutboundMessage>) -> ClassChat::Result<()> {
        self.pushes.lock().unwrap().push((user_id.to_string(), messages));
        Ok(())
    }

    async fn multicast(&self, user_ids: &[String], messages: Vec<OutboundMessage>) -> ClassChat::Result<()> {
        let mut pushes = self.pushes.lock().unwrap();
        for user_id in user_ids {
            pushes.push((user_id.clone(), messages.clone()));
        }
        Ok(())
    }
}

/// Completion handler recording submissions, optionally failing them
#[derive(Debug, Default, Clone)]
pub struct RecordingHandler {
    pub submissions: Arc<Mutex<Vec<(String, FlowData)>>>,
    pub errors: Arc<Mutex<Vec<String>>>,
    pub fail_with: Option<String>,
    pub delay: Option<std::time::Duration>,
}

impl RecordingHandler {
    pub fn failing(message: &str) -> Self {
        Self {
            fail_with: Some(message.to_string()),
            ..Self::default()
        }
    }

    /// Handler whose completion takes a while, like a remote record store
    pub fn slow(delay: std::time::Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn submissions(&self) -> Vec<(String, FlowData)> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn error_count(&self) -> usize {
        self.errors.lock().unwrap().len()
    }
}

#[async_trait]
impl FlowHandler for RecordingHandler {
    async fn on_complete(&self, data: &FlowData, user_id: &str) -> anyhow::Result<Option<String>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &self.fail_with {
            anyhow::bail!("{}", message);
        }
        self.submissions.lock().unwrap().push((user_id.to_string(), data.clone()));
        Ok(None)
    }

    async fn on_error(&self, error: &anyhow::Error, _user_id: &str) -> anyhow::Result<()> {
        self.errors.lock().unwrap().push(error.to_string());
        Ok(())
    }
}

/// Two steps: a name of at least 3 characters, then an age stored as an integer
pub fn profile_flow(handler: RecordingHandler) -> FlowDefinition {
    FlowDefinition::new("profile", "Profile", handler)
        .step(Step::text("s1", "Your name?").validate(|input| {
            if input.trim().chars().count() >= 3 {
                Validation::Valid
            } else {
                Validation::invalid("❌ Name must be at least 3 characters.")
            }
        }))
        .step(Step::text("s2", "Your age?").transform(|input| Ok(json!(input.trim().parse::<i64>()?))))
}

/// Three steps where the second is skipped when the first answer is "X"
pub fn branching_flow(handler: RecordingHandler) -> FlowDefinition {
    FlowDefinition::new("branching", "Branching", handler)
        .step(Step::text("s1", "First?"))
        .step(Step::text("s2", "Second?").skip_if(|data| data.get("s1") == Some(&json!("X"))))
        .step(Step::text("s3", "Third?"))
}

/// Allow-list that can drop an admin mid-session and counts its checks
#[derive(Debug, Clone, Default)]
pub struct RevocableAdminRegistry {
    admins: Arc<Mutex<HashSet<String>>>,
    checks: Arc<AtomicUsize>,
}

impl RevocableAdminRegistry {
    pub fn with_admin(user_id: &str) -> Self {
        let registry = Self::default();
        registry.admins.lock().unwrap().insert(user_id.to_string());
        registry
    }

    pub fn revoke(&self, user_id: &str) {
        self.admins.lock().unwrap().remove(user_id);
    }

    /// How many times membership was asked
    pub fn check_count(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AdminRegistry for RevocableAdminRegistry {
    async fn is_registered_admin(&self, user_id: &str) -> ClassChat::Result<bool> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        Ok(self.admins.lock().unwrap().contains(user_id))
    }

    async fn permissions(&self, user_id: &str) -> ClassChat::Result<Vec<String>> {
        if self.admins.lock().unwrap().contains(user_id) {
            Ok(vec![ALL_PERMISSIONS.to_string()])
        } else {
            Ok(Vec::new())
        }
    }
}

/// Permission-gated flow ending in an image step
pub fn admin_flow(handler: RecordingHandler) -> FlowDefinition {
    FlowDefinition::new("add_student", "Add student", handler)
        .requires_permission("students.write")
        .step(Step::text("full_name", "Student's full name?"))
        .step(Step::image("photo", "Student photo?"))
}

/// Registry holding every sample flow
pub fn sample_registry(handler: &RecordingHandler) -> FlowRegistry {
    let mut registry = FlowRegistry::new();
    registry.register(profile_flow(handler.clone())).unwrap();
    registry.register(branching_flow(handler.clone())).unwrap();
    registry.register(admin_flow(handler.clone())).unwrap();
    registry
}

/// An engine of its own over a store shared with other engines
pub fn engine_on(store: Arc<MemorySessionStore>, handler: &RecordingHandler) -> FlowEngine {
    FlowEngine::new(Arc::new(sample_registry(handler)), store)
}

/// Everything a test needs, wired to an in-memory store
pub struct TestContext {
    pub store: Arc<MemorySessionStore>,
    pub engine: Arc<FlowEngine>,
    pub router: Router,
    pub messenger: RecordingMessenger,
    pub handler: RecordingHandler,
    pub admins: RevocableAdminRegistry,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_handler(RecordingHandler::default())
    }

    pub fn with_handler(handler: RecordingHandler) -> Self {
        let store = Arc::new(MemorySessionStore::new(Duration::minutes(30)));
        let dyn_store: Arc<dyn SessionStore> = store.clone();
        let engine = Arc::new(FlowEngine::new(Arc::new(sample_registry(&handler)), dyn_store));
        let messenger = RecordingMessenger::default();
        let admins = RevocableAdminRegistry::with_admin(ADMIN_ID);
        let router = Router::new(
            engine.clone(),
            Arc::new(admins.clone()),
            Arc::new(messenger.clone()),
            &Settings::default().router,
        );

        Self {
            store,
            engine,
            router,
            messenger,
            handler,
            admins,
        }
    }

    /// Dispatch a text message and return the reply that was sent
    pub async fn text(&self, user_id: &str, text: &str) -> Vec<OutboundMessage> {
        self.router.dispatch(text_event(user_id, text)).await;
        self.messenger.last_reply()
    }

    /// Dispatch a postback and return the reply that was sent
    pub async fn postback(&self, user_id: &str, data: &str) -> Vec<OutboundMessage> {
        self.router.dispatch(postback_event(user_id, data)).await;
        self.messenger.last_reply()
    }
}

pub fn text_event(user_id: &str, text: &str) -> InboundEvent {
    InboundEvent::Text {
        user_id: user_id.to_string(),
        text: text.to_string(),
        reply_token: format!("rt-{}", ClassChat::utils::helpers::generate_uuid()),
    }
}

pub fn postback_event(user_id: &str, data: &str) -> InboundEvent {
    InboundEvent::Postback {
        user_id: user_id.to_string(),
        data: data.to_string(),
        reply_token: format!("rt-{}", ClassChat::utils::helpers::generate_uuid()),
    }
}

pub fn image_event(user_id: &str, media_id: &str) -> InboundEvent {
    InboundEvent::Image {
        user_id: user_id.to_string(),
        media_id: media_id.to_string(),
        reply_token: format!("rt-{}", ClassChat::utils::helpers::generate_uuid()),
    }
}

/// Bodies of a reply joined for substring checks
pub fn joined(messages: &[OutboundMessage]) -> String {
    messages.iter().map(|m| m.body().to_string()).collect::<Vec<_>>().join("\n")
}
