//! Event router integration tests
//!
//! Every test goes through `Router::dispatch` and inspects what reached the
//! recording messenger, the way a chat user would see it.

mod helpers;

use std::collections::BTreeMap;

use assert_matches::assert_matches;
use async_trait::async_trait;

use helpers::*;
use ClassChat::config::Settings;
use ClassChat::handlers::{ActionHandler, PatternLookup};
use ClassChat::state::{Session, SessionMode, SessionStore};
use ClassChat::transport::{InboundEvent, OutboundMessage, PostbackAction, MAX_REPLY_MESSAGES};
use ClassChat::ClassChatError;

fn menu_labels(messages: &[OutboundMessage]) -> Vec<String> {
    messages
        .iter()
        .filter(|m| matches!(m, OutboundMessage::Card { .. }))
        .flat_map(|m| m.buttons().into_iter().map(|b| b.label.clone()))
        .collect()
}

fn start(flow_id: &str) -> String {
    PostbackAction::StartFlow { flow_id: flow_id.to_string() }.to_data()
}

struct ExportAction {
    messages: usize,
}

#[async_trait]
impl ActionHandler for ExportAction {
    fn admin_only(&self) -> bool {
        true
    }

    async fn handle(&self, session: &Session, params: &BTreeMap<String, String>) -> anyhow::Result<Vec<OutboundMessage>> {
        let class = params.get("class").cloned().unwrap_or_default();
        Ok((0..self.messages)
            .map(|i| OutboundMessage::text(format!("{} export {} for {}", class, i, session.user_id)))
            .collect())
    }
}

struct BrokenAction;

#[async_trait]
impl ActionHandler for BrokenAction {
    async fn handle(&self, _session: &Session, _params: &BTreeMap<String, String>) -> anyhow::Result<Vec<OutboundMessage>> {
        anyhow::bail!("upstream timed out")
    }
}

#[tokio::test]
async fn test_menu_lists_public_flows() {
    let ctx = TestContext::new();
    let reply = ctx.text(USER_ID, "  MENU ").await;

    assert_matches!(&reply[0], OutboundMessage::Card { title, .. } if title == "📋 Menu");
    assert_eq!(menu_labels(&reply), vec!["Profile", "Branching"]);
}

#[tokio::test]
async fn test_follow_greets_with_menu() {
    let ctx = TestContext::new();
    ctx.router
        .dispatch(InboundEvent::Follow {
            user_id: USER_ID.to_string(),
            reply_token: "rt-follow".to_string(),
        })
        .await;

    let reply = ctx.messenger.last_reply();
    assert!(reply[0].body().starts_with("👋 Welcome!"));
    assert_eq!(menu_labels(&reply), vec!["Profile", "Branching"]);
}

#[tokio::test]
async fn test_unfollow_deletes_session_without_reply() {
    let ctx = TestContext::new();
    ctx.postback(USER_ID, &start("profile")).await;
    let replies = ctx.messenger.reply_count();
    assert_eq!(ctx.store.len(), 1);

    ctx.router
        .dispatch(InboundEvent::Unfollow {
            user_id: USER_ID.to_string(),
        })
        .await;

    assert_eq!(ctx.store.len(), 0);
    assert_eq!(ctx.messenger.reply_count(), replies);
}

#[tokio::test]
async fn test_flow_through_postbacks_and_text() {
    let ctx = TestContext::new();

    let reply = ctx.postback(USER_ID, &start("profile")).await;
    assert_eq!(reply[0].body(), "(1/2) Your name?");

    // Text that looks like a command is an answer while a flow is active
    let reply = ctx.text(USER_ID, "menu").await;
    assert_eq!(reply[0].body(), "(2/2) Your age?");

    let answer = PostbackAction::Answer { value: "12".to_string() }.to_data();
    let reply = ctx.postback(USER_ID, &answer).await;
    assert_eq!(reply, vec![OutboundMessage::text("✅ Profile completed.")]);

    let data = &ctx.handler.submissions()[0].1;
    assert_eq!(data.get("s1"), Some(&serde_json::json!("menu")));
    assert_eq!(data.get("s2"), Some(&serde_json::json!(12)));
}

#[tokio::test]
async fn test_invalid_answer_reprompts() {
    let ctx = TestContext::new();
    ctx.postback(USER_ID, &start("profile")).await;

    let reply = ctx.text(USER_ID, "Al").await;
    assert_eq!(reply.len(), 2);
    assert_eq!(reply[0].body(), "❌ Name must be at least 3 characters.");
    assert_eq!(reply[1].body(), "(1/2) Your name?");
}

#[tokio::test]
async fn test_cancel_keyword_aborts_and_shows_menu() {
    let ctx = TestContext::new();
    ctx.postback(USER_ID, &start("profile")).await;
    ctx.text(USER_ID, "Alice").await;

    let reply = ctx.text(USER_ID, "/Cancel").await;
    assert_eq!(reply[0], OutboundMessage::text("❌ Profile cancelled."));
    assert_eq!(menu_labels(&reply), vec!["Profile", "Branching"]);
    assert!(ctx.store.get(USER_ID).await.unwrap().is_idle());
    assert!(ctx.handler.submissions().is_empty());
}

#[tokio::test]
async fn test_cancel_button_aborts() {
    let ctx = TestContext::new();
    ctx.postback(USER_ID, &start("branching")).await;

    let reply = ctx.postback(USER_ID, &PostbackAction::Cancel.to_data()).await;
    assert_eq!(reply[0], OutboundMessage::text("❌ Branching cancelled."));
    assert!(ctx.store.get(USER_ID).await.unwrap().is_idle());
}

#[tokio::test]
async fn test_cancel_without_flow() {
    let ctx = TestContext::new();
    let reply = ctx.text(USER_ID, "stop").await;
    assert_eq!(reply[0], OutboundMessage::text("There is nothing to cancel."));
    assert_eq!(menu_labels(&reply), vec!["Profile", "Branching"]);
}

#[tokio::test]
async fn test_other_buttons_are_refused_during_a_flow() {
    let ctx = TestContext::new();
    ctx.postback(USER_ID, &start("profile")).await;
    ctx.text(USER_ID, "Alice").await;

    let reply = ctx.postback(USER_ID, &start("branching")).await;
    assert_eq!(reply.len(), 2);
    assert_eq!(
        reply[0],
        OutboundMessage::text("You have a form in progress. Finish it or type \"cancel\" first.")
    );
    assert_eq!(reply[1].body(), "(2/2) Your age?");

    let session = ctx.store.get(USER_ID).await.unwrap();
    assert_eq!(session.active_flow_id.as_deref(), Some("profile"));
    assert_eq!(session.current_step, 1);
}

#[tokio::test]
async fn test_malformed_postback_is_answered() {
    let ctx = TestContext::new();
    let reply = ctx.postback(USER_ID, "flow=profile").await;
    assert_eq!(reply, vec![OutboundMessage::text("Sorry, that button is no longer valid.")]);

    let reply = ctx.postback(USER_ID, "action=unregistered").await;
    assert_eq!(reply, vec![OutboundMessage::text("Sorry, that button is no longer valid.")]);
}

#[tokio::test]
async fn test_admin_mode_denied_for_unlisted_user() {
    let ctx = TestContext::new();
    let reply = ctx.text(USER_ID, "admin").await;
    assert_eq!(reply, vec![OutboundMessage::text("⛔ Access denied.")]);

    let session = ctx.store.get(USER_ID).await.unwrap();
    assert!(!session.is_admin);
    assert_eq!(session.mode, SessionMode::Public);
    assert!(session.permissions.is_empty());
}

#[tokio::test]
async fn test_admin_mode_round_trip() {
    let ctx = TestContext::new();

    let reply = ctx.text(ADMIN_ID, "admin").await;
    assert_eq!(reply[0], OutboundMessage::text("🔐 Admin mode enabled."));
    assert_matches!(&reply[1], OutboundMessage::Card { title, .. } if title == "🔐 Admin menu");
    assert_eq!(menu_labels(&reply), vec!["Add student", "Exit admin"]);

    let session = ctx.store.get(ADMIN_ID).await.unwrap();
    assert!(session.is_admin);
    assert_eq!(session.mode, SessionMode::Admin);

    let reply = ctx.postback(ADMIN_ID, &start("add_student")).await;
    assert_eq!(reply[0].body(), "(1/2) Student's full name?");
    ctx.text(ADMIN_ID, "cancel").await;

    let exit = PostbackAction::SwitchMode { mode: SessionMode::Public }.to_data();
    let reply = ctx.postback(ADMIN_ID, &exit).await;
    assert_eq!(reply[0], OutboundMessage::text("Back to public mode."));
    assert_eq!(menu_labels(&reply), vec!["Profile", "Branching"]);

    // Elevation outlives the mode switch
    let session = ctx.store.get(ADMIN_ID).await.unwrap();
    assert!(session.is_admin);
    assert_eq!(session.mode, SessionMode::Public);
}

#[tokio::test]
async fn test_admin_mode_rechecks_registry_after_revocation() {
    let ctx = TestContext::new();
    ctx.text(ADMIN_ID, "admin").await;
    ctx.text(ADMIN_ID, "exit admin").await;
    assert!(ctx.store.get(ADMIN_ID).await.unwrap().is_admin);

    ctx.admins.revoke(ADMIN_ID);
    let reply = ctx.text(ADMIN_ID, "admin").await;
    assert_eq!(reply, vec![OutboundMessage::text("⛔ Access denied.")]);

    let session = ctx.store.get(ADMIN_ID).await.unwrap();
    assert!(!session.is_admin);
    assert!(session.permissions.is_empty());
    assert_eq!(session.mode, SessionMode::Public);
    assert_eq!(ctx.admins.check_count(), 2);

    // gated flows are closed again
    let reply = ctx.postback(ADMIN_ID, &start("add_student")).await;
    assert_eq!(reply, vec![OutboundMessage::text("⛔ Access denied.")]);
}

#[tokio::test]
async fn test_logout_clears_elevation() {
    let ctx = TestContext::new();
    ctx.text(ADMIN_ID, "admin").await;

    let reply = ctx.text(ADMIN_ID, "logout").await;
    assert_eq!(reply, vec![OutboundMessage::text("👋 You have been logged out.")]);

    let session = ctx.store.get(ADMIN_ID).await.unwrap();
    assert!(!session.is_admin);
    assert_eq!(session.mode, SessionMode::Public);
}

#[tokio::test]
async fn test_image_step_through_router() {
    let ctx = TestContext::new();
    ctx.text(ADMIN_ID, "admin").await;
    ctx.postback(ADMIN_ID, &start("add_student")).await;
    ctx.text(ADMIN_ID, "Tan Wei Ling").await;

    ctx.router.dispatch(image_event(ADMIN_ID, "media-1")).await;
    assert_eq!(
        ctx.messenger.last_reply(),
        vec![OutboundMessage::text("✅ Add student completed.")]
    );
    assert_eq!(
        ctx.handler.submissions()[0].1.get("photo"),
        Some(&serde_json::json!("media-1"))
    );
}

#[tokio::test]
async fn test_image_outside_flow_gets_fallback() {
    let ctx = TestContext::new();
    ctx.router.dispatch(image_event(USER_ID, "media-1")).await;
    assert_eq!(
        ctx.messenger.last_reply(),
        vec![OutboundMessage::text(Settings::default().router.fallback_text)]
    );
}

#[tokio::test]
async fn test_unmatched_text_gets_fallback() {
    let ctx = TestContext::new();
    let reply = ctx.text(USER_ID, "what time is pickup?").await;
    assert_eq!(reply, vec![OutboundMessage::text(Settings::default().router.fallback_text)]);
}

#[tokio::test]
async fn test_admin_lookup_only_in_admin_mode() {
    let mut ctx = TestContext::new();
    ctx.router.register_lookup(
        PatternLookup::new(r"^\d{5}$", |id: String| async move {
            anyhow::Ok(vec![OutboundMessage::text(format!("Student {}", id))])
        })
        .unwrap()
        .restrict_to_admins(),
    );

    let reply = ctx.text(USER_ID, "12345").await;
    assert_eq!(reply, vec![OutboundMessage::text(Settings::default().router.fallback_text)]);

    ctx.text(ADMIN_ID, "admin").await;
    let reply = ctx.text(ADMIN_ID, " 12345 ").await;
    assert_eq!(reply, vec![OutboundMessage::text("Student 12345")]);
}

#[tokio::test]
async fn test_public_lookup() {
    let mut ctx = TestContext::new();
    ctx.router.register_lookup(
        PatternLookup::new(r"(?i)^bus \w+$", |text: String| async move {
            anyhow::Ok(vec![OutboundMessage::text(format!("Timetable for {}", text))])
        })
        .unwrap(),
    );

    let reply = ctx.text(USER_ID, "bus A").await;
    assert_eq!(reply, vec![OutboundMessage::text("Timetable for bus A")]);
}

#[tokio::test]
async fn test_admin_only_action_elevates_on_first_use() {
    let mut ctx = TestContext::new();
    ctx.router.register_action("export", ExportAction { messages: 1 }).unwrap();

    let mut params = BTreeMap::new();
    params.insert("class".to_string(), "P3".to_string());
    let data = PostbackAction::Custom {
        name: "export".to_string(),
        params,
    }
    .to_data();

    let reply = ctx.postback(USER_ID, &data).await;
    assert_eq!(reply, vec![OutboundMessage::text("⛔ Access denied.")]);
    assert!(!ctx.store.get(USER_ID).await.unwrap().is_admin);

    let reply = ctx.postback(ADMIN_ID, &data).await;
    assert_eq!(reply, vec![OutboundMessage::text(format!("P3 export 0 for {}", ADMIN_ID))]);
    assert!(ctx.store.get(ADMIN_ID).await.unwrap().is_admin);
}

#[tokio::test]
async fn test_reply_is_capped() {
    let mut ctx = TestContext::new();
    ctx.router.register_action("export", ExportAction { messages: 8 }).unwrap();

    ctx.postback(ADMIN_ID, "action=export&class=P1").await;
    assert_eq!(ctx.messenger.last_reply().len(), MAX_REPLY_MESSAGES);
}

#[tokio::test]
async fn test_failing_action_gets_generic_reply() {
    let mut ctx = TestContext::new();
    ctx.router.register_action("broken", BrokenAction).unwrap();

    let reply = ctx.postback(USER_ID, "action=broken").await;
    assert_eq!(reply, vec![OutboundMessage::text("Something went wrong. Please try again.")]);

    let result = ctx.router.handle(&postback_event(USER_ID, "action=broken")).await;
    assert_matches!(result, Err(ClassChatError::Handler { name, message }) => {
        assert_eq!(name, "broken");
        assert!(message.contains("upstream timed out"));
    });
}

#[tokio::test]
async fn test_reserved_and_duplicate_action_names() {
    let mut ctx = TestContext::new();
    assert_matches!(
        ctx.router.register_action("cancel", BrokenAction),
        Err(ClassChatError::Config(_))
    );
    ctx.router.register_action("broken", BrokenAction).unwrap();
    assert_matches!(
        ctx.router.register_action("broken", BrokenAction),
        Err(ClassChatError::Config(_))
    );
}

#[tokio::test]
async fn test_failed_completion_is_reported_and_resets() {
    let ctx = TestContext::with_handler(RecordingHandler::failing("office system offline"));
    ctx.postback(USER_ID, &start("profile")).await;
    ctx.text(USER_ID, "Alice").await;

    let reply = ctx.text(USER_ID, "9").await;
    assert_eq!(reply, vec![OutboundMessage::text("❌ Could not save: office system offline")]);
    assert!(ctx.store.get(USER_ID).await.unwrap().is_idle());
    assert_eq!(ctx.handler.error_count(), 1);

    // The user can start over immediately
    let reply = ctx.postback(USER_ID, &start("profile")).await;
    assert_eq!(joined(&reply), "(1/2) Your name?");
}
