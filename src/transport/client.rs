//! Messaging API client
//!
//! [`Messenger`] is the outbound seam used by the router. [`HttpMessenger`]
//! posts to the messaging API's reply, push and multicast endpoints.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, error, info};

use crate::config::BotConfig;
use crate::utils::errors::{ClassChatError, Result};
use super::messages::{cap_reply, ActionButton, ButtonAction, OutboundMessage, MAX_MULTICAST_RECIPIENTS};

/// Outbound message delivery
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Answer an inbound event
    async fn reply(&self, reply_token: &str, messages: Vec<OutboundMessage>) -> Result<()>;

    /// Send unsolicited messages to one user
    async fn push(&self, user_id: &str, messages: Vec<OutboundMessage>) -> Result<()>;

    /// Send the same messages to many users
    async fn multicast(&self, user_ids: &[String], messages: Vec<OutboundMessage>) -> Result<()>;
}

/// Messaging API client over HTTPS
#[derive(Debug, Clone)]
pub struct HttpMessenger {
    client: Client,
    base_url: String,
    access_token: String,
}

impl HttpMessenger {
    /// Create a new HttpMessenger instance
    pub fn new(config: &BotConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .user_agent("ClassChat-Bot/1.0")
            .build()?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            access_token: config.channel_access_token.clone(),
        })
    }

    async fn post(&self, endpoint: &str, body: Value) -> Result<()> {
        let url = format!("{}/v2/bot/message/{}", self.base_url, endpoint);
        debug!(url = %url, "Sending messaging API request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            error!(endpoint = endpoint, status = %status, detail = %detail, "Messaging API request failed");
            return Err(ClassChatError::Messaging(format!("{} returned {}: {}", endpoint, status, detail)));
        }

        Ok(())
    }
}

#[async_trait]
impl Messenger for HttpMessenger {
    async fn reply(&self, reply_token: &str, messages: Vec<OutboundMessage>) -> Result<()> {
        let messages = cap_reply(messages);
        if messages.is_empty() {
            return Ok(());
        }

        self.post(
            "reply",
            json!({ "replyToken": reply_token, "messages": to_wire_messages(&messages) }),
        )
        .await
    }

    async fn push(&self, user_id: &str, messages: Vec<OutboundMessage>) -> Result<()> {
        let messages = cap_reply(messages);
        if messages.is_empty() {
            return Ok(());
        }

        self.post("push", json!({ "to": user_id, "messages": to_wire_messages(&messages) }))
            .await
    }

    async fn multicast(&self, user_ids: &[String], messages: Vec<OutboundMessage>) -> Result<()> {
        let messages = cap_reply(messages);
        if messages.is_empty() || user_ids.is_empty() {
            return Ok(());
        }

        let wire = to_wire_messages(&messages);
        for chunk in user_ids.chunks(MAX_MULTICAST_RECIPIENTS) {
            self.post("multicast", json!({ "to": chunk, "messages": wire })).await?;
        }

        info!(recipients = user_ids.len(), "Multicast sent");
        Ok(())
    }
}

fn to_wire_messages(messages: &[OutboundMessage]) -> Vec<Value> {
    messages.iter().map(to_wire).collect()
}

/// Map one outbound message onto the messaging API's JSON shape
pub fn to_wire(message: &OutboundMessage) -> Value {
    match message {
        OutboundMessage::Text { text } => json!({ "type": "text", "text": text }),
        OutboundMessage::QuickReply { text, items } => json!({
            "type": "text",
            "text": text,
            "quickReply": { "items": items.iter().map(quick_reply_item).collect::<Vec<_>>() },
        }),
        OutboundMessage::Confirm { text, yes, no } => json!({
            "type": "template",
            "altText": text,
            "template": { "type": "confirm", "text": text, "actions": [wire_action(yes), wire_action(no)] },
        }),
        OutboundMessage::ImageRequest { text, items } => {
            let mut quick_replies = vec![
                json!({ "type": "action", "action": { "type": "camera", "label": "Camera" } }),
                json!({ "type": "action", "action": { "type": "cameraRoll", "label": "Gallery" } }),
            ];
            quick_replies.extend(items.iter().map(quick_reply_item));
            json!({ "type": "text", "text": text, "quickReply": { "items": quick_replies } })
        }
        OutboundMessage::Card { title, text, actions } => json!({
            "type": "template",
            "altText": title,
            "template": {
                "type": "buttons",
                "title": title,
                "text": text,
                "actions": actions.iter().map(wire_action).collect::<Vec<_>>(),
            },
        }),
    }
}

fn quick_reply_item(button: &ActionButton) -> Value {
    json!({ "type": "action", "action": wire_action(button) })
}

fn wire_action(button: &ActionButton) -> Value {
    match &button.action {
        ButtonAction::Postback { data, display_text } => {
            let mut action = json!({ "type": "postback", "label": button.label, "data": data });
            if let Some(display_text) = display_text {
                action["displayText"] = json!(display_text);
            }
            action
        }
        ButtonAction::Message { text } => json!({ "type": "message", "label": button.label, "text": text }),
    }
}
