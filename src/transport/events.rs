//! Inbound events
//!
//! Transport-agnostic event shapes plus parsing of the webhook payload
//! (`{"events": [...]}`) into them.

use serde::Deserialize;
use tracing::debug;

use crate::utils::errors::Result;

/// One inbound event from the chat transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Text { user_id: String, text: String, reply_token: String },
    Postback { user_id: String, data: String, reply_token: String },
    Image { user_id: String, media_id: String, reply_token: String },
    Follow { user_id: String, reply_token: String },
    Unfollow { user_id: String },
}

impl InboundEvent {
    pub fn user_id(&self) -> &str {
        match self {
            InboundEvent::Text { user_id, .. }
            | InboundEvent::Postback { user_id, .. }
            | InboundEvent::Image { user_id, .. }
            | InboundEvent::Follow { user_id, .. }
            | InboundEvent::Unfollow { user_id } => user_id,
        }
    }

    /// Token for replying, absent for events that cannot be answered
    pub fn reply_token(&self) -> Option<&str> {
        match self {
            InboundEvent::Text { reply_token, .. }
            | InboundEvent::Postback { reply_token, .. }
            | InboundEvent::Image { reply_token, .. }
            | InboundEvent::Follow { reply_token, .. } => Some(reply_token),
            InboundEvent::Unfollow { .. } => None,
        }
    }

    /// Event kind used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            InboundEvent::Text { .. } => "text",
            InboundEvent::Postback { .. } => "postback",
            InboundEvent::Image { .. } => "image",
            InboundEvent::Follow { .. } => "follow",
            InboundEvent::Unfollow { .. } => "unfollow",
        }
    }
}

#[derive(Debug, Deserialize)]
struct WebhookPayload {
    #[serde(default)]
    events: Vec<RawEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEvent {
    #[serde(rename = "type")]
    kind: String,
    reply_token: Option<String>,
    source: Option<RawSource>,
    message: Option<RawMessage>,
    postback: Option<RawPostback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSource {
    user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(rename = "type")]
    kind: String,
    id: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawPostback {
    data: String,
}

/// Parse a webhook request body into inbound events
///
/// Malformed JSON is an error. Event kinds the bot does not handle, and
/// events without a user id, are skipped.
pub fn parse_webhook(body: &str) -> Result<Vec<InboundEvent>> {
    let payload: WebhookPayload = serde_json::from_str(body)?;
    Ok(payload.events.into_iter().filter_map(convert_event).collect())
}

fn convert_event(raw: RawEvent) -> Option<InboundEvent> {
    let Some(user_id) = raw.source.and_then(|s| s.user_id) else {
        debug!(kind = %raw.kind, "Skipping event without a user id");
        return None;
    };
    let reply_token = raw.reply_token.unwrap_or_default();

    let event = match (raw.kind.as_str(), raw.message, raw.postback) {
        ("message", Some(message), _) => match (message.kind.as_str(), message.text) {
            ("text", Some(text)) => InboundEvent::Text { user_id, text, reply_token },
            ("image", _) => InboundEvent::Image {
                user_id,
                media_id: message.id,
                reply_token,
            },
            (other, _) => {
                debug!(user_id = %user_id, message_type = other, "Skipping unsupported message type");
                return None;
            }
        },
        ("postback", _, Some(postback)) => InboundEvent::Postback {
            user_id,
            data: postback.data,
            reply_token,
        },
        ("follow", _, _) => InboundEvent::Follow { user_id, reply_token },
        ("unfollow", _, _) => InboundEvent::Unfollow { user_id },
        (other, _, _) => {
            debug!(user_id = %user_id, kind = other, "Skipping unsupported event");
            return None;
        }
    };

    Some(event)
}
