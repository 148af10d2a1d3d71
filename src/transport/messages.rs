//! Outbound message model
//!
//! Transport-neutral replies produced by the engine and router. The HTTP
//! client maps them onto the messaging API's wire format.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Maximum number of messages accepted in one reply
pub const MAX_REPLY_MESSAGES: usize = 5;

/// Maximum number of recipients accepted by one multicast call
pub const MAX_MULTICAST_RECIPIENTS: usize = 500;

/// What pressing a button does
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ButtonAction {
    /// Send opaque postback data back to the webhook
    Postback { data: String, display_text: Option<String> },
    /// Send a text message on the user's behalf
    Message { text: String },
}

/// A labelled button, used for quick replies and card actions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionButton {
    pub label: String,
    pub action: ButtonAction,
}

impl ActionButton {
    pub fn postback(label: &str, data: String) -> Self {
        Self {
            label: label.to_string(),
            action: ButtonAction::Postback {
                data,
                display_text: Some(label.to_string()),
            },
        }
    }

    pub fn message(label: &str, text: &str) -> Self {
        Self {
            label: label.to_string(),
            action: ButtonAction::Message { text: text.to_string() },
        }
    }
}

/// One outbound chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    Text { text: String },
    /// Text with a bounded set of suggested answers
    QuickReply { text: String, items: Vec<ActionButton> },
    /// Yes/no question
    Confirm { text: String, yes: ActionButton, no: ActionButton },
    /// Request for an image attachment
    ImageRequest { text: String, items: Vec<ActionButton> },
    /// Structured card with actions, used for menus
    Card { title: String, text: String, actions: Vec<ActionButton> },
}

impl OutboundMessage {
    pub fn text(text: impl Into<String>) -> Self {
        OutboundMessage::Text { text: text.into() }
    }

    /// Main text body of the message
    pub fn body(&self) -> &str {
        match self {
            OutboundMessage::Text { text }
            | OutboundMessage::QuickReply { text, .. }
            | OutboundMessage::Confirm { text, .. }
            | OutboundMessage::ImageRequest { text, .. }
            | OutboundMessage::Card { text, .. } => text,
        }
    }

    /// Buttons attached to the message
    pub fn buttons(&self) -> Vec<&ActionButton> {
        match self {
            OutboundMessage::Text { .. } => Vec::new(),
            OutboundMessage::QuickReply { items, .. } | OutboundMessage::ImageRequest { items, .. } => {
                items.iter().collect()
            }
            OutboundMessage::Confirm { yes, no, .. } => vec![yes, no],
            OutboundMessage::Card { actions, .. } => actions.iter().collect(),
        }
    }
}

/// Trim a reply to the transport's per-reply message cap
pub fn cap_reply(mut messages: Vec<OutboundMessage>) -> Vec<OutboundMessage> {
    if messages.len() > MAX_REPLY_MESSAGES {
        warn!(
            count = messages.len(),
            cap = MAX_REPLY_MESSAGES,
            "Reply exceeds message cap, dropping trailing messages"
        );
        messages.truncate(MAX_REPLY_MESSAGES);
    }
    messages
}
