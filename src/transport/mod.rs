//! Chat transport boundary
//!
//! Inbound event parsing, the outbound message model, typed postback
//! actions, and the messaging API client.

pub mod client;
pub mod events;
pub mod messages;
pub mod postback;

pub use client::{HttpMessenger, Messenger};
pub use events::{parse_webhook, InboundEvent};
pub use messages::{
    cap_reply, ActionButton, ButtonAction, OutboundMessage, MAX_MULTICAST_RECIPIENTS, MAX_REPLY_MESSAGES,
};
pub use postback::PostbackAction;
