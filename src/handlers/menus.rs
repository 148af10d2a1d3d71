//! Menu rendering

use crate::flows::{FlowDefinition, FlowRegistry};
use crate::state::{Session, SessionMode};
use crate::transport::messages::{ActionButton, OutboundMessage};
use crate::transport::postback::PostbackAction;

/// Buttons per menu card
const CARD_ACTIONS: usize = 4;

/// Renders the top-level menu for a session's mode
pub trait MenuRenderer: Send + Sync {
    fn render(&self, session: &Session, registry: &FlowRegistry) -> Vec<OutboundMessage>;
}

/// Lists the flows visible in the session's mode as start buttons
#[derive(Debug, Clone, Default)]
pub struct DefaultMenuRenderer;

impl DefaultMenuRenderer {
    /// Flows offered to the session in its current mode
    pub fn visible_flows<'a>(session: &Session, registry: &'a FlowRegistry) -> Vec<&'a FlowDefinition> {
        registry
            .flows()
            .map(|flow| flow.as_ref())
            .filter(|flow| match (session.mode, &flow.required_permission) {
                (SessionMode::Public, None) => true,
                (SessionMode::Admin, Some(permission)) => session.has_permission(permission),
                _ => false,
            })
            .collect()
    }
}

impl MenuRenderer for DefaultMenuRenderer {
    fn render(&self, session: &Session, registry: &FlowRegistry) -> Vec<OutboundMessage> {
        let title = match session.mode {
            SessionMode::Public => "📋 Menu",
            SessionMode::Admin => "🔐 Admin menu",
        };

        let mut actions: Vec<ActionButton> = Self::visible_flows(session, registry)
            .into_iter()
            .map(|flow| {
                ActionButton::postback(
                    &flow.name,
                    PostbackAction::StartFlow { flow_id: flow.id.clone() }.to_data(),
                )
            })
            .collect();

        if session.mode == SessionMode::Admin {
            actions.push(ActionButton::postback(
                "Exit admin",
                PostbackAction::SwitchMode { mode: SessionMode::Public }.to_data(),
            ));
        }

        if actions.is_empty() {
            return vec![OutboundMessage::text(format!("{}\nNo forms are available right now.", title))];
        }

        actions
            .chunks(CARD_ACTIONS)
            .map(|chunk| OutboundMessage::Card {
                title: title.to_string(),
                text: "Choose an option".to_string(),
                actions: chunk.to_vec(),
            })
            .collect()
    }
}
