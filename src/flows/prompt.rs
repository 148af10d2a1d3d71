//! Step prompt rendering

use crate::transport::messages::{ActionButton, OutboundMessage};
use crate::transport::postback::PostbackAction;
use crate::utils::helpers::progress_indicator;
use super::definition::{InputType, Step};

/// Render the prompt for a step in the shape its input type calls for
pub fn render_step(step: &Step, current_step: usize, total_steps: usize, can_abort: bool) -> OutboundMessage {
    let mut text = format!("{} {}", progress_indicator(current_step, total_steps), step.prompt);
    if step.input_type == InputType::Date {
        text.push_str("\n(YYYY-MM-DD)");
    }

    let cancel = can_abort.then(cancel_button);

    match step.input_type {
        InputType::Select => {
            let mut items: Vec<ActionButton> = step.options.iter().map(|o| answer_button(o, o)).collect();
            items.extend(cancel);
            OutboundMessage::QuickReply { text, items }
        }
        InputType::Confirm => OutboundMessage::Confirm {
            text,
            yes: answer_button("Yes", "yes"),
            no: answer_button("No", "no"),
        },
        InputType::Image => OutboundMessage::ImageRequest {
            text,
            items: cancel.into_iter().collect(),
        },
        InputType::Text | InputType::Number | InputType::Date => match cancel {
            Some(cancel) => OutboundMessage::QuickReply { text, items: vec![cancel] },
            None => OutboundMessage::Text { text },
        },
    }
}

fn answer_button(label: &str, value: &str) -> ActionButton {
    ActionButton::postback(label, PostbackAction::Answer { value: value.to_string() }.to_data())
}

fn cancel_button() -> ActionButton {
    ActionButton::postback("Cancel", PostbackAction::Cancel.to_data())
}
