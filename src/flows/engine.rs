//! Flow engine
//!
//! Drives one user's session through a flow: start, answer, complete and
//! abort. Every operation holds the session store's lock for that user from
//! the first read to the last write, so two deliveries for the same user are
//! processed one after the other and the second observes the state committed
//! by the first, even when they reach different engines or processes.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::state::{FlowData, Session, SessionPatch, SessionStore};
use crate::transport::messages::OutboundMessage;
use crate::utils::errors::{ClassChatError, Result};
use crate::utils::logging::log_flow_event;
use super::definition::{FlowDefinition, StepInput, Validation};
use super::prompt::render_step;
use super::registry::FlowRegistry;

/// What happened to an input offered to the engine
#[derive(Debug, Clone, PartialEq)]
pub enum InputOutcome {
    /// The user is not in a flow; the caller should try another route
    NotHandled,
    /// Input failed a check; the same step awaits a retry
    Rejected { messages: Vec<OutboundMessage> },
    /// Input was stored and the next step was prompted
    Advanced { messages: Vec<OutboundMessage> },
    /// The last step was answered and the completion handler succeeded
    Completed { messages: Vec<OutboundMessage> },
    /// The completion handler failed; the session was reset anyway
    Failed { error: String, messages: Vec<OutboundMessage> },
}

impl InputOutcome {
    pub fn is_handled(&self) -> bool {
        !matches!(self, InputOutcome::NotHandled)
    }

    pub fn messages(&self) -> &[OutboundMessage] {
        match self {
            InputOutcome::NotHandled => &[],
            InputOutcome::Rejected { messages }
            | InputOutcome::Advanced { messages }
            | InputOutcome::Completed { messages }
            | InputOutcome::Failed { messages, .. } => messages,
        }
    }

    pub fn into_messages(self) -> Vec<OutboundMessage> {
        match self {
            InputOutcome::NotHandled => Vec::new(),
            InputOutcome::Rejected { messages }
            | InputOutcome::Advanced { messages }
            | InputOutcome::Completed { messages }
            | InputOutcome::Failed { messages, .. } => messages,
        }
    }
}

/// Multi-step flow state machine
#[derive(Debug)]
pub struct FlowEngine {
    registry: Arc<FlowRegistry>,
    store: Arc<dyn SessionStore>,
}

impl FlowEngine {
    pub fn new(registry: Arc<FlowRegistry>, store: Arc<dyn SessionStore>) -> Self {
        Self { registry, store }
    }

    pub fn registry(&self) -> &Arc<FlowRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Start a flow for an idle user and return the first prompt
    pub async fn start_flow(&self, user_id: &str, flow_id: &str) -> Result<Vec<OutboundMessage>> {
        let _lock = self.store.lock(user_id).await?;

        let flow = self
            .registry
            .get(flow_id)
            .ok_or_else(|| ClassChatError::UnknownFlow { flow_id: flow_id.to_string() })?;

        let session = self.store.get(user_id).await?;
        if let Some(active_flow_id) = &session.active_flow_id {
            if self.registry.contains(active_flow_id) {
                return Err(ClassChatError::FlowAlreadyActive {
                    active_flow_id: active_flow_id.clone(),
                });
            }
            warn!(user_id = user_id, flow_id = %active_flow_id, "Discarding session of unregistered flow");
        }

        if let Some(permission) = &flow.required_permission {
            if !session.has_permission(permission) {
                return Err(ClassChatError::PermissionDenied(format!(
                    "flow {} requires permission {}",
                    flow.id, permission
                )));
            }
        }

        let data = FlowData::new();
        let mut history = Vec::new();
        let first = skip_ahead(&flow, 0, &data, &mut history);

        let Some(step) = flow.step_at(first) else {
            log_flow_event(user_id, &flow.id, "started", None);
            let outcome = self.complete_flow(user_id, &flow, &data).await?;
            return Ok(outcome.into_messages());
        };

        let session = self
            .store
            .update(
                user_id,
                &SessionPatch {
                    active_flow_id: Some(Some(flow.id.clone())),
                    flow_type: Some(Some(flow.id.clone())),
                    current_step: Some(first),
                    total_steps: Some(flow.step_count()),
                    flow_data: Some(data),
                    step_history: Some(history),
                    waiting_for: Some(Some(step.id.clone())),
                    can_abort: Some(true),
                    ..SessionPatch::default()
                },
            )
            .await?;

        log_flow_event(user_id, &flow.id, "started", Some(&step.id));
        Ok(vec![render_step(step, session.current_step, session.total_steps, session.can_abort)])
    }

    /// Offer one input to the step the user is on
    pub async fn process_input(&self, user_id: &str, input: StepInput) -> Result<InputOutcome> {
        let _lock = self.store.lock(user_id).await?;

        let session = self.store.get(user_id).await?;
        let Some(flow_id) = session.active_flow_id.clone() else {
            return Ok(InputOutcome::NotHandled);
        };
        let flow = self.registered_flow(user_id, &flow_id).await?;

        let Some(step) = flow.step_at(session.current_step) else {
            error!(
                user_id = user_id,
                flow_id = %flow_id,
                current_step = session.current_step,
                "Session points past the last step, resetting"
            );
            self.store.update(user_id, &SessionPatch::idle()).await?;
            return Err(ClassChatError::UnknownFlow { flow_id });
        };

        if input.is_image() && session.waiting_for.as_deref() != Some(step.id.as_str()) {
            debug!(user_id = user_id, step_id = %step.id, "Image does not answer the outstanding prompt");
            return Ok(reject(&session, step, "An image is not expected right now.".to_string()));
        }

        let checked = match step.check_input_type(&input) {
            Validation::Valid => step.validate_input(input.as_str()).await,
            invalid => invalid,
        };
        if let Some(message) = checked.message() {
            debug!(user_id = user_id, step_id = %step.id, "Input rejected");
            return Ok(reject(&session, step, message));
        }

        let value = match step.transform_input(input.as_str()).await {
            Ok(value) => value,
            Err(e) => {
                debug!(user_id = user_id, step_id = %step.id, error = %e, "Transform rejected input");
                return Ok(reject(&session, step, format!("❌ {}", e)));
            }
        };

        let mut data = session.flow_data.clone();
        data.insert(step.id.clone(), value);
        let mut history = session.step_history.clone();
        history.push(step.id.clone());
        log_flow_event(user_id, &flow.id, "step_committed", Some(&step.id));

        let next = skip_ahead(&flow, session.current_step + 1, &data, &mut history);
        let Some(next_step) = flow.step_at(next) else {
            return self.complete_flow(user_id, &flow, &data).await;
        };

        let session = self
            .store
            .update(
                user_id,
                &SessionPatch {
                    current_step: Some(next),
                    flow_data: Some(data),
                    step_history: Some(history),
                    waiting_for: Some(Some(next_step.id.clone())),
                    ..SessionPatch::default()
                },
            )
            .await?;

        Ok(InputOutcome::Advanced {
            messages: vec![render_step(next_step, session.current_step, session.total_steps, session.can_abort)],
        })
    }

    /// Abort the user's active flow, discarding collected answers
    pub async fn abort_flow(&self, user_id: &str) -> Result<Vec<OutboundMessage>> {
        let _lock = self.store.lock(user_id).await?;

        let session = self.store.get(user_id).await?;
        let flow_id = session.active_flow_id.clone().ok_or(ClassChatError::NoActiveFlow)?;
        if !session.can_abort {
            warn!(user_id = user_id, flow_id = %flow_id, "Abort refused for non-abortable flow");
            return Err(ClassChatError::AbortNotAllowed { flow_id });
        }

        self.store.update(user_id, &SessionPatch::idle()).await?;
        log_flow_event(user_id, &flow_id, "aborted", session.waiting_for.as_deref());

        let name = self.registry.get(&flow_id).map(|f| f.name.clone()).unwrap_or(flow_id);
        Ok(vec![OutboundMessage::text(format!("❌ {} cancelled.", name))])
    }

    /// Re-send the prompt of the step the user is on
    pub async fn send_current_step(&self, user_id: &str) -> Result<Vec<OutboundMessage>> {
        let _lock = self.store.lock(user_id).await?;

        let session = self.store.get(user_id).await?;
        let flow_id = session.active_flow_id.clone().ok_or(ClassChatError::NoActiveFlow)?;
        let flow = self.registered_flow(user_id, &flow_id).await?;
        let Some(step) = flow.step_at(session.current_step) else {
            self.store.update(user_id, &SessionPatch::idle()).await?;
            return Err(ClassChatError::UnknownFlow { flow_id });
        };

        let session = self
            .store
            .update(
                user_id,
                &SessionPatch {
                    waiting_for: Some(Some(step.id.clone())),
                    ..SessionPatch::default()
                },
            )
            .await?;

        Ok(vec![render_step(step, session.current_step, session.total_steps, session.can_abort)])
    }

    /// Look up the session's flow, resetting the session if it is gone
    async fn registered_flow(&self, user_id: &str, flow_id: &str) -> Result<Arc<FlowDefinition>> {
        if let Some(flow) = self.registry.get(flow_id) {
            return Ok(flow);
        }

        error!(user_id = user_id, flow_id = flow_id, "Session references an unregistered flow, resetting");
        self.store.update(user_id, &SessionPatch::idle()).await?;
        Err(ClassChatError::UnknownFlow { flow_id: flow_id.to_string() })
    }

    /// Hand the answers to the flow's handler and reset the session either way
    async fn complete_flow(&self, user_id: &str, flow: &FlowDefinition, data: &FlowData) -> Result<InputOutcome> {
        let result = flow.handler().on_complete(data, user_id).await;

        match result {
            Ok(acknowledgement) => {
                self.store.update(user_id, &SessionPatch::idle()).await?;
                log_flow_event(user_id, &flow.id, "completed", None);
                let text = acknowledgement.unwrap_or_else(|| format!("✅ {} completed.", flow.name));
                Ok(InputOutcome::Completed {
                    messages: vec![OutboundMessage::text(text)],
                })
            }
            Err(e) => {
                error!(user_id = user_id, flow_id = %flow.id, error = %e, "Flow completion failed");
                if let Err(hook_error) = flow.handler().on_error(&e, user_id).await {
                    warn!(user_id = user_id, flow_id = %flow.id, error = %hook_error, "Flow error hook failed");
                }

                self.store.update(user_id, &SessionPatch::idle()).await?;
                info!(user_id = user_id, flow_id = %flow.id, "Session reset after failed completion");

                let error = ClassChatError::Completion(e.to_string());
                Ok(InputOutcome::Failed {
                    messages: vec![OutboundMessage::text(error.user_message())],
                    error: e.to_string(),
                })
            }
        }
    }
}

/// Advance past every step whose skip predicate holds, recording them in history
fn skip_ahead(flow: &FlowDefinition, from: usize, data: &FlowData, history: &mut Vec<String>) -> usize {
    let mut index = from;
    while let Some(step) = flow.step_at(index) {
        if !step.should_skip(data) {
            break;
        }
        history.push(step.id.clone());
        index += 1;
    }
    index
}

fn reject(session: &Session, step: &super::definition::Step, message: String) -> InputOutcome {
    InputOutcome::Rejected {
        messages: vec![
            OutboundMessage::text(message),
            render_step(step, session.current_step, session.total_steps, session.can_abort),
        ],
    }
}
