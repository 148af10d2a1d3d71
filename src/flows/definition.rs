//! Flow and step definitions
//!
//! A flow is an immutable, linear list of steps plus a completion handler.
//! Step behaviour (validation, transformation, conditional skipping) is
//! supplied by the application through small traits, which plain closures
//! implement as well.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::state::FlowData;
use crate::utils::helpers::parse_yes_no;

/// Generic message shown when a validator rejects input without a reason
pub const GENERIC_INVALID_MESSAGE: &str = "❌ Invalid input. Please try again.";

/// Kind of answer a step expects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputType {
    Text,
    Number,
    Date,
    Select,
    Image,
    Confirm,
}

/// Raw input handed to the engine for the step awaiting an answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepInput {
    /// Typed text or a postback answer
    Text(String),
    /// Uploaded image, identified by the transport's media id
    Image { media_id: String },
}

impl StepInput {
    pub fn text(text: impl Into<String>) -> Self {
        StepInput::Text(text.into())
    }

    /// Text seen by validators and transforms
    pub fn as_str(&self) -> &str {
        match self {
            StepInput::Text(text) => text,
            StepInput::Image { media_id } => media_id,
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self, StepInput::Image { .. })
    }
}

/// Result of validating one input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    Valid,
    /// Rejected; `None` falls back to the generic message
    Invalid(Option<String>),
}

impl Validation {
    pub fn invalid(message: impl Into<String>) -> Self {
        Validation::Invalid(Some(message.into()))
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Validation::Valid)
    }

    /// Message to show the user for a rejected input
    pub fn message(&self) -> Option<String> {
        match self {
            Validation::Valid => None,
            Validation::Invalid(Some(message)) => Some(message.clone()),
            Validation::Invalid(None) => Some(GENERIC_INVALID_MESSAGE.to_string()),
        }
    }
}

impl From<bool> for Validation {
    fn from(valid: bool) -> Self {
        if valid {
            Validation::Valid
        } else {
            Validation::Invalid(None)
        }
    }
}

/// Checks one answer before it is stored
#[async_trait]
pub trait Validator: Send + Sync {
    async fn validate(&self, input: &str) -> Validation;
}

#[async_trait]
impl<F> Validator for F
where
    F: Fn(&str) -> Validation + Send + Sync,
{
    async fn validate(&self, input: &str) -> Validation {
        self(input)
    }
}

/// Turns a validated answer into the value stored in flow data
#[async_trait]
pub trait Transformer: Send + Sync {
    async fn transform(&self, input: &str) -> anyhow::Result<Value>;
}

#[async_trait]
impl<F> Transformer for F
where
    F: Fn(&str) -> anyhow::Result<Value> + Send + Sync,
{
    async fn transform(&self, input: &str) -> anyhow::Result<Value> {
        self(input)
    }
}

/// Decides from the answers so far whether a step is skipped
pub trait SkipPredicate: Send + Sync {
    fn should_skip(&self, data: &FlowData) -> bool;
}

impl<F> SkipPredicate for F
where
    F: Fn(&FlowData) -> bool + Send + Sync,
{
    fn should_skip(&self, data: &FlowData) -> bool {
        self(data)
    }
}

/// Completion callbacks of a flow
#[async_trait]
pub trait FlowHandler: Send + Sync {
    /// Receives the collected answers once the last step is answered.
    /// A returned string replaces the default acknowledgement.
    async fn on_complete(&self, data: &FlowData, user_id: &str) -> anyhow::Result<Option<String>>;

    /// Called when `on_complete` fails
    async fn on_error(&self, _error: &anyhow::Error, _user_id: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

/// One question inside a flow
#[derive(Clone)]
pub struct Step {
    pub id: String,
    pub prompt: String,
    pub input_type: InputType,
    /// Allowed answers for `select` steps
    pub options: Vec<String>,
    validator: Option<Arc<dyn Validator>>,
    transformer: Option<Arc<dyn Transformer>>,
    skip_if: Option<Arc<dyn SkipPredicate>>,
}

impl Step {
    pub fn new(id: &str, prompt: &str, input_type: InputType) -> Self {
        Self {
            id: id.to_string(),
            prompt: prompt.to_string(),
            input_type,
            options: Vec::new(),
            validator: None,
            transformer: None,
            skip_if: None,
        }
    }

    pub fn text(id: &str, prompt: &str) -> Self {
        Self::new(id, prompt, InputType::Text)
    }

    pub fn number(id: &str, prompt: &str) -> Self {
        Self::new(id, prompt, InputType::Number)
    }

    pub fn date(id: &str, prompt: &str) -> Self {
        Self::new(id, prompt, InputType::Date)
    }

    pub fn image(id: &str, prompt: &str) -> Self {
        Self::new(id, prompt, InputType::Image)
    }

    pub fn confirm(id: &str, prompt: &str) -> Self {
        Self::new(id, prompt, InputType::Confirm)
    }

    pub fn select(id: &str, prompt: &str, options: &[&str]) -> Self {
        let mut step = Self::new(id, prompt, InputType::Select);
        step.options = options.iter().map(|o| o.to_string()).collect();
        step
    }

    /// Attach a synchronous validation closure
    pub fn validate<F>(self, f: F) -> Self
    where
        F: Fn(&str) -> Validation + Send + Sync + 'static,
    {
        self.validator(f)
    }

    /// Attach any validator, including async ones
    pub fn validator(mut self, validator: impl Validator + 'static) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Attach a synchronous transform closure
    pub fn transform<F>(self, f: F) -> Self
    where
        F: Fn(&str) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.transformer(f)
    }

    /// Attach any transformer, including async ones
    pub fn transformer(mut self, transformer: impl Transformer + 'static) -> Self {
        self.transformer = Some(Arc::new(transformer));
        self
    }

    /// Skip this step when the predicate holds for the answers so far
    pub fn skip_if<F>(mut self, f: F) -> Self
    where
        F: Fn(&FlowData) -> bool + Send + Sync + 'static,
    {
        self.skip_if = Some(Arc::new(f));
        self
    }

    /// Check the input against the step's input type
    pub fn check_input_type(&self, input: &StepInput) -> Validation {
        match (self.input_type, input) {
            (InputType::Image, StepInput::Image { .. }) => Validation::Valid,
            (InputType::Image, StepInput::Text(_)) => Validation::invalid("📷 Please send an image."),
            (_, StepInput::Image { .. }) => {
                Validation::invalid("An image is not expected here. Please reply with text.")
            }
            (InputType::Text, StepInput::Text(_)) => Validation::Valid,
            (InputType::Number, StepInput::Text(text)) => {
                if text.trim().parse::<f64>().is_ok_and(f64::is_finite) {
                    Validation::Valid
                } else {
                    Validation::invalid("Invalid number format")
                }
            }
            (InputType::Date, StepInput::Text(text)) => {
                if chrono::NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d").is_ok() {
                    Validation::Valid
                } else {
                    Validation::invalid("Invalid date format (YYYY-MM-DD)")
                }
            }
            (InputType::Select, StepInput::Text(text)) => {
                if self.matched_option(text).is_some() {
                    Validation::Valid
                } else {
                    Validation::invalid(format!(
                        "Invalid choice. Available options: {}",
                        self.options.join(", ")
                    ))
                }
            }
            (InputType::Confirm, StepInput::Text(text)) => {
                if parse_yes_no(text).is_some() {
                    Validation::Valid
                } else {
                    Validation::invalid("Please answer yes or no.")
                }
            }
        }
    }

    /// Run the application validator, if any
    pub async fn validate_input(&self, input: &str) -> Validation {
        match &self.validator {
            Some(validator) => validator.validate(input).await,
            None => Validation::Valid,
        }
    }

    /// Produce the value stored for a validated input
    pub async fn transform_input(&self, input: &str) -> anyhow::Result<Value> {
        if let Some(transformer) = &self.transformer {
            return transformer.transform(input).await;
        }

        match self.input_type {
            InputType::Confirm => Ok(Value::Bool(parse_yes_no(input).unwrap_or(false))),
            InputType::Select => Ok(Value::String(
                self.matched_option(input).unwrap_or(input).to_string(),
            )),
            _ => Ok(Value::String(input.to_string())),
        }
    }

    /// Declared option matching the answer, ignoring case and surrounding space
    fn matched_option(&self, input: &str) -> Option<&str> {
        let answer = input.trim();
        self.options
            .iter()
            .find(|o| o.eq_ignore_ascii_case(answer))
            .map(String::as_str)
    }

    pub fn should_skip(&self, data: &FlowData) -> bool {
        self.skip_if.as_ref().is_some_and(|p| p.should_skip(data))
    }
}

impl std::fmt::Debug for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Step")
            .field("id", &self.id)
            .field("input_type", &self.input_type)
            .field("options", &self.options)
            .field("has_validator", &self.validator.is_some())
            .field("has_transformer", &self.transformer.is_some())
            .field("has_skip_if", &self.skip_if.is_some())
            .finish()
    }
}

/// A registered multi-step flow
#[derive(Clone)]
pub struct FlowDefinition {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Permission an elevated session must hold to start the flow
    pub required_permission: Option<String>,
    pub steps: Vec<Step>,
    handler: Arc<dyn FlowHandler>,
}

impl FlowDefinition {
    pub fn new(id: &str, name: &str, handler: impl FlowHandler + 'static) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: String::new(),
            required_permission: None,
            steps: Vec::new(),
            handler: Arc::new(handler),
        }
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn requires_permission(mut self, permission: &str) -> Self {
        self.required_permission = Some(permission.to_string());
        self
    }

    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn handler(&self) -> &dyn FlowHandler {
        self.handler.as_ref()
    }

    pub fn step_at(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Whether the flow is offered in public mode
    pub fn is_public(&self) -> bool {
        self.required_permission.is_none()
    }
}

impl std::fmt::Debug for FlowDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowDefinition")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("required_permission", &self.required_permission)
            .field("steps", &self.steps)
            .finish()
    }
}
