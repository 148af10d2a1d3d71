//! Conversational flows
//!
//! Flow definitions, the registry they are kept in, and the engine that
//! walks a user's session through them.

pub mod definition;
pub mod engine;
pub mod prompt;
pub mod registry;

pub use definition::{
    FlowDefinition, FlowHandler, InputType, SkipPredicate, Step, StepInput, Transformer, Validation, Validator,
    GENERIC_INVALID_MESSAGE,
};
pub use engine::{FlowEngine, InputOutcome};
pub use registry::FlowRegistry;
