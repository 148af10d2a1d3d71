//! Flow registry
//!
//! Catalogue of flow definitions keyed by id. Built once at startup and then
//! shared read-only behind an `Arc`.

use std::collections::HashSet;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::info;

use crate::utils::errors::{ClassChatError, Result};
use super::definition::FlowDefinition;

/// Registered flows in registration order
#[derive(Debug, Default)]
pub struct FlowRegistry {
    flows: IndexMap<String, Arc<FlowDefinition>>,
}

impl FlowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new flow
    ///
    /// Rejects duplicate flow ids and flows whose step ids repeat.
    pub fn register(&mut self, flow: FlowDefinition) -> Result<()> {
        if flow.id.trim().is_empty() {
            return Err(ClassChatError::InvalidFlow {
                flow_id: flow.id,
                reason: "flow id must not be empty".to_string(),
            });
        }

        if self.flows.contains_key(&flow.id) {
            return Err(ClassChatError::DuplicateFlow { flow_id: flow.id });
        }

        let mut seen = HashSet::new();
        for step in &flow.steps {
            if !seen.insert(step.id.as_str()) {
                return Err(ClassChatError::InvalidFlow {
                    flow_id: flow.id.clone(),
                    reason: format!("duplicate step id {}", step.id),
                });
            }
        }

        info!(flow_id = %flow.id, steps = flow.step_count(), "Registered flow");
        self.flows.insert(flow.id.clone(), Arc::new(flow));
        Ok(())
    }

    /// Get a flow by id
    pub fn get(&self, flow_id: &str) -> Option<Arc<FlowDefinition>> {
        self.flows.get(flow_id).cloned()
    }

    pub fn contains(&self, flow_id: &str) -> bool {
        self.flows.contains_key(flow_id)
    }

    /// All flows, in registration order
    pub fn flows(&self) -> impl Iterator<Item = &Arc<FlowDefinition>> {
        self.flows.values()
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }
}
