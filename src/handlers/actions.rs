//! Application hooks for postback actions and quick lookups

use std::collections::BTreeMap;
use std::future::Future;

use async_trait::async_trait;
use regex::Regex;

use crate::state::Session;
use crate::transport::messages::OutboundMessage;
use crate::utils::errors::{ClassChatError, Result};

/// Handler for a custom postback action
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// Admin-only actions require an elevated session
    fn admin_only(&self) -> bool {
        false
    }

    async fn handle(&self, session: &Session, params: &BTreeMap<String, String>) -> anyhow::Result<Vec<OutboundMessage>>;
}

/// Direct answer for text that matches a domain pattern, such as an id
#[async_trait]
pub trait QuickLookup: Send + Sync {
    fn matches(&self, text: &str) -> bool;

    /// Only offered to sessions in admin mode
    fn admin_only(&self) -> bool {
        false
    }

    async fn lookup(&self, session: &Session, text: &str) -> anyhow::Result<Vec<OutboundMessage>>;
}

/// Quick lookup driven by a regex and an async callback
pub struct PatternLookup<F> {
    pattern: Regex,
    admin_only: bool,
    callback: F,
}

impl<F, Fut> PatternLookup<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Vec<OutboundMessage>>> + Send,
{
    pub fn new(pattern: &str, callback: F) -> Result<Self> {
        let pattern = Regex::new(pattern)
            .map_err(|e| ClassChatError::Config(format!("Invalid lookup pattern {}: {}", pattern, e)))?;

        Ok(Self {
            pattern,
            admin_only: false,
            callback,
        })
    }

    /// Offer this lookup only in admin mode
    pub fn restrict_to_admins(mut self) -> Self {
        self.admin_only = true;
        self
    }
}

#[async_trait]
impl<F, Fut> QuickLookup for PatternLookup<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Vec<OutboundMessage>>> + Send,
{
    fn matches(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }

    fn admin_only(&self) -> bool {
        self.admin_only
    }

    async fn lookup(&self, _session: &Session, text: &str) -> anyhow::Result<Vec<OutboundMessage>> {
        (self.callback)(text.to_string()).await
    }
}

impl<F> std::fmt::Debug for PatternLookup<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatternLookup")
            .field("pattern", &self.pattern.as_str())
            .field("admin_only", &self.admin_only)
            .finish()
    }
}
