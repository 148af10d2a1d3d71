//! Event handlers module
//!
//! This module contains the event router and the hooks it dispatches to:
//! - Router for inbound text, postback, image and follow events
//! - Menu renderers for the mode-appropriate top-level menu
//! - Action handlers and quick lookups registered by the application

pub mod actions;
pub mod menus;
pub mod router;

// Re-export commonly used handler types
pub use actions::{ActionHandler, PatternLookup, QuickLookup};
pub use menus::{DefaultMenuRenderer, MenuRenderer};
pub use router::Router;
